//! Optional AI image generation that replaces the local render.
//!
//! Two services are supported, tried in a fixed order:
//!
//! 1. **OpenAI Images** (`POST {base}/images/generations`): text-to-image from
//!    [`blueprint_prompt`]. The answer carries either a URL or `b64_json`.
//! 2. **Hosted Gradio space** (`POST …/api/predict`): image-to-image from the
//!    first uploaded photo plus [`technical_drawing_prompt`]. Two payload
//!    shapes are attempted, `[image, prompt]` then `[image]`, because spaces
//!    differ in their input signature.
//!
//! Whatever the service returns (inline bytes, a URL, a file reference) is
//! normalised through [`GeneratedImage`] and fetched into memory. File
//! references from a space are paths on the space's machine and are always
//! downloaded from `{space}/file={path}`, never opened locally. Every
//! failure is logged and the caller keeps its local render.

use crate::config::ImageGenConfig;
use crate::error::ExternalError;
use crate::model::{FormInput, UploadedImage};
use crate::pipeline::encode::data_uri;
use crate::prompts::{blueprint_prompt, technical_drawing_prompt};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const OPENAI: &str = "openai-images";
const GRADIO: &str = "gradio-space";

// ── Result normalisation ─────────────────────────────────────────────────

/// Where a service put the generated image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedImage {
    RemoteUrl(String),
    InlineBytes(Vec<u8>),
}

impl GeneratedImage {
    /// Interpret one Gradio output value from the space at `space_base`.
    ///
    /// Accepts a `data:` URI, an `http(s)` URL, a file object with `url` or
    /// `path`, a bare path, or a list whose first element is any of these.
    /// Paths resolve to the space's `/file=` route.
    pub fn from_gradio_value(value: &Value, space_base: &str) -> Option<Self> {
        match value {
            Value::String(s) => Self::from_reference(s, space_base),
            Value::Array(items) => items
                .first()
                .and_then(|item| Self::from_gradio_value(item, space_base)),
            Value::Object(map) => map
                .get("url")
                .or_else(|| map.get("path"))
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .and_then(|s| Self::from_reference(s, space_base)),
            _ => None,
        }
    }

    /// Interpret an OpenAI Images response body: `data[0].url` or
    /// `data[0].b64_json`.
    pub fn from_openai_response(body: &Value) -> Option<Self> {
        let first = body.get("data")?.get(0)?;
        if let Some(url) = first.get("url").and_then(Value::as_str) {
            return Some(Self::RemoteUrl(url.to_string()));
        }
        let b64 = first.get("b64_json").and_then(Value::as_str)?;
        STANDARD.decode(b64).ok().map(Self::InlineBytes)
    }

    fn from_reference(s: &str, space_base: &str) -> Option<Self> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }
        if let Some(rest) = s.strip_prefix("data:") {
            let (_, payload) = rest.split_once(";base64,")?;
            return STANDARD.decode(payload).ok().map(Self::InlineBytes);
        }
        if s.starts_with("http://") || s.starts_with("https://") {
            return Some(Self::RemoteUrl(s.to_string()));
        }
        Some(Self::RemoteUrl(space_file_url(space_base, s)))
    }
}

/// Prediction endpoint for a space.
///
/// `https://huggingface.co/spaces/{user}/{space}` becomes
/// `https://{user}-{space}.hf.space/api/predict`; any other URL gets
/// `/api/predict` appended unless it already ends with it.
pub fn hf_predict_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if let Some(rest) = url.strip_prefix("https://huggingface.co/spaces/") {
        let mut parts = rest.split('/');
        if let (Some(user), Some(space)) = (parts.next(), parts.next()) {
            let host = format!("{user}-{space}")
                .to_lowercase()
                .replace(['_', '.'], "-");
            return format!("https://{host}.hf.space/api/predict");
        }
    }
    if url.ends_with("/api/predict") {
        url.to_string()
    } else {
        format!("{url}/api/predict")
    }
}

/// Root of the space behind a prediction endpoint.
fn space_base(predict_url: &str) -> &str {
    predict_url
        .trim_end_matches('/')
        .trim_end_matches("/api/predict")
}

/// Download URL for a file the space wrote on its own disk.
fn space_file_url(space_base: &str, path: &str) -> String {
    format!("{}/file={path}", space_base.trim_end_matches('/'))
}

// ── Strategies ───────────────────────────────────────────────────────────

/// One configured generation service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    OpenAi { api_key: String },
    Gradio { predict_url: String, token: Option<String> },
}

impl Strategy {
    fn service(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => OPENAI,
            Self::Gradio { .. } => GRADIO,
        }
    }
}

/// Configured services in attempt order.
pub fn candidate_strategies(config: &ImageGenConfig) -> Vec<Strategy> {
    let mut strategies = Vec::new();
    if let Some(key) = config.openai_api_key.as_deref().filter(|k| !k.is_empty()) {
        strategies.push(Strategy::OpenAi {
            api_key: key.to_string(),
        });
    }
    if let Some(url) = config.hf_space_url.as_deref().filter(|u| !u.is_empty()) {
        strategies.push(Strategy::Gradio {
            predict_url: hf_predict_url(url),
            token: config.hf_token.clone().filter(|t| !t.is_empty()),
        });
    }
    strategies
}

// ── Client ───────────────────────────────────────────────────────────────

/// HTTP client for the configured generation services.
#[derive(Clone)]
pub struct ImageGenerator {
    client: reqwest::Client,
    config: ImageGenConfig,
    strategies: Vec<Strategy>,
}

impl ImageGenerator {
    pub fn new(config: ImageGenConfig) -> Result<Self, ExternalError> {
        let strategies = candidate_strategies(&config);
        if strategies.is_empty() {
            return Err(ExternalError::NotConfigured { service: "image-generation" });
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ExternalError::CallFailed {
                service: "image-generation",
                detail: e.to_string(),
            })?;
        Ok(Self {
            client,
            config,
            strategies,
        })
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Try every strategy in order; the first image obtained wins.
    pub async fn generate(&self, first_image: &UploadedImage, form: &FormInput) -> Option<Vec<u8>> {
        for strategy in &self.strategies {
            let service = strategy.service();
            match self.run(strategy, first_image, form).await {
                Ok(bytes) => {
                    info!("{service}: generated image ({} bytes)", bytes.len());
                    return Some(bytes);
                }
                Err(e) => warn!("Image generation attempt failed: {e}"),
            }
        }
        None
    }

    async fn run(
        &self,
        strategy: &Strategy,
        first_image: &UploadedImage,
        form: &FormInput,
    ) -> Result<Vec<u8>, ExternalError> {
        let image = match strategy {
            Strategy::OpenAi { api_key } => self.openai(api_key, form).await?,
            Strategy::Gradio { predict_url, token } => {
                self.gradio(predict_url, token.as_deref(), first_image, form)
                    .await?
            }
        };
        self.fetch(strategy.service(), image).await
    }

    async fn openai(&self, api_key: &str, form: &FormInput) -> Result<GeneratedImage, ExternalError> {
        let url = format!(
            "{}/images/generations",
            self.config.openai_base_url.trim_end_matches('/')
        );
        let body = json!({
            "model": self.config.openai_model,
            "prompt": blueprint_prompt(form),
            "size": self.config.openai_size,
            "quality": self.config.openai_quality,
            "n": 1,
        });
        debug!("{OPENAI}: POST {url}");

        let response = self
            .post_json(OPENAI, &url, Some(api_key), &body)
            .await?;
        GeneratedImage::from_openai_response(&response).ok_or_else(|| ExternalError::BadResponse {
            service: OPENAI,
            detail: "no url or b64_json in data[0]".to_string(),
        })
    }

    async fn gradio(
        &self,
        predict_url: &str,
        token: Option<&str>,
        first_image: &UploadedImage,
        form: &FormInput,
    ) -> Result<GeneratedImage, ExternalError> {
        let image = data_uri(first_image);
        let payloads = [
            json!({ "data": [image, technical_drawing_prompt(form)] }),
            json!({ "data": [image] }),
        ];

        let mut last_error = ExternalError::BadResponse {
            service: GRADIO,
            detail: "no payload accepted".to_string(),
        };
        for payload in &payloads {
            debug!("{GRADIO}: POST {predict_url}");
            match self.post_json(GRADIO, predict_url, token, payload).await {
                Ok(response) => {
                    let output = response.get("data").unwrap_or(&response);
                    match GeneratedImage::from_gradio_value(output, space_base(predict_url)) {
                        Some(image) => return Ok(image),
                        None => {
                            last_error = ExternalError::BadResponse {
                                service: GRADIO,
                                detail: "prediction carried no image".to_string(),
                            }
                        }
                    }
                }
                Err(e) => {
                    debug!("{GRADIO}: payload rejected: {e}");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }

    async fn post_json(
        &self,
        service: &'static str,
        url: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<Value, ExternalError> {
        let mut request = self.client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ExternalError::Timeout {
                    service,
                    secs: self.config.request_timeout_secs,
                }
            } else {
                ExternalError::CallFailed {
                    service,
                    detail: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExternalError::CallFailed {
                service,
                detail: format!("HTTP {status}"),
            });
        }
        response.json::<Value>().await.map_err(|e| ExternalError::BadResponse {
            service,
            detail: e.to_string(),
        })
    }

    /// Load the generated image into memory.
    async fn fetch(&self, service: &'static str, image: GeneratedImage) -> Result<Vec<u8>, ExternalError> {
        let bytes = match image {
            GeneratedImage::InlineBytes(bytes) => bytes,
            GeneratedImage::RemoteUrl(url) => self.download(service, &url).await?,
        };
        if bytes.is_empty() {
            return Err(ExternalError::BadResponse {
                service,
                detail: "empty image".to_string(),
            });
        }
        Ok(bytes)
    }

    async fn download(&self, service: &'static str, url: &str) -> Result<Vec<u8>, ExternalError> {
        let secs = self.config.download_timeout_secs;
        debug!("{service}: downloading {url}");
        let response = self
            .client
            .get(url)
            .timeout(Duration::from_secs(secs))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExternalError::Timeout { service, secs }
                } else {
                    ExternalError::DownloadFailed {
                        service,
                        detail: e.to_string(),
                    }
                }
            })?;

        if !response.status().is_success() {
            return Err(ExternalError::DownloadFailed {
                service,
                detail: format!("HTTP {}", response.status()),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExternalError::DownloadFailed {
                service,
                detail: e.to_string(),
            })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ImageKind;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\nfake";

    fn photo() -> UploadedImage {
        UploadedImage {
            filename: "foto.png".into(),
            data: bytes::Bytes::from_static(PNG_MAGIC),
            width: 1,
            height: 1,
            kind: ImageKind::Png,
        }
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn space_page_maps_to_subdomain() {
        assert_eq!(
            hf_predict_url("https://huggingface.co/spaces/Some_User/sketch.v2/"),
            "https://some-user-sketch-v2.hf.space/api/predict"
        );
        assert_eq!(
            hf_predict_url("https://my.host/app"),
            "https://my.host/app/api/predict"
        );
        assert_eq!(
            hf_predict_url("https://my.host/app/api/predict"),
            "https://my.host/app/api/predict"
        );
    }

    #[test]
    fn gradio_values_are_normalised() {
        let base = "https://a-b.hf.space";
        assert_eq!(
            GeneratedImage::from_gradio_value(&json!(["data:image/png;base64,YWJj"]), base),
            Some(GeneratedImage::InlineBytes(b"abc".to_vec()))
        );
        assert_eq!(
            GeneratedImage::from_gradio_value(&json!([{"url": "https://x/y.png"}]), base),
            Some(GeneratedImage::RemoteUrl("https://x/y.png".into()))
        );
        assert_eq!(GeneratedImage::from_gradio_value(&json!([]), base), None);
        assert_eq!(GeneratedImage::from_gradio_value(&json!(3), base), None);
    }

    #[test]
    fn gradio_paths_resolve_on_the_space() {
        let base = space_base("https://a-b.hf.space/api/predict");
        assert_eq!(base, "https://a-b.hf.space");
        assert_eq!(
            GeneratedImage::from_gradio_value(&json!({"path": "/tmp/out.png"}), base),
            Some(GeneratedImage::RemoteUrl("https://a-b.hf.space/file=/tmp/out.png".into()))
        );
        assert_eq!(
            GeneratedImage::from_gradio_value(&json!(["/etc/hostname"]), base),
            Some(GeneratedImage::RemoteUrl("https://a-b.hf.space/file=/etc/hostname".into()))
        );
    }

    #[test]
    fn openai_body_prefers_url() {
        let body = json!({"data": [{"url": "https://cdn/img.png", "b64_json": "YWJj"}]});
        assert_eq!(
            GeneratedImage::from_openai_response(&body),
            Some(GeneratedImage::RemoteUrl("https://cdn/img.png".into()))
        );
        let body = json!({"data": [{"b64_json": "YWJj"}]});
        assert_eq!(
            GeneratedImage::from_openai_response(&body),
            Some(GeneratedImage::InlineBytes(b"abc".to_vec()))
        );
        assert_eq!(GeneratedImage::from_openai_response(&json!({"data": []})), None);
    }

    #[test]
    fn strategies_follow_configuration() {
        assert!(candidate_strategies(&ImageGenConfig::default()).is_empty());
        assert!(ImageGenerator::new(ImageGenConfig::default()).is_err());

        let config = ImageGenConfig {
            openai_api_key: Some("sk-test".into()),
            hf_space_url: Some("https://huggingface.co/spaces/a/b".into()),
            ..Default::default()
        };
        let strategies = candidate_strategies(&config);
        assert_eq!(strategies.len(), 2);
        assert!(matches!(strategies[0], Strategy::OpenAi { .. }));
        assert!(matches!(strategies[1], Strategy::Gradio { .. }));
    }

    #[tokio::test]
    async fn openai_url_result_is_downloaded() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let file_url = format!("{base}/files/out.png");
        let app = Router::new()
            .route(
                "/v1/images/generations",
                post(move |Json(body): Json<Value>| async move {
                    assert_eq!(body["n"], 1);
                    assert!(body["prompt"].as_str().unwrap().contains("blueprint"));
                    Json(json!({"data": [{"url": file_url}]}))
                }),
            )
            .route("/files/out.png", get(|| async { PNG_MAGIC.to_vec() }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let generator = ImageGenerator::new(ImageGenConfig {
            openai_api_key: Some("sk-test".into()),
            openai_base_url: format!("{base}/v1"),
            ..Default::default()
        })
        .unwrap();

        let bytes = generator.generate(&photo(), &FormInput::default()).await;
        assert_eq!(bytes.as_deref(), Some(PNG_MAGIC));
    }

    #[tokio::test]
    async fn gradio_falls_back_to_single_input() {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/api/predict",
                post(
                    |State(calls): State<Arc<AtomicUsize>>, Json(body): Json<Value>| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let inputs = body["data"].as_array().map(Vec::len).unwrap_or(0);
                        if inputs == 2 {
                            return Err(StatusCode::UNPROCESSABLE_ENTITY);
                        }
                        Ok(Json(json!({"data": ["data:image/png;base64,YWJj"]})))
                    },
                ),
            )
            .with_state(calls.clone());
        let base = spawn(app).await;

        let generator = ImageGenerator::new(ImageGenConfig {
            hf_space_url: Some(base),
            ..Default::default()
        })
        .unwrap();

        let bytes = generator.generate(&photo(), &FormInput::default()).await;
        assert_eq!(bytes.as_deref(), Some(&b"abc"[..]));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gradio_is_tried_after_openai_fails() {
        let app = Router::new()
            .route(
                "/v1/images/generations",
                post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
            )
            .route(
                "/api/predict",
                post(|| async { Json(json!({"data": ["data:image/png;base64,YWJj"]})) }),
            );
        let base = spawn(app).await;

        let generator = ImageGenerator::new(ImageGenConfig {
            openai_api_key: Some("sk-test".into()),
            openai_base_url: format!("{base}/v1"),
            hf_space_url: Some(base),
            ..Default::default()
        })
        .unwrap();

        let bytes = generator.generate(&photo(), &FormInput::default()).await;
        assert_eq!(bytes.as_deref(), Some(&b"abc"[..]));
    }

    #[tokio::test]
    async fn gradio_path_is_never_read_from_local_disk() {
        let dir = tempfile::tempdir().unwrap();
        let secret = dir.path().join("secret.txt");
        std::fs::write(&secret, "server-only").unwrap();
        let reply = json!({"data": [secret.to_string_lossy()]});
        let app = Router::new().route(
            "/api/predict",
            post(move || {
                let reply = reply.clone();
                async move { Json(reply) }
            }),
        );
        let base = spawn(app).await;

        let generator = ImageGenerator::new(ImageGenConfig {
            hf_space_url: Some(base),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(generator.generate(&photo(), &FormInput::default()).await, None);
    }

    #[tokio::test]
    async fn gradio_file_reference_is_downloaded_from_space() {
        let app = Router::new()
            .route(
                "/api/predict",
                post(|| async { Json(json!({"data": [{"path": "/tmp/gradio/out.png"}]})) }),
            )
            .fallback(|uri: axum::http::Uri| async move {
                if uri.path() == "/file=/tmp/gradio/out.png" {
                    Ok(PNG_MAGIC.to_vec())
                } else {
                    Err(StatusCode::NOT_FOUND)
                }
            });
        let base = spawn(app).await;

        let generator = ImageGenerator::new(ImageGenConfig {
            hf_space_url: Some(base),
            ..Default::default()
        })
        .unwrap();

        let bytes = generator.generate(&photo(), &FormInput::default()).await;
        assert_eq!(bytes.as_deref(), Some(PNG_MAGIC));
    }

    #[tokio::test]
    async fn total_failure_yields_none() {
        let app = Router::new().route(
            "/api/predict",
            post(|| async { Json(json!({"data": [null]})) }),
        );
        let base = spawn(app).await;
        let generator = ImageGenerator::new(ImageGenConfig {
            hf_space_url: Some(base),
            ..Default::default()
        })
        .unwrap();
        assert!(generator.generate(&photo(), &FormInput::default()).await.is_none());
    }
}
