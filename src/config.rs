//! Configuration types for the MarmoView server.
//!
//! All server behaviour is controlled through [`ServerConfig`], built via its
//! [`ServerConfigBuilder`]. External integrations get their own sections:
//! [`VisionSettings`] for the layout-analysis model and [`ImageGenConfig`]
//! for the optional image-generation services. Each section is handed to its
//! collaborator explicitly; nothing reads global state after startup.

use crate::error::MarmoError;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Upload file extensions accepted by default (compared case-insensitively).
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

const MIB: usize = 1024 * 1024;

/// Configuration for the MarmoView HTTP server.
///
/// # Example
/// ```rust
/// use marmoview::ServerConfig;
///
/// let config = ServerConfig::builder()
///     .bind_addr("127.0.0.1:8080".parse().unwrap())
///     .max_sessions(100)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_files, 5);
/// ```
#[derive(Clone)]
pub struct ServerConfig {
    /// Listen address. Default: `0.0.0.0:5000`.
    pub bind_addr: SocketAddr,

    /// Directory holding `index.html` and the other front-end assets. Default: `.`.
    pub static_dir: PathBuf,

    /// Maximum files per upload. Default: 5.
    pub max_files: usize,

    /// Maximum bytes per uploaded file. Default: 10 MiB.
    pub max_file_size: usize,

    /// Accepted lowercase file extensions.
    pub allowed_extensions: Vec<String>,

    /// Idle lifetime of a session in seconds. `0` disables expiry. Default: 86 400.
    pub session_ttl_secs: u64,

    /// Live sessions kept before the least recently used one is evicted. Default: 1 000.
    pub max_sessions: usize,

    /// TrueType font used for drawing labels. When `None`, a few common
    /// system locations are probed; without any font, labels are skipped.
    pub font_path: Option<PathBuf>,

    /// Layout-analysis model. `None` disables vision analysis.
    pub vision: Option<VisionSettings>,

    /// Image-generation services. Both unset disables generation.
    pub image_gen: ImageGenConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            static_dir: PathBuf::from("."),
            max_files: 5,
            max_file_size: 10 * MIB,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            session_ttl_secs: 86_400,
            max_sessions: 1_000,
            font_path: None,
            vision: None,
            image_gen: ImageGenConfig::default(),
        }
    }
}

impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("static_dir", &self.static_dir)
            .field("max_files", &self.max_files)
            .field("max_file_size", &self.max_file_size)
            .field("allowed_extensions", &self.allowed_extensions)
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("max_sessions", &self.max_sessions)
            .field("font_path", &self.font_path)
            .field("vision", &self.vision)
            .field("image_gen", &self.image_gen)
            .finish()
    }
}

impl ServerConfig {
    /// Create a new builder for `ServerConfig`.
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder {
            config: Self::default(),
        }
    }

    /// Request body cap for the upload route: every file at its maximum plus
    /// 1 MiB for the form fields and multipart framing.
    pub fn body_limit(&self) -> usize {
        self.max_files
            .saturating_mul(self.max_file_size)
            .saturating_add(MIB)
    }

    /// Per-file size cap in whole megabytes, as shown in error messages.
    pub fn max_file_size_mb(&self) -> usize {
        self.max_file_size / MIB
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.config.bind_addr = addr;
        self
    }

    pub fn static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.static_dir = dir.into();
        self
    }

    pub fn max_files(mut self, n: usize) -> Self {
        self.config.max_files = n;
        self
    }

    pub fn max_file_size(mut self, bytes: usize) -> Self {
        self.config.max_file_size = bytes;
        self
    }

    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn session_ttl_secs(mut self, secs: u64) -> Self {
        self.config.session_ttl_secs = secs;
        self
    }

    pub fn max_sessions(mut self, n: usize) -> Self {
        self.config.max_sessions = n;
        self
    }

    pub fn font_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.font_path = Some(path.into());
        self
    }

    pub fn vision(mut self, settings: VisionSettings) -> Self {
        self.config.vision = Some(settings);
        self
    }

    pub fn image_gen(mut self, config: ImageGenConfig) -> Self {
        self.config.image_gen = config;
        self
    }

    /// Validate and build the config.
    pub fn build(self) -> Result<ServerConfig, MarmoError> {
        let c = &self.config;
        if c.max_files == 0 {
            return Err(MarmoError::InvalidConfig("max_files must be at least 1".into()));
        }
        if c.max_file_size == 0 {
            return Err(MarmoError::InvalidConfig(
                "max_file_size must be greater than zero".into(),
            ));
        }
        if c.max_sessions == 0 {
            return Err(MarmoError::InvalidConfig(
                "max_sessions must be at least 1".into(),
            ));
        }
        if c.allowed_extensions.is_empty() {
            return Err(MarmoError::InvalidConfig(
                "at least one upload extension must be allowed".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Vision analysis ──────────────────────────────────────────────────────

/// Settings for the vision model that reads the uploaded photos.
#[derive(Clone)]
pub struct VisionSettings {
    /// edgequake-llm provider name. Default: `anthropic`.
    pub provider: String,

    /// Model identifier. Default: `claude-3-5-sonnet-20241022`.
    pub model: String,

    /// Explicit API key. When unset the provider reads its own
    /// environment variable (`ANTHROPIC_API_KEY`, `OPENAI_API_KEY`, ...).
    pub api_key: Option<String>,

    /// Photos sent per analysis; the rest are ignored. Default: 3.
    pub max_images: usize,

    /// Completion budget for the JSON answer. Default: 1024.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Whole-call timeout in seconds. Default: 60.
    pub timeout_secs: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            api_key: None,
            max_images: 3,
            max_tokens: 1024,
            temperature: 0.2,
            timeout_secs: 60,
        }
    }
}

impl fmt::Debug for VisionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisionSettings")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("max_images", &self.max_images)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Image generation ─────────────────────────────────────────────────────

/// Endpoints and credentials for the image-generation services.
///
/// Strategies are attempted in a fixed order: OpenAI Images first (when
/// `openai_api_key` is set), then the hosted Gradio space (when
/// `hf_space_url` is set).
#[derive(Clone)]
pub struct ImageGenConfig {
    pub openai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible API. Default: `https://api.openai.com/v1`.
    pub openai_base_url: String,

    /// Default: `dall-e-3`.
    pub openai_model: String,

    /// Default: `1024x1024`.
    pub openai_size: String,

    /// Default: `standard`.
    pub openai_quality: String,

    /// Hugging Face space page URL or direct app URL.
    pub hf_space_url: Option<String>,

    /// Bearer token for private spaces.
    pub hf_token: Option<String>,

    /// Generation request timeout in seconds. Default: 120.
    pub request_timeout_secs: u64,

    /// Timeout for downloading a generated image by URL. Default: 60.
    pub download_timeout_secs: u64,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "dall-e-3".to_string(),
            openai_size: "1024x1024".to_string(),
            openai_quality: "standard".to_string(),
            hf_space_url: None,
            hf_token: None,
            request_timeout_secs: 120,
            download_timeout_secs: 60,
        }
    }
}

impl ImageGenConfig {
    /// `true` when at least one generation service is configured.
    pub fn is_enabled(&self) -> bool {
        self.openai_api_key.as_deref().is_some_and(|k| !k.is_empty())
            || self.hf_space_url.as_deref().is_some_and(|u| !u.is_empty())
    }
}

impl fmt::Debug for ImageGenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageGenConfig")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("openai_base_url", &self.openai_base_url)
            .field("openai_model", &self.openai_model)
            .field("hf_space_url", &self.hf_space_url)
            .field("hf_token", &self.hf_token.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_upload_policy() {
        let c = ServerConfig::default();
        assert_eq!(c.max_files, 5);
        assert_eq!(c.max_file_size, 10 * 1024 * 1024);
        assert_eq!(c.allowed_extensions, vec!["png", "jpg", "jpeg"]);
        assert_eq!(c.bind_addr.port(), 5000);
        assert!(c.vision.is_none());
        assert!(!c.image_gen.is_enabled());
    }

    #[test]
    fn builder_normalises_extensions() {
        let c = ServerConfig::builder()
            .allowed_extensions([".PNG", "Jpg"])
            .build()
            .unwrap();
        assert_eq!(c.allowed_extensions, vec!["png", "jpg"]);
    }

    #[test]
    fn builder_rejects_zero_limits() {
        assert!(ServerConfig::builder().max_files(0).build().is_err());
        assert!(ServerConfig::builder().max_sessions(0).build().is_err());
        assert!(ServerConfig::builder().max_file_size(0).build().is_err());
    }

    #[test]
    fn body_limit_covers_full_batch() {
        let c = ServerConfig::default();
        assert_eq!(c.body_limit(), 5 * 10 * 1024 * 1024 + 1024 * 1024);
        assert_eq!(c.max_file_size_mb(), 10);
    }

    #[test]
    fn image_gen_enabled_by_either_service() {
        let openai = ImageGenConfig {
            openai_api_key: Some("sk-test".into()),
            ..Default::default()
        };
        assert!(openai.is_enabled());
        let hf = ImageGenConfig {
            hf_space_url: Some("https://huggingface.co/spaces/a/b".into()),
            ..Default::default()
        };
        assert!(hf.is_enabled());
        let empty_key = ImageGenConfig {
            openai_api_key: Some(String::new()),
            ..Default::default()
        };
        assert!(!empty_key.is_enabled());
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = ImageGenConfig {
            openai_api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));

        let v = VisionSettings {
            api_key: Some("sk-ant-secret".into()),
            ..Default::default()
        };
        let dbg = format!("{v:?}");
        assert!(!dbg.contains("sk-ant-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
