//! HTTP surface: axum router, handlers and the serve loop.
//!
//! Handlers stay thin. Multipart parsing happens here, everything else is
//! delegated to [`crate::pipeline::upload`], [`crate::workflow`] and the
//! [`SessionStore`]. Every failure is a [`MarmoError`], which renders itself
//! as `{"error": "..."}` with the matching status.

use crate::config::ServerConfig;
use crate::error::MarmoError;
use crate::model::SessionSummary;
use crate::pipeline::encode::sniff_mime;
use crate::pipeline::imagegen::ImageGenerator;
use crate::pipeline::pdf::report_filename;
use crate::pipeline::upload::{ingest, UploadFile, UploadRequest};
use crate::pipeline::vision::VisionAnalyzer;
use crate::session::SessionStore;
use crate::workflow;
use ab_glyph::FontVec;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// Shared, cheaply clonable application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub store: Arc<SessionStore>,
    /// `None` when no vision provider is configured.
    pub vision: Option<VisionAnalyzer>,
    /// `None` when no image-generation service is configured.
    pub image_gen: Option<ImageGenerator>,
    /// Label font for the raster drawing; labels are skipped without one.
    pub font: Option<Arc<FontVec>>,
}

impl AppState {
    /// State with a store sized from `config` and no optional integrations.
    pub fn new(config: ServerConfig) -> Self {
        let ttl = (config.session_ttl_secs > 0).then(|| Duration::from_secs(config.session_ttl_secs));
        let store = SessionStore::new(ttl, config.max_sessions);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            vision: None,
            image_gen: None,
            font: None,
        }
    }

    pub fn with_vision(mut self, vision: VisionAnalyzer) -> Self {
        self.vision = Some(vision);
        self
    }

    pub fn with_image_gen(mut self, generator: ImageGenerator) -> Self {
        self.image_gen = Some(generator);
        self
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(Arc::new(font));
        self
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);
    let body_limit = state.config.body_limit();

    Router::new()
        .route("/", get(index))
        .route("/api/upload", post(upload))
        .route("/api/generate-drawing/:session_id", post(generate_drawing))
        .route("/api/drawing-image/:session_id", get(drawing_image))
        .route("/api/generate-pdf/:session_id", get(generate_pdf))
        .route("/api/session/:session_id", get(session))
        .route("/api/health", get(health))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.config.bind_addr;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("MarmoView listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn index(State(state): State<AppState>) -> Response {
    let path = state.config.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            debug!("index.html unavailable at {}: {e}", path.display());
            (
                axum::http::StatusCode::NOT_FOUND,
                Json(json!({ "error": "Página inicial não encontrada" })),
            )
                .into_response()
        }
    }
}

async fn upload(State(state): State<AppState>, multipart: Multipart) -> Result<Json<Value>, MarmoError> {
    let request = read_multipart(multipart).await?;
    let (images, form) = ingest(request, &state.config)?;
    let count = images.len();
    let id = state.store.create(images, form);
    info!("Session {} created with {count} image(s)", id.short(8));

    Ok(Json(json!({
        "success": true,
        "session_id": id,
        "images_count": count,
        "message": format!("{count} imagem(ns) recebida(s) com sucesso"),
    })))
}

/// Collect file parts named `images` and the form fields. Repeated
/// `stoneElements`/`cutouts` fields accumulate; unknown fields are ignored.
async fn read_multipart(mut multipart: Multipart) -> Result<UploadRequest, MarmoError> {
    let mut request = UploadRequest::default();
    let bad = |e: axum::extract::multipart::MultipartError| MarmoError::InvalidUpload(e.to_string());

    while let Some(field) = multipart.next_field().await.map_err(bad)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "images" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(bad)?;
                request.push_file(UploadFile { filename, data });
            }
            "characteristics" => request.form.characteristics = field.text().await.map_err(bad)?,
            "envType" => request.form.env_type = field.text().await.map_err(bad)?,
            "format" => request.form.format = field.text().await.map_err(bad)?,
            "stoneElements" => request.form.stone_elements.push(field.text().await.map_err(bad)?),
            "cutouts" => request.form.cutouts.push(field.text().await.map_err(bad)?),
            other => debug!("Ignoring multipart field '{other}'"),
        }
    }
    Ok(request)
}

async fn generate_drawing(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, MarmoError> {
    let outcome = workflow::generate_drawing(&state, &session_id).await?;
    Ok(Json(json!({
        "success": true,
        "session_id": session_id,
        "drawing": outcome.drawing,
        "drawing_url": format!("/api/drawing-image/{session_id}"),
        "ai_analysis": outcome.ai_analysis,
        "message": "Desenho conceitual gerado com sucesso",
    })))
}

async fn drawing_image(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, MarmoError> {
    let image = state
        .store
        .get(&session_id)?
        .drawing_image
        .ok_or(MarmoError::ImageNotGenerated)?;
    Ok(([(header::CONTENT_TYPE, sniff_mime(&image))], image).into_response())
}

async fn generate_pdf(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, MarmoError> {
    let (id, pdf) = workflow::export_pdf(&state, &session_id).await?;
    let disposition = format!("attachment; filename=\"{}\"", report_filename(&id));
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    )
        .into_response())
}

async fn session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, MarmoError> {
    state.store.summarize(&session_id).map(Json)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "sessions_active": state.store.len(),
        "timestamp": chrono::Local::now().to_rfc3339(),
    }))
}
