//! CLI binary for marmoview.
//!
//! A thin shim over the library crate that maps CLI flags and environment
//! variables to `ServerConfig`, wires the optional integrations and serves.

use anyhow::{Context, Result};
use clap::Parser;
use marmoview::pipeline::render::load_font;
use marmoview::{serve, AppState, ImageGenConfig, ImageGenerator, ServerConfig, VisionAnalyzer, VisionSettings};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the front-end in ./static on port 5000
  marmoview --static-dir static

  # Local development, verbose logs
  marmoview --host 127.0.0.1 --port 8080 -v

  # Vision analysis with Anthropic plus DALL-E replacement images
  ANTHROPIC_API_KEY=sk-ant-... OPENAI_API_KEY=sk-... marmoview

INTEGRATIONS:
  Vision analysis   enabled when the provider's API key is set
                    (ANTHROPIC_API_KEY for the default provider)
  OpenAI Images     enabled when OPENAI_API_KEY is set
  Gradio space      enabled when HF_SPACE_URL is set (HF_API_KEY for private spaces)

  Every integration is optional. Without them the drawing is rendered
  locally from the form data alone.
"#;

/// Conceptual countertop drawings from room photos.
#[derive(Parser, Debug)]
#[command(
    name = "marmoview",
    version,
    about = "Conceptual stone-countertop drawings from room photos",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "MARMOVIEW_HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(short, long, env = "MARMOVIEW_PORT", default_value_t = 5000)]
    port: u16,

    /// Directory with index.html and the front-end assets.
    #[arg(long, env = "MARMOVIEW_STATIC_DIR", default_value = ".")]
    static_dir: PathBuf,

    /// Idle session lifetime in seconds (0 disables expiry).
    #[arg(long, env = "MARMOVIEW_SESSION_TTL", default_value_t = 86_400)]
    session_ttl: u64,

    /// Maximum number of sessions kept in memory.
    #[arg(long, env = "MARMOVIEW_MAX_SESSIONS", default_value_t = 1_000)]
    max_sessions: usize,

    /// TrueType font for drawing labels (system fonts are probed otherwise).
    #[arg(long, env = "MARMOVIEW_FONT")]
    font: Option<PathBuf>,

    /// API key for the vision provider; required by the default
    /// `anthropic` provider. Other providers fall back to their own env var.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,

    /// Vision provider: anthropic, openai, gemini, ollama, …
    #[arg(long, env = "MARMOVIEW_VISION_PROVIDER", default_value = "anthropic")]
    vision_provider: String,

    /// Vision model ID.
    #[arg(long, env = "MARMOVIEW_VISION_MODEL", default_value = "claude-3-5-sonnet-20241022")]
    vision_model: String,

    /// Disable vision analysis even when a key is available.
    #[arg(long)]
    no_vision: bool,

    /// OpenAI API key for DALL-E replacement images.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    openai_base_url: String,

    /// Hugging Face space (page URL or app URL) for image-to-image drawings.
    #[arg(long, env = "HF_SPACE_URL")]
    hf_space_url: Option<String>,

    /// Bearer token for a private Hugging Face space.
    #[arg(long, env = "HF_API_KEY", hide_env_values = true)]
    hf_api_key: Option<String>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "MARMOVIEW_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    info!("Configuration: {:?}", config);

    // ── Optional integrations ────────────────────────────────────────────
    let mut state = AppState::new(config.clone());

    match config.vision.clone() {
        Some(settings) => match VisionAnalyzer::from_settings(settings) {
            Ok(analyzer) => {
                info!(
                    "Vision analysis: enabled ({} / {})",
                    analyzer.settings().provider,
                    analyzer.settings().model
                );
                state = state.with_vision(analyzer);
            }
            Err(e) => warn!("Vision analysis: disabled ({e})"),
        },
        None => info!("Vision analysis: disabled (no API key)"),
    }

    if config.image_gen.is_enabled() {
        match ImageGenerator::new(config.image_gen.clone()) {
            Ok(generator) => {
                info!("Image generation: enabled ({} strategies)", generator.strategies().len());
                state = state.with_image_gen(generator);
            }
            Err(e) => warn!("Image generation: disabled ({e})"),
        }
    } else {
        info!("Image generation: disabled (local drawings only)");
    }

    let font = tokio::task::spawn_blocking({
        let path = config.font_path.clone();
        move || load_font(path.as_deref())
    })
    .await
    .context("Font loading task failed")?;
    if let Some(font) = font {
        state = state.with_font(font);
    }

    // ── Serve ────────────────────────────────────────────────────────────
    serve(state).await.context("HTTP server failed")
}

fn build_config(cli: &Cli) -> Result<ServerConfig> {
    let mut builder = ServerConfig::builder()
        .bind_addr(SocketAddr::new(cli.host, cli.port))
        .static_dir(cli.static_dir.clone())
        .session_ttl_secs(cli.session_ttl)
        .max_sessions(cli.max_sessions)
        .image_gen(ImageGenConfig {
            openai_api_key: non_empty(&cli.openai_api_key),
            openai_base_url: cli.openai_base_url.clone(),
            hf_space_url: non_empty(&cli.hf_space_url),
            hf_token: non_empty(&cli.hf_api_key),
            ..Default::default()
        });

    if let Some(ref font) = cli.font {
        builder = builder.font_path(font.clone());
    }

    // The default provider needs its key; other providers resolve their own
    // credentials inside the factory.
    let api_key = non_empty(&cli.anthropic_api_key);
    let is_anthropic = cli.vision_provider == "anthropic";
    if !cli.no_vision && (!is_anthropic || api_key.is_some()) {
        builder = builder.vision(VisionSettings {
            provider: cli.vision_provider.clone(),
            model: cli.vision_model.clone(),
            api_key: if is_anthropic { api_key } else { None },
            ..Default::default()
        });
    }

    builder.build().context("Invalid server configuration")
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anthropic_key_flag_reaches_vision_settings() {
        let cli = Cli::parse_from(["marmoview", "--anthropic-api-key", "sk-ant-flag"]);
        let config = build_config(&cli).unwrap();
        let vision = config.vision.unwrap();
        assert_eq!(vision.api_key.as_deref(), Some("sk-ant-flag"));
        assert!(VisionAnalyzer::from_settings(vision).is_ok());
    }

    #[test]
    fn no_vision_flag_wins_over_key() {
        let cli = Cli::parse_from(["marmoview", "--anthropic-api-key", "sk-ant-flag", "--no-vision"]);
        assert!(build_config(&cli).unwrap().vision.is_none());
    }
}
