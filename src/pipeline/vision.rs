//! Vision analysis: uploaded photos → [`VisionAnalysis`] via an LLM provider.
//!
//! The wording lives in [`crate::prompts`] and the tolerant
//! parsing in [`crate::analysis`]. This stage only builds the multimodal
//! request, bounds it with a timeout and turns every failure into `None`
//! plus a log line, so the drawing pipeline always continues.

use crate::analysis::VisionAnalysis;
use crate::config::VisionSettings;
use crate::error::ExternalError;
use crate::model::{FormInput, UploadedImage};
use crate::pipeline::encode::encode_upload;
use crate::prompts::{vision_user_prompt, VISION_SYSTEM_PROMPT};
use edgequake_llm::{
    AnthropicProvider, ChatMessage, CompletionOptions, GeminiProvider, LLMProvider, OpenAIProvider,
    ProviderFactory,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

const SERVICE: &str = "vision";

/// Configured layout-analysis client.
#[derive(Clone)]
pub struct VisionAnalyzer {
    provider: Arc<dyn LLMProvider>,
    settings: VisionSettings,
}

impl VisionAnalyzer {
    /// Wrap a pre-built provider. Useful in tests or with custom middleware.
    pub fn new(provider: Arc<dyn LLMProvider>, settings: VisionSettings) -> Self {
        Self { provider, settings }
    }

    /// Instantiate the named provider.
    ///
    /// An explicit `api_key` is handed straight to the provider for
    /// `anthropic`, `openai` and `gemini`. Otherwise [`ProviderFactory`]
    /// reads the matching key from the environment.
    pub fn from_settings(settings: VisionSettings) -> Result<Self, ExternalError> {
        let provider = match keyed_provider(&settings) {
            Some(provider) => provider,
            None => ProviderFactory::create_llm_provider(&settings.provider, &settings.model)
                .map_err(|e| ExternalError::CallFailed {
                    service: SERVICE,
                    detail: format!("provider '{}' unavailable: {e}", settings.provider),
                })?,
        };
        Ok(Self::new(provider, settings))
    }

    pub fn settings(&self) -> &VisionSettings {
        &self.settings
    }

    /// Analyse the first few photos. Never fails: errors are logged and
    /// reported as `None`.
    pub async fn analyze(&self, images: &[UploadedImage], form: &FormInput) -> Option<VisionAnalysis> {
        if images.is_empty() {
            debug!("No images to analyse");
            return None;
        }
        match self.try_analyze(images, form).await {
            Ok(analysis) => Some(analysis),
            Err(e) => {
                warn!("Vision analysis skipped: {e}");
                None
            }
        }
    }

    async fn try_analyze(
        &self,
        images: &[UploadedImage],
        form: &FormInput,
    ) -> Result<VisionAnalysis, ExternalError> {
        let start = Instant::now();
        let messages = build_messages(images, form, self.settings.max_images);
        let options = build_options(&self.settings);
        let secs = self.settings.timeout_secs;

        let response = timeout(
            Duration::from_secs(secs),
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| ExternalError::Timeout {
            service: SERVICE,
            secs,
        })?
        .map_err(|e| ExternalError::CallFailed {
            service: SERVICE,
            detail: e.to_string(),
        })?;

        debug!(
            "Vision call: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        let analysis = VisionAnalysis::from_model_text(&response.content).map_err(|e| {
            ExternalError::BadResponse {
                service: SERVICE,
                detail: e.to_string(),
            }
        })?;

        info!(
            "Vision analysis ready (confidence: {})",
            analysis.confidence_label().as_deref().unwrap_or("n/a")
        );
        Ok(analysis)
    }
}

/// System prompt, then one user turn carrying the instruction and up to
/// `max_images` photos.
fn build_messages(images: &[UploadedImage], form: &FormInput, max_images: usize) -> Vec<ChatMessage> {
    let attachments = images
        .iter()
        .take(max_images.max(1))
        .map(encode_upload)
        .collect();
    let instruction = vision_user_prompt(form);

    vec![
        ChatMessage::system(VISION_SYSTEM_PROMPT),
        ChatMessage::user_with_images(&instruction, attachments),
    ]
}

fn keyed_provider(settings: &VisionSettings) -> Option<Arc<dyn LLMProvider>> {
    let key = settings.api_key.as_deref().filter(|k| !k.trim().is_empty())?;
    let model = settings.model.as_str();
    let provider: Arc<dyn LLMProvider> = match settings.provider.to_lowercase().as_str() {
        "anthropic" | "claude" => Arc::new(AnthropicProvider::new(key).with_model(model)),
        "openai" => Arc::new(OpenAIProvider::new(key).with_model(model)),
        "gemini" => Arc::new(GeminiProvider::new(key).with_model(model)),
        _ => return None,
    };
    Some(provider)
}

fn build_options(settings: &VisionSettings) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(settings.temperature),
        max_tokens: Some(settings.max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let opts = build_options(&VisionSettings::default());
        assert_eq!(opts.temperature, Some(0.2));
        assert_eq!(opts.max_tokens, Some(1024));
    }

    #[test]
    fn explicit_key_builds_provider_without_env() {
        let settings = VisionSettings {
            api_key: Some("sk-ant-test".into()),
            ..Default::default()
        };
        let analyzer = VisionAnalyzer::from_settings(settings).unwrap();
        assert_eq!(analyzer.settings().provider, "anthropic");
        assert_eq!(analyzer.provider.model(), "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn keyless_or_unknown_provider_defers_to_factory() {
        assert!(keyed_provider(&VisionSettings::default()).is_none());
        let blank = VisionSettings {
            api_key: Some("  ".into()),
            ..Default::default()
        };
        assert!(keyed_provider(&blank).is_none());
        let ollama = VisionSettings {
            provider: "ollama".into(),
            api_key: Some("unused".into()),
            ..Default::default()
        };
        assert!(keyed_provider(&ollama).is_none());
    }

    #[test]
    fn messages_are_system_then_user() {
        let messages = build_messages(&[], &FormInput::default(), 3);
        assert_eq!(messages.len(), 2);
    }
}
