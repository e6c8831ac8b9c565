//! Collaborator construction from settings

use std::sync::Arc;

use crate::config::{Provider, Settings};
use crate::error::{Error, Result};

use super::{AnthropicCollaborator, LanguageModelCollaborator, OpenAiCollaborator};

/// Build the configured vendor client.
///
/// API keys come from the environment; a missing key is a configuration
/// error, not something to retry.
pub fn create_collaborator(settings: &Settings) -> Result<Arc<dyn LanguageModelCollaborator>> {
    match settings.provider {
        Provider::Anthropic => {
            let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
                Error::Config("ANTHROPIC_API_KEY is not set".to_string())
            })?;
            let collaborator = AnthropicCollaborator::new(api_key, settings.model.clone())?;
            Ok(Arc::new(collaborator))
        }
        Provider::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY")
                .map_err(|_| Error::Config("OPENAI_API_KEY is not set".to_string()))?;
            let collaborator = OpenAiCollaborator::new(api_key, settings.model.clone())?;
            Ok(Arc::new(collaborator))
        }
    }
}
