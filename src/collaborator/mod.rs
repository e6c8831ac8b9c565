//! Language-model collaborator abstraction
//!
//! The pipeline depends only on the `LanguageModelCollaborator` trait; one
//! implementation exists per vendor. Retry policy lives outside the
//! implementations (see `crate::retry`) so every call site shares the same
//! bounded-backoff behavior.

pub mod anthropic;
pub mod factory;
pub mod openai;

pub use anthropic::AnthropicCollaborator;
pub use factory::create_collaborator;
pub use openai::OpenAiCollaborator;

use async_trait::async_trait;
use thiserror::Error;

/// Failure modes of a completion call.
///
/// Transient errors (rate limits, timeouts, connection resets) are
/// candidates for retry; permanent errors (bad credentials, malformed
/// requests) are not.
#[derive(Error, Debug, Clone)]
pub enum CollaboratorError {
    #[error("transient collaborator failure: {0}")]
    Transient(String),

    #[error("permanent collaborator failure: {0}")]
    Permanent(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CollaboratorError::Transient(_))
    }
}

/// A single text-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            temperature: 0.7,
            max_tokens: 2048,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Uniform text-completion interface over any LLM vendor.
#[async_trait]
pub trait LanguageModelCollaborator: Send + Sync {
    /// Complete a prompt, returning the raw response text.
    async fn complete(&self, request: CompletionRequest) -> Result<String, CollaboratorError>;

    /// Vendor name for logging.
    fn name(&self) -> &str;
}

/// Classify an error message as transient or permanent.
///
/// Shared by the vendor clients for network-level failures where the HTTP
/// status is not available.
pub(crate) fn classify_message(message: &str) -> CollaboratorError {
    let lower = message.to_lowercase();
    let transient_patterns = [
        "rate limit",
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "temporary failure",
        "network",
        "503",
        "529",
        "429",
        "broken pipe",
    ];
    if transient_patterns.iter().any(|p| lower.contains(p)) {
        CollaboratorError::Transient(message.to_string())
    } else {
        CollaboratorError::Permanent(message.to_string())
    }
}
