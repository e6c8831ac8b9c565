//! OpenAI chat completions API client

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{classify_message, CollaboratorError, CompletionRequest, LanguageModelCollaborator};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

pub struct OpenAiCollaborator {
    client: Client,
    api_key: String,
    model: String,
}

impl OpenAiCollaborator {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self, CollaboratorError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| {
                CollaboratorError::Permanent(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait::async_trait]
impl LanguageModelCollaborator for OpenAiCollaborator {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CollaboratorError> {
        let mut messages = Vec::new();
        if let Some(system) = request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt,
        });

        let body = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_message(&format!("API request failed: {e}")))?;

        match response.status() {
            StatusCode::OK => {
                let parsed: ChatResponse = response.json().await.map_err(|e| {
                    CollaboratorError::Permanent(format!("failed to parse response: {e}"))
                })?;
                Ok(parsed
                    .choices
                    .first()
                    .map(|c| c.message.content.clone())
                    .unwrap_or_default())
            }
            StatusCode::TOO_MANY_REQUESTS => {
                Err(CollaboratorError::Transient("rate limit exceeded".to_string()))
            }
            StatusCode::UNAUTHORIZED => {
                Err(CollaboratorError::Permanent("invalid API key".to_string()))
            }
            status if status.is_server_error() => Err(CollaboratorError::Transient(format!(
                "server error {status}"
            ))),
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(CollaboratorError::Permanent(format!(
                    "API error {status}: {error_text}"
                )))
            }
        }
    }

    fn name(&self) -> &str {
        "openai"
    }
}
