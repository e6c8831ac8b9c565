//! Anthropic messages API client

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{classify_message, CollaboratorError, CompletionRequest, LanguageModelCollaborator};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: usize,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct AnthropicCollaborator {
    client: Client,
    api_key: String,
    model: String,
}

impl AnthropicCollaborator {
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
impl LanguageModelCollaborator for AnthropicCollaborator {
    async fn complete(&self, request: CompletionRequest) -> Result<String, CollaboratorError> {
        let body = MessagesRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system,
        };

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_message(&format!("API request failed: {e}")))?;

        match response.status() {
            StatusCode::OK => {
                let parsed: MessagesResponse = response.json().await.map_err(|e| {
                    CollaboratorError::Permanent(format!("failed to parse response: {e}"))
                })?;
                Ok(parsed
                    .content
                    .first()
                    .map(|c| c.text.clone())
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
        "anthropic"
    }
}
