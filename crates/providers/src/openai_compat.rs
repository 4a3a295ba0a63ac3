//! OpenAI-compatible chat-completions provider.
//!
//! One implementation serves every backend Nuggetizer talks to: hosted
//! OpenAI, Azure OpenAI deployments, OpenRouter and local vLLM servers all
//! expose the same `/chat/completions` shape. The differences are confined to
//! the URL, the auth header and the name of the output-length field.

use async_trait::async_trait;
use nuggetizer_core::error::ProviderError;
use nuggetizer_core::message::Message;
use nuggetizer_core::provider::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::Backend;

/// An OpenAI-compatible LLM provider bound to one resolved backend.
pub struct OpenAiCompatProvider {
    name: String,
    backend: Backend,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a provider for `backend` whose HTTP client gives up after
    /// `timeout`.
    pub fn new(backend: Backend, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: backend.kind().to_string(),
            backend,
            client,
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The completion endpoint for `model`.
    fn endpoint(&self, model: &str) -> String {
        match &self.backend {
            Backend::Azure {
                endpoint,
                api_version,
            } => format!(
                "{endpoint}/openai/deployments/{model}/chat/completions?api-version={api_version}"
            ),
            other => format!("{}/chat/completions", other.base_url()),
        }
    }

    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect()
    }

    fn request_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
        });

        if let Some(max_tokens) = request.max_tokens {
            let field = if self.backend.is_local() {
                "max_tokens"
            } else {
                "max_completion_tokens"
            };
            body[field] = serde_json::json!(max_tokens);
        }

        body
    }
}

#[async_trait]
impl nuggetizer_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        api_key: &str,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = self.endpoint(&request.model);
        let body = self.request_body(&request);

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let builder = self.client.post(&url).header("Content-Type", "application/json");
        let builder = match self.backend {
            Backend::Azure { .. } => builder.header("api-key", api_key),
            _ => builder.header("Authorization", format!("Bearer {api_key}")),
        };

        let response = builder.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            if is_content_filter_error(&error_body) {
                return Err(ProviderError::ContentFiltered(error_body));
            }
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        into_provider_response(api_response, &request.model)
    }
}

/// Azure reports prompt-side filtering as a 400 with `code: content_filter`.
fn is_content_filter_error(body: &str) -> bool {
    serde_json::from_str::<ApiErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.code)
        .is_some_and(|code| code == "content_filter")
}

fn into_provider_response(
    api_response: ApiResponse,
    requested_model: &str,
) -> Result<ProviderResponse, ProviderError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::ApiError {
            status_code: 200,
            message: "No choices in response".into(),
        })?;

    let finish_reason = choice.finish_reason;
    if finish_reason == Some(FinishReason::ContentFilter) {
        return Err(ProviderError::ContentFiltered(
            "Completion stopped by content filter".into(),
        ));
    }

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ProviderResponse {
        content: choice.message.content,
        reasoning: choice.message.reasoning.or(choice.message.reasoning_content),
        usage,
        model: api_response
            .model
            .unwrap_or_else(|| requested_model.to_string()),
        finish_reason,
    })
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
}
