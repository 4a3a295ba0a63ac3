//! Provider trait: the abstraction over chat-completion backends.
//!
//! A Provider knows how to send a list of messages to a model endpoint and
//! get one completion back. Backend selection, credential rotation and
//! retries live one level up, in the providers crate's `ProviderClient`; a
//! Provider performs exactly one attempt per call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a single completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o", "openrouter/auto")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic)
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    #[serde(other)]
    Other,
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// Generated text; `None` when the backend returned a null message
    pub content: Option<String>,

    /// Model-reported reasoning text, when the backend exposes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// Every backend (OpenAI, Azure OpenAI, OpenRouter, a local vLLM server)
/// implements this trait. The credential is passed per call so that the
/// caller can rotate keys without rebuilding the provider.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openrouter", "azure").
    fn name(&self) -> &str;

    /// Send a request with the given credential and get a complete response.
    async fn complete(
        &self,
        api_key: &str,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_finish_reason_maps_to_other() {
        let reason: FinishReason = serde_json::from_str(r#""tool_calls""#).unwrap();
        assert_eq!(reason, FinishReason::Other);
        let reason: FinishReason = serde_json::from_str(r#""content_filter""#).unwrap();
        assert_eq!(reason, FinishReason::ContentFilter);
    }

    #[test]
    fn request_omits_missing_max_tokens() {
        let req = ProviderRequest {
            model: "gpt-4o".into(),
            messages: vec![Message::user("hi")],
            temperature: 0.0,
            max_tokens: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("max_tokens"));
    }
}
