//! Shared test helpers for stage tests.

use nuggetizer_core::error::ProviderError;
use nuggetizer_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use nuggetizer_providers::{Backend, CallSettings, ProviderClient};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock provider that replays scripted outcomes in order.
///
/// Once the script runs out every call fails with a network error.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script successful responses with the given texts.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(make_text_response(t))).collect())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn temperatures(&self) -> Vec<f32> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.temperature)
            .collect()
    }

    pub fn user_prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter_map(|r| r.messages.last().map(|m| m.content.clone()))
            .collect()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(
        &self,
        _api_key: &str,
        request: ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        content: Some(text.to_string()),
        reasoning: Some("scripted reasoning".into()),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        finish_reason: None,
    }
}

/// A client over `provider` that makes a single transport attempt per call.
pub fn client_with(provider: Arc<ScriptedProvider>, keys: &[&str]) -> Arc<ProviderClient> {
    client_for_model(provider, "mock-model", keys)
}

pub fn client_for_model(
    provider: Arc<ScriptedProvider>,
    model: &str,
    keys: &[&str],
) -> Arc<ProviderClient> {
    Arc::new(
        ProviderClient::with_provider(
            model,
            Backend::OpenAi {
                base_url: "http://mock".into(),
            },
            keys.iter().map(|k| k.to_string()).collect(),
            provider,
        )
        .with_settings(CallSettings {
            timeout: Duration::from_secs(5),
            max_attempts: 1,
            retry_delay: Duration::ZERO,
            max_output_tokens: 4096,
        }),
    )
}
