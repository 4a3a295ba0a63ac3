//! `ProviderClient`: the single call site every pipeline stage uses to talk
//! to a model.
//!
//! Owns the resolved backend, the credential list and a rotating key index.
//! Each [`ProviderClient::generate`] call makes up to `max_attempts`
//! transport attempts under a per-attempt timeout; after a failed attempt
//! the client moves to the next credential and pauses briefly. Content-filter
//! rejections are never retried.
//!
//! The key index is an atomic so one client can be shared across concurrent
//! batch tasks behind an `Arc`.

use nuggetizer_config::{EnvSource, ProcessEnv, ProviderConfig};
use nuggetizer_core::error::ProviderError;
use nuggetizer_core::message::{merge_system_into_user, Message};
use nuggetizer_core::provider::{Provider, ProviderRequest, Usage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{resolve_backend, Backend, ResolvedBackend};
use crate::openai_compat::OpenAiCompatProvider;
use crate::tokenizer::TokenCounter;

/// Result of one successful generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Generated text; empty when the backend returned a null message
    pub text: String,
    /// Output tokens counted locally with the model's tokenizer
    pub token_count: usize,
    pub usage: Option<Usage>,
    pub reasoning: Option<String>,
    /// Messages as sent, after per-model adaptation
    pub messages: Vec<Message>,
    /// Temperature as sent
    pub temperature: f32,
}

/// Transport-level retry and request settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CallSettings {
    pub timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub max_output_tokens: u32,
}

impl Default for CallSettings {
    fn default() -> Self {
        Self::from(&ProviderConfig::default())
    }
}

impl From<&ProviderConfig> for CallSettings {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            max_output_tokens: config.max_output_tokens,
        }
    }
}

/// O-series reasoning models reject the system role.
pub fn rejects_system_role(model: &str) -> bool {
    let base = model_basename(model);
    ["o1", "o3", "o4"].iter().any(|prefix| base.starts_with(prefix))
}

/// Models that only accept the default temperature.
pub fn requires_unit_temperature(model: &str) -> bool {
    rejects_system_role(model) || model_basename(model).contains("gpt-5")
}

fn model_basename(model: &str) -> String {
    model
        .rsplit('/')
        .next()
        .unwrap_or(model)
        .to_ascii_lowercase()
}

pub struct ProviderClient {
    model: String,
    backend: Backend,
    credentials: Vec<String>,
    current_key_idx: AtomicUsize,
    provider: Arc<dyn Provider>,
    tokens: TokenCounter,
    settings: CallSettings,
}

impl ProviderClient {
    /// Resolve the backend for `model` against the process environment and
    /// build an HTTP-backed client.
    pub fn from_config(model: &str, config: &ProviderConfig) -> nuggetizer_core::Result<Self> {
        Self::from_config_with_env(model, config, &ProcessEnv)
    }

    pub fn from_config_with_env(
        model: &str,
        config: &ProviderConfig,
        env: &dyn EnvSource,
    ) -> nuggetizer_core::Result<Self> {
        let ResolvedBackend {
            backend,
            credentials,
        } = resolve_backend(model, config, env)?;
        let settings = CallSettings::from(config);
        let provider = OpenAiCompatProvider::new(backend.clone(), settings.timeout)?;

        info!(
            model,
            backend = %backend.kind(),
            credentials = credentials.len(),
            "Provider client ready"
        );

        Ok(Self::with_provider(model, backend, credentials, Arc::new(provider))
            .with_settings(settings)
            .with_tokenizer(TokenCounter::for_model(model)))
    }

    /// Build a client around an existing provider. An empty credential list
    /// is replaced by a single empty key.
    pub fn with_provider(
        model: impl Into<String>,
        backend: Backend,
        credentials: Vec<String>,
        provider: Arc<dyn Provider>,
    ) -> Self {
        let credentials = if credentials.is_empty() {
            vec![String::new()]
        } else {
            credentials
        };
        Self {
            model: model.into(),
            backend,
            credentials,
            current_key_idx: AtomicUsize::new(0),
            provider,
            tokens: TokenCounter::disabled(),
            settings: CallSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: CallSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_tokenizer(mut self, tokens: TokenCounter) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn credential_count(&self) -> usize {
        self.credentials.len()
    }

    /// Index of the credential the next attempt will use.
    pub fn current_key_idx(&self) -> usize {
        self.current_key_idx.load(Ordering::Relaxed) % self.credentials.len()
    }

    fn rotate_key(&self) {
        let len = self.credentials.len();
        let _ = self
            .current_key_idx
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |idx| {
                Some((idx + 1) % len)
            });
    }

    /// Apply per-model request rules and return the messages and temperature
    /// actually sent.
    pub fn adapt(&self, messages: &[Message], temperature: f32) -> (Vec<Message>, f32) {
        let messages = if rejects_system_role(&self.model) {
            merge_system_into_user(messages)
        } else {
            messages.to_vec()
        };
        let temperature = if requires_unit_temperature(&self.model) {
            1.0
        } else {
            temperature
        };
        (messages, temperature)
    }

    /// Send `messages` and return the generated text.
    pub async fn generate(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<Generation, ProviderError> {
        let (messages, temperature) = self.adapt(messages, temperature);
        let request = ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature,
            max_tokens: Some(self.settings.max_output_tokens),
        };

        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let key_idx = self.current_key_idx();
            let api_key = &self.credentials[key_idx];

            debug!(
                provider = %self.provider.name(),
                model = %self.model,
                attempt,
                key_idx,
                "Generating"
            );

            let outcome = match tokio::time::timeout(
                self.settings.timeout,
                self.provider.complete(api_key, request.clone()),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "Provider '{}' timed out after {}s",
                    self.provider.name(),
                    self.settings.timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(response) => {
                    let text = response.content.unwrap_or_default();
                    let token_count = self.tokens.count(&text);
                    return Ok(Generation {
                        text,
                        token_count,
                        usage: response.usage,
                        reasoning: response.reasoning,
                        messages: request.messages,
                        temperature: request.temperature,
                    });
                }
                Err(e) if !e.is_retryable() => {
                    warn!(provider = %self.provider.name(), error = %e, "Generation rejected");
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        provider = %self.provider.name(),
                        attempt,
                        max_attempts,
                        key_idx,
                        error = %e,
                        "Generation attempt failed"
                    );
                    last_error = e.to_string();
                    if attempt < max_attempts {
                        self.rotate_key();
                        tokio::time::sleep(self.settings.retry_delay).await;
                    }
                }
            }
        }

        Err(ProviderError::RetriesExhausted {
            attempts: max_attempts,
            last_error,
        })
    }
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("model", &self.model)
            .field("backend", &self.backend)
            .field("credentials", &format!("[{} REDACTED]", self.credentials.len()))
            .field("current_key_idx", &self.current_key_idx())
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nuggetizer_core::message::Role;
    use nuggetizer_core::provider::ProviderResponse;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Replays scripted outcomes and records every call.
    struct ScriptedProvider {
        script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
        keys_used: Mutex<Vec<String>>,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                keys_used: Mutex::new(Vec::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn keys_used(&self) -> Vec<String> {
            self.keys_used.lock().unwrap().clone()
        }

        fn last_request(&self) -> ProviderRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            api_key: &str,
            request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            self.keys_used.lock().unwrap().push(api_key.to_string());
            self.requests.lock().unwrap().push(request);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".into())))
        }
    }

    fn ok(content: Option<&str>) -> Result<ProviderResponse, ProviderError> {
        Ok(ProviderResponse {
            content: content.map(String::from),
            reasoning: None,
            usage: None,
            model: "mock".into(),
            finish_reason: None,
        })
    }

    fn fast() -> CallSettings {
        CallSettings {
            timeout: Duration::from_secs(5),
            max_attempts: 5,
            retry_delay: Duration::from_millis(1),
            max_output_tokens: 4096,
        }
    }

    fn client(model: &str, keys: &[&str], provider: Arc<ScriptedProvider>) -> ProviderClient {
        ProviderClient::with_provider(
            model,
            Backend::OpenAi {
                base_url: "http://mock".into(),
            },
            keys.iter().map(|k| k.to_string()).collect(),
            provider,
        )
        .with_settings(fast())
    }

    fn prompt() -> Vec<Message> {
        vec![Message::system("You are a judge."), Message::user("Label these.")]
    }

    #[tokio::test]
    async fn rotates_to_next_key_after_failure() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::RateLimited {
                retry_after_secs: 1,
            }),
            ok(Some("[\"vital\"]")),
        ]));
        let client = client("gpt-4o", &["key-a", "key-b"], provider.clone());

        let generation = client.generate(&prompt(), 0.0).await.unwrap();

        assert_eq!(generation.text, "[\"vital\"]");
        assert_eq!(provider.keys_used(), vec!["key-a", "key-b"]);
        assert_eq!(client.current_key_idx(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let client = client("gpt-4o", &["k1", "k2"], provider.clone());

        let err = client.generate(&prompt(), 0.0).await.unwrap_err();

        match err {
            ProviderError::RetriesExhausted { attempts, last_error } => {
                assert_eq!(attempts, 5);
                assert!(last_error.contains("script exhausted"));
            }
            other => panic!("Expected RetriesExhausted, got: {other:?}"),
        }
        assert_eq!(provider.keys_used(), vec!["k1", "k2", "k1", "k2", "k1"]);
    }

    #[tokio::test]
    async fn content_filter_is_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::ContentFiltered("blocked".into())),
            ok(Some("never reached")),
        ]));
        let client = client("gpt-4o", &["k1", "k2"], provider.clone());

        let err = client.generate(&prompt(), 0.0).await.unwrap_err();

        assert!(matches!(err, ProviderError::ContentFiltered(_)));
        assert_eq!(provider.keys_used().len(), 1);
        assert_eq!(client.current_key_idx(), 0);
    }

    #[tokio::test]
    async fn null_content_becomes_empty_text() {
        let provider = Arc::new(ScriptedProvider::new(vec![ok(None)]));
        let client = client("gpt-4o", &["k"], provider);

        let generation = client.generate(&prompt(), 0.0).await.unwrap();
        assert_eq!(generation.text, "");
        assert_eq!(generation.token_count, 0);
    }

    #[tokio::test]
    async fn o_series_merges_system_and_forces_temperature() {
        let provider = Arc::new(ScriptedProvider::new(vec![ok(Some("[]"))]));
        let client = client("openai/o3-mini", &["k"], provider.clone());

        let generation = client.generate(&prompt(), 0.2).await.unwrap();

        let sent = provider.last_request();
        assert_eq!(sent.messages.len(), 1);
        assert_eq!(sent.messages[0].role, Role::User);
        assert_eq!(sent.messages[0].content, "You are a judge.\nLabel these.");
        assert_eq!(sent.temperature, 1.0);
        assert_eq!(generation.messages, sent.messages);
        assert_eq!(generation.temperature, 1.0);
    }

    #[tokio::test]
    async fn gpt5_keeps_system_but_forces_temperature() {
        let provider = Arc::new(ScriptedProvider::new(vec![ok(Some("[]"))]));
        let client = client("gpt-5-mini", &["k"], provider.clone());

        let generation = client.generate(&prompt(), 0.0).await.unwrap();

        let sent = provider.last_request();
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.temperature, 1.0);
        assert_eq!(generation.temperature, 1.0);
    }

    #[tokio::test]
    async fn ordinary_models_pass_through() {
        let provider = Arc::new(ScriptedProvider::new(vec![ok(Some("[]"))]));
        let client = client("gpt-4o", &["k"], provider.clone());

        client.generate(&prompt(), 0.2).await.unwrap();

        let sent = provider.last_request();
        assert_eq!(sent.messages.len(), 2);
        assert_eq!(sent.temperature, 0.2);
        assert_eq!(sent.max_tokens, Some(4096));
    }

    #[tokio::test]
    async fn reasoning_and_usage_are_forwarded() {
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(ProviderResponse {
            content: Some("[\"a\"]".into()),
            reasoning: Some("because".into()),
            usage: Some(Usage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 5,
            }),
            model: "mock".into(),
            finish_reason: None,
        })]));
        let client = client("gpt-4o", &["k"], provider);

        let generation = client.generate(&prompt(), 0.0).await.unwrap();
        assert_eq!(generation.reasoning.as_deref(), Some("because"));
        assert_eq!(generation.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn model_family_detection() {
        assert!(rejects_system_role("o1-preview"));
        assert!(rejects_system_role("openrouter/openai/o4-mini"));
        assert!(!rejects_system_role("gpt-4o"));
        assert!(!rejects_system_role("ollama/llama3"));
        assert!(requires_unit_temperature("gpt-5"));
        assert!(!requires_unit_temperature("gpt-4.1"));
    }

    #[test]
    fn from_config_resolves_backend() {
        let env: HashMap<String, String> =
            [("OPENROUTER_API_KEY".to_string(), "or-key".to_string())].into();
        let client =
            ProviderClient::from_config_with_env("openrouter/auto", &ProviderConfig::default(), &env)
                .unwrap();
        assert_eq!(client.backend().kind(), nuggetizer_config::BackendKind::OpenRouter);
        assert_eq!(client.credential_count(), 1);
        assert!(!format!("{client:?}").contains("or-key"));
    }

    #[test]
    fn from_config_without_credentials_is_config_error() {
        let env: HashMap<String, String> = HashMap::new();
        let err = ProviderClient::from_config_with_env("gpt-4o", &ProviderConfig::default(), &env)
            .unwrap_err();
        assert!(err.is_fatal_for_batch());
    }
}
