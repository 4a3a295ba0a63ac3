//! Backend resolution: decides once, at construction, which vendor to talk
//! to and with which endpoint, API version and credentials.
//!
//! Selection order (first match wins):
//!
//! 1. an explicit `backend` in the provider config
//! 2. an `openrouter/` model prefix
//! 3. `use_azure`, when no explicit keys were given or the model looks like a GPT model
//! 4. `use_vllm` (local server)
//! 5. `use_openrouter`
//! 6. explicit `api_keys` with no other selector → OpenAI
//! 7. OpenAI key from the environment, then OpenRouter key, else an error
//!
//! Each connection setting is taken from the config first, then from the
//! backend's environment variable; a required setting missing from both is a
//! [`ConfigError::MissingSetting`] naming the variable.

use nuggetizer_config::env::{self as vars, EnvSource};
use nuggetizer_config::{BackendKind, ConfigError, ProviderConfig};
use tracing::debug;

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
const VLLM_PLACEHOLDER_KEY: &str = "EMPTY";

/// A fully resolved backend endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    OpenAi { base_url: String },
    Azure { endpoint: String, api_version: String },
    OpenRouter { base_url: String },
    Vllm { base_url: String },
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::OpenAi { .. } => BackendKind::OpenAi,
            Self::Azure { .. } => BackendKind::Azure,
            Self::OpenRouter { .. } => BackendKind::OpenRouter,
            Self::Vllm { .. } => BackendKind::Vllm,
        }
    }

    /// Base endpoint without a trailing slash.
    pub fn base_url(&self) -> &str {
        match self {
            Self::OpenAi { base_url } | Self::OpenRouter { base_url } | Self::Vllm { base_url } => {
                base_url
            }
            Self::Azure { endpoint, .. } => endpoint,
        }
    }

    /// Local servers take `max_tokens`; hosted APIs take `max_completion_tokens`.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Vllm { .. })
    }
}

/// A backend plus the credentials to rotate through. Never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedBackend {
    pub backend: Backend,
    pub credentials: Vec<String>,
}

impl std::fmt::Debug for ResolvedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedBackend")
            .field("backend", &self.backend)
            .field("credentials", &format!("[{} REDACTED]", self.credentials.len()))
            .finish()
    }
}

/// Resolve the backend for `model` from caller settings and the environment.
pub fn resolve_backend(
    model: &str,
    config: &ProviderConfig,
    env: &dyn EnvSource,
) -> Result<ResolvedBackend, ConfigError> {
    let kind = select_kind(model, config, env)?;
    let resolved = build(kind, config, env)?;
    debug!(
        backend = %kind,
        base_url = %resolved.backend.base_url(),
        credentials = resolved.credentials.len(),
        "Resolved provider backend"
    );
    Ok(resolved)
}

fn select_kind(
    model: &str,
    config: &ProviderConfig,
    env: &dyn EnvSource,
) -> Result<BackendKind, ConfigError> {
    if let Some(kind) = config.backend {
        return Ok(kind);
    }
    if model.starts_with("openrouter/") {
        return Ok(BackendKind::OpenRouter);
    }
    if config.use_azure
        && (config.api_keys.is_empty() || model.to_ascii_lowercase().contains("gpt"))
    {
        return Ok(BackendKind::Azure);
    }
    if config.use_vllm {
        return Ok(BackendKind::Vllm);
    }
    if config.use_openrouter {
        return Ok(BackendKind::OpenRouter);
    }
    if !config.api_keys.is_empty() {
        return Ok(BackendKind::OpenAi);
    }

    // Default chain: hosted OpenAI first, OpenRouter second.
    if env.first_of(vars::OPENAI_API_KEY_VARS).is_some() {
        return Ok(BackendKind::OpenAi);
    }
    if config.openrouter_api_key.is_some() || env.var(vars::OPENROUTER_API_KEY).is_some() {
        return Ok(BackendKind::OpenRouter);
    }
    Err(ConfigError::NoCredentials)
}

fn build(
    kind: BackendKind,
    config: &ProviderConfig,
    env: &dyn EnvSource,
) -> Result<ResolvedBackend, ConfigError> {
    let missing = |setting: &str| ConfigError::MissingSetting {
        backend: kind,
        setting: setting.to_string(),
    };
    let explicit_keys = (!config.api_keys.is_empty()).then(|| config.api_keys.clone());

    let (backend, credentials) = match kind {
        BackendKind::OpenAi => {
            let credentials = explicit_keys
                .or_else(|| env.first_of(vars::OPENAI_API_KEY_VARS).map(|k| vec![k]))
                .ok_or_else(|| missing(vars::OPENAI_API_KEY_VARS[0]))?;
            let base_url = config
                .api_base
                .clone()
                .or_else(|| env.var(vars::OPENAI_API_BASE))
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            (Backend::OpenAi { base_url }, credentials)
        }
        BackendKind::Azure => {
            let endpoint = config
                .api_base
                .clone()
                .or_else(|| env.var(vars::AZURE_OPENAI_API_BASE))
                .ok_or_else(|| missing(vars::AZURE_OPENAI_API_BASE))?;
            let api_version = config
                .api_version
                .clone()
                .or_else(|| env.var(vars::AZURE_OPENAI_API_VERSION))
                .ok_or_else(|| missing(vars::AZURE_OPENAI_API_VERSION))?;
            let credentials = explicit_keys
                .or_else(|| env.var(vars::AZURE_OPENAI_API_KEY).map(|k| vec![k]))
                .or_else(|| env.first_of(vars::OPENAI_API_KEY_VARS).map(|k| vec![k]))
                .ok_or_else(|| missing(vars::AZURE_OPENAI_API_KEY))?;
            (
                Backend::Azure {
                    endpoint,
                    api_version,
                },
                credentials,
            )
        }
        BackendKind::OpenRouter => {
            let credentials = explicit_keys
                .or_else(|| config.openrouter_api_key.clone().map(|k| vec![k]))
                .or_else(|| env.var(vars::OPENROUTER_API_KEY).map(|k| vec![k]))
                .ok_or_else(|| missing(vars::OPENROUTER_API_KEY))?;
            let base_url = config
                .api_base
                .clone()
                .or_else(|| env.var(vars::OPENROUTER_API_BASE))
                .unwrap_or_else(|| OPENROUTER_BASE_URL.to_string());
            (Backend::OpenRouter { base_url }, credentials)
        }
        BackendKind::Vllm => {
            let credentials = explicit_keys
                .or_else(|| env.var(vars::VLLM_API_KEY).map(|k| vec![k]))
                .unwrap_or_else(|| vec![VLLM_PLACEHOLDER_KEY.to_string()]);
            let base_url = config
                .api_base
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}/v1", config.vllm_port));
            (Backend::Vllm { base_url }, credentials)
        }
    };

    Ok(ResolvedBackend {
        backend: normalize(backend),
        credentials,
    })
}

fn normalize(backend: Backend) -> Backend {
    let trim = |s: String| s.trim_end_matches('/').to_string();
    match backend {
        Backend::OpenAi { base_url } => Backend::OpenAi {
            base_url: trim(base_url),
        },
        Backend::Azure {
            endpoint,
            api_version,
        } => Backend::Azure {
            endpoint: trim(endpoint),
            api_version,
        },
        Backend::OpenRouter { base_url } => Backend::OpenRouter {
            base_url: trim(base_url),
        },
        Backend::Vllm { base_url } => Backend::Vllm {
            base_url: trim(base_url),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn explicit_backend_wins() {
        let config = ProviderConfig {
            backend: Some(BackendKind::OpenRouter),
            api_keys: vec!["or-key".into()],
            ..ProviderConfig::default()
        };
        let resolved = resolve_backend("gpt-4o", &config, &env(&[("OPENAI_API_KEY", "sk")])).unwrap();
        assert_eq!(resolved.backend.kind(), BackendKind::OpenRouter);
        assert_eq!(resolved.credentials, vec!["or-key".to_string()]);
    }

    #[test]
    fn openrouter_model_prefix() {
        let resolved = resolve_backend(
            "openrouter/some-model",
            &ProviderConfig::default(),
            &env(&[("OPENROUTER_API_KEY", "or-env")]),
        )
        .unwrap();
        assert_eq!(
            resolved.backend,
            Backend::OpenRouter {
                base_url: OPENROUTER_BASE_URL.into()
            }
        );
        assert_eq!(resolved.credentials, vec!["or-env".to_string()]);
    }

    #[test]
    fn openrouter_prefix_with_custom_base() {
        let config = ProviderConfig {
            api_base: Some("https://custom.openrouter.ai/api/".into()),
            ..ProviderConfig::default()
        };
        let resolved = resolve_backend(
            "openrouter/some-model",
            &config,
            &env(&[("OPENROUTER_API_KEY", "k")]),
        )
        .unwrap();
        assert_eq!(resolved.backend.base_url(), "https://custom.openrouter.ai/api");
    }

    #[test]
    fn openrouter_prefix_without_key_names_the_variable() {
        let err = resolve_backend("openrouter/x", &ProviderConfig::default(), &env(&[])).unwrap_err();
        match err {
            ConfigError::MissingSetting { backend, setting } => {
                assert_eq!(backend, BackendKind::OpenRouter);
                assert_eq!(setting, "OPENROUTER_API_KEY");
            }
            other => panic!("Expected MissingSetting, got: {other:?}"),
        }
    }

    #[test]
    fn azure_flag_reads_environment() {
        let config = ProviderConfig {
            use_azure: true,
            ..ProviderConfig::default()
        };
        let resolved = resolve_backend(
            "gpt-4o",
            &config,
            &env(&[
                ("AZURE_OPENAI_API_BASE", "https://example.openai.azure.com/"),
                ("AZURE_OPENAI_API_VERSION", "2024-06-01"),
                ("AZURE_OPENAI_API_KEY", "az-key"),
            ]),
        )
        .unwrap();
        assert_eq!(
            resolved.backend,
            Backend::Azure {
                endpoint: "https://example.openai.azure.com".into(),
                api_version: "2024-06-01".into(),
            }
        );
        assert_eq!(resolved.credentials, vec!["az-key".to_string()]);
    }

    #[test]
    fn azure_missing_version_is_named() {
        let config = ProviderConfig {
            use_azure: true,
            ..ProviderConfig::default()
        };
        let err = resolve_backend(
            "gpt-4o",
            &config,
            &env(&[
                ("AZURE_OPENAI_API_BASE", "https://example.openai.azure.com"),
                ("AZURE_OPENAI_API_KEY", "az-key"),
            ]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("AZURE_OPENAI_API_VERSION"));
    }

    #[test]
    fn azure_flag_with_keys_and_non_gpt_model_falls_through() {
        let config = ProviderConfig {
            use_azure: true,
            api_keys: vec!["sk-explicit".into()],
            ..ProviderConfig::default()
        };
        let resolved = resolve_backend("llama-3-70b", &config, &env(&[])).unwrap();
        assert_eq!(resolved.backend.kind(), BackendKind::OpenAi);
    }

    #[test]
    fn vllm_uses_local_port_and_placeholder_key() {
        let config = ProviderConfig {
            use_vllm: true,
            vllm_port: 8123,
            ..ProviderConfig::default()
        };
        let resolved = resolve_backend("Qwen/Qwen2.5-7B-Instruct", &config, &env(&[])).unwrap();
        assert_eq!(resolved.backend.base_url(), "http://localhost:8123/v1");
        assert!(resolved.backend.is_local());
        assert_eq!(resolved.credentials, vec!["EMPTY".to_string()]);
    }

    #[test]
    fn default_chain_prefers_openai() {
        let resolved = resolve_backend(
            "gpt-4o",
            &ProviderConfig::default(),
            &env(&[("OPEN_AI_API_KEY", "sk-oa"), ("OPENROUTER_API_KEY", "or")]),
        )
        .unwrap();
        assert_eq!(resolved.backend.kind(), BackendKind::OpenAi);
        assert_eq!(resolved.credentials, vec!["sk-oa".to_string()]);
    }

    #[test]
    fn default_chain_falls_back_to_openrouter() {
        let resolved = resolve_backend(
            "gpt-4o",
            &ProviderConfig::default(),
            &env(&[("OPENROUTER_API_KEY", "or")]),
        )
        .unwrap();
        assert_eq!(resolved.backend.kind(), BackendKind::OpenRouter);
    }

    #[test]
    fn no_credentials_anywhere() {
        let err = resolve_backend("gpt-4o", &ProviderConfig::default(), &env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials));
    }

    #[test]
    fn explicit_keys_default_to_openai_with_env_base() {
        let config = ProviderConfig {
            api_keys: vec!["k1".into(), "k2".into()],
            ..ProviderConfig::default()
        };
        let resolved = resolve_backend(
            "gpt-4o",
            &config,
            &env(&[("OPENAI_API_BASE", "https://proxy.internal/v1")]),
        )
        .unwrap();
        assert_eq!(resolved.backend.base_url(), "https://proxy.internal/v1");
        assert_eq!(resolved.credentials.len(), 2);
    }

    #[test]
    fn debug_hides_credentials() {
        let resolved = ResolvedBackend {
            backend: Backend::OpenAi {
                base_url: OPENAI_BASE_URL.into(),
            },
            credentials: vec!["sk-secret".into()],
        };
        assert!(!format!("{resolved:?}").contains("sk-secret"));
    }
}
