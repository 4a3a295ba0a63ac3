//! Environment access behind a trait so resolution logic can be tested
//! without touching the process environment.

use std::collections::HashMap;

pub const OPENAI_API_KEY_VARS: &[&str] = &["OPEN_AI_API_KEY", "OPENAI_API_KEY"];
pub const OPENAI_API_BASE: &str = "OPENAI_API_BASE";
pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
pub const AZURE_OPENAI_API_BASE: &str = "AZURE_OPENAI_API_BASE";
pub const AZURE_OPENAI_API_VERSION: &str = "AZURE_OPENAI_API_VERSION";
pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const OPENROUTER_API_BASE: &str = "OPENROUTER_API_BASE";
pub const VLLM_API_KEY: &str = "VLLM_API_KEY";
pub const NUGGETIZER_MODEL: &str = "NUGGETIZER_MODEL";

/// A source of environment-style settings.
pub trait EnvSource: Send + Sync {
    /// Look up a variable. Empty values count as unset.
    fn var(&self, key: &str) -> Option<String>;

    /// The first variable in `keys` that is set.
    fn first_of(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.var(k))
    }
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| !v.trim().is_empty()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_are_unset() {
        let env: HashMap<String, String> = [("OPEN_AI_API_KEY".to_string(), "  ".to_string())].into();
        assert!(env.var("OPEN_AI_API_KEY").is_none());
    }

    #[test]
    fn first_of_respects_order() {
        let env: HashMap<String, String> = [
            ("OPEN_AI_API_KEY".to_string(), "sk-first".to_string()),
            ("OPENAI_API_KEY".to_string(), "sk-second".to_string()),
        ]
        .into();
        assert_eq!(env.first_of(OPENAI_API_KEY_VARS).as_deref(), Some("sk-first"));
    }
}
