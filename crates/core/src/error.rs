//! Error types for the Nuggetizer domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! is what crosses crate boundaries.

use thiserror::Error;

/// The top-level error type for all Nuggetizer operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Prompt errors ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a configuration error from any displayable cause.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether a batch driver should stop instead of skipping the record.
    ///
    /// Configuration problems affect every record; everything else is
    /// scoped to the record that produced it.
    pub fn is_fatal_for_batch(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    /// The provider's safety filter blocked the request or the response.
    #[error("Request blocked by content filter: {0}")]
    ContentFiltered(String),

    #[error("Reached max of {attempts} attempts, last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ProviderError {
    /// Whether the failure may succeed on a later attempt (possibly with
    /// another credential).
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::ContentFiltered(_) | Self::NotConfigured(_) | Self::RetriesExhausted { .. }
        )
    }
}

/// Failure to read a generated response as the expected list shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response is not a list literal: {0}")]
    NotAList(String),

    #[error("unterminated string literal starting at byte {0}")]
    UnterminatedString(usize),

    #[error("invalid escape sequence at byte {0}")]
    InvalidEscape(usize),

    #[error("unexpected token at byte {position}: {found}")]
    UnexpectedToken { position: usize, found: String },

    #[error("expected {expected} labels, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("unknown label '{label}' (allowed: {allowed})")]
    UnknownLabel { label: String, allowed: String },
}

#[derive(Debug, Clone, Error)]
pub enum PromptError {
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Invalid template {name}: {reason}")]
    InvalidTemplate { name: String, reason: String },

    #[error("Unknown placeholder '{{{placeholder}}}' in template {template}")]
    UnknownPlaceholder { template: String, placeholder: String },
}
