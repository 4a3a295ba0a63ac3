//! LLM provider plumbing for Nuggetizer.
//!
//! [`resolve_backend`] picks the vendor endpoint and credentials once, the
//! [`OpenAiCompatProvider`] speaks the chat-completions wire format, and the
//! [`ProviderClient`] wraps both with per-model request rules, timeouts and
//! credential rotation.

pub mod backend;
pub mod client;
pub mod openai_compat;
pub mod tokenizer;

pub use backend::{resolve_backend, Backend, ResolvedBackend};
pub use client::{CallSettings, Generation, ProviderClient};
pub use openai_compat::OpenAiCompatProvider;
pub use tokenizer::TokenCounter;
