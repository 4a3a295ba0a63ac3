//! # Nuggetizer Core
//!
//! Domain types, traits, and error definitions for the Nuggetizer pipeline.
//! This crate has **no transport or runtime dependencies**: it defines the
//! domain model the provider, pipeline and CLI crates build against.
//!
//! ## Contents
//!
//! - requests, documents and the nugget entities each stage emits
//! - the closed label sets (importance, assignment) and stage modes
//! - provenance [`Trace`] records
//! - the [`Provider`] trait every generation backend implements
//! - the error taxonomy shared by all crates

pub mod error;
pub mod label;
pub mod message;
pub mod nugget;
pub mod provider;
pub mod trace;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ParseError, PromptError, ProviderError, Result};
pub use label::{Assignment, Importance, NuggetAssignMode, NuggetMode, NuggetScoreMode};
pub use message::{Message, Role};
pub use nugget::{
    Assignable, AssignedNugget, AssignedScoredNugget, Claim, Document, Nugget, Query, Request,
    ScoredNugget,
};
pub use provider::{FinishReason, Provider, ProviderRequest, ProviderResponse, Usage};
pub use trace::{CallParams, Component, Trace};
