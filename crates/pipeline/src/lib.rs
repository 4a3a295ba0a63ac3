//! # Nuggetizer Pipeline
//!
//! The three windowed stages (extraction, scoring, assignment), the shared
//! generate-parse-retry runner they are built on, prompt templates, and the
//! metric formulas applied to the final labels.
//!
//! Most callers only need [`Nuggetizer`]:
//!
//! ```no_run
//! # async fn demo() -> Result<(), nuggetizer_core::Error> {
//! use nuggetizer_config::NuggetizerConfig;
//! use nuggetizer_core::{Document, Query, Request};
//! use nuggetizer_pipeline::Nuggetizer;
//!
//! let nuggetizer = Nuggetizer::from_config(&NuggetizerConfig::default())?;
//! let request = Request::new(
//!     Query::new("q1", "benefits of open source"),
//!     vec![Document::new("d1", "Open source software can be audited by anyone.")],
//! );
//! let scored = nuggetizer.create(&request).await?;
//! let assigned = nuggetizer
//!     .assign(&request.query, &request.documents[0].segment, &scored)
//!     .await?;
//! # let _ = assigned;
//! # Ok(())
//! # }
//! ```

pub mod metrics;
pub mod nuggetizer;
pub mod parse;
pub mod prompts;
pub mod runner;
pub mod stages;
pub mod trace;

#[cfg(test)]
mod test_helpers;

pub use metrics::{calculate_global_metrics, calculate_nugget_scores, NuggetMetrics};
pub use nuggetizer::{Nuggetizer, NuggetizerBuilder};
pub use prompts::{BuiltinTemplates, PromptTemplates, PromptVars, RenderedPrompt, TemplateKey, YamlTemplates};
pub use runner::{RetryPolicy, WindowDisposition, WindowReport, WindowedStageRunner};
pub use stages::{AssignmentStage, Extraction, ExtractionStage, ScoringStage, StageOutput};
pub use trace::TraceRecorder;
