//! The three pipeline stages, each a thin layer over
//! [`WindowedStageRunner`](crate::runner::WindowedStageRunner) that supplies
//! a prompt builder and a response mapper.

pub mod assignment;
pub mod extraction;
pub mod scoring;

pub use assignment::AssignmentStage;
pub use extraction::{Extraction, ExtractionStage};
pub use scoring::ScoringStage;

use crate::runner::WindowReport;

/// Entities a stage emitted, in input order, with the per-window log.
#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub items: Vec<T>,
    pub reports: Vec<WindowReport>,
}

impl<T> StageOutput<T> {
    pub fn fallback_windows(&self) -> usize {
        self.reports.iter().filter(|r| r.is_fallback()).count()
    }
}
