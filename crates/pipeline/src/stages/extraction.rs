//! Extraction: turns a query and its documents into a capped,
//! importance-ordered list of nuggets.
//!
//! Documents are visited window by window. Each prompt carries the current
//! list, and the model answers with the complete updated list, which replaces
//! the current one (truncated to the cap). A window that falls back leaves the
//! list unchanged.

use nuggetizer_core::{Component, Error, NuggetMode, Nugget, Request};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::parse::parse_string_list;
use crate::prompts::{python_list_repr, PromptTemplates, PromptVars, RenderedPrompt, TemplateKey};
use crate::runner::{windows, WindowReport, WindowedStageRunner};

pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_MAX_NUGGETS: usize = 30;

/// Result of extraction.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub nuggets: Vec<Nugget>,
    /// The running list after every window
    pub trajectory: Vec<Vec<String>>,
    #[serde(skip)]
    pub reports: Vec<WindowReport>,
}

pub struct ExtractionStage {
    runner: WindowedStageRunner,
    templates: Arc<dyn PromptTemplates>,
    window_size: usize,
    max_nuggets: usize,
    mode: NuggetMode,
}

impl ExtractionStage {
    pub fn new(runner: WindowedStageRunner, templates: Arc<dyn PromptTemplates>) -> Self {
        Self {
            runner,
            templates,
            window_size: DEFAULT_WINDOW_SIZE,
            max_nuggets: DEFAULT_MAX_NUGGETS,
            mode: NuggetMode::default(),
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn with_max_nuggets(mut self, max_nuggets: usize) -> Self {
        self.max_nuggets = max_nuggets;
        self
    }

    pub fn with_mode(mut self, mode: NuggetMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn max_nuggets(&self) -> usize {
        self.max_nuggets
    }

    pub async fn run(&self, request: &Request) -> Result<Extraction, Error> {
        let documents = &request.documents;
        info!(
            stage = %Component::Creator,
            qid = %request.query.qid,
            documents = documents.len(),
            window_size = self.window_size,
            "Extracting nuggets"
        );

        let key = TemplateKey::Creator(self.mode);
        let mut current: Vec<Nugget> = Vec::new();
        let mut trajectory = Vec::new();
        let mut reports = Vec::new();

        for window in windows(documents.len(), self.window_size) {
            let context = documents[window.clone()]
                .iter()
                .enumerate()
                .map(|(i, doc)| format!("[{}] {}", i + 1, doc.segment))
                .collect::<Vec<_>>()
                .join("\n");

            let build = || {
                let texts: Vec<&str> = current.iter().map(|n| n.text.as_str()).collect();
                let vars = PromptVars::new()
                    .set("query", &request.query.text)
                    .set("context", &context)
                    .set("nuggets", python_list_repr(&texts))
                    .set("nuggets_length", texts.len())
                    .set("creator_max_nuggets", self.max_nuggets);
                self.templates
                    .render(key, &vars)
                    .map(RenderedPrompt::into_messages)
            };

            let outcome = self
                .runner
                .run_window(Component::Creator, window, build, parse_string_list)
                .await?;

            if let Some(accepted) = outcome.accepted {
                current = accepted
                    .value
                    .into_iter()
                    .take(self.max_nuggets)
                    .map(|text| Nugget {
                        text,
                        reasoning: accepted.reasoning.clone(),
                        trace: accepted.trace.clone(),
                    })
                    .collect();
            }

            trajectory.push(current.iter().map(|n| n.text.clone()).collect());
            reports.push(outcome.report);
        }

        info!(
            stage = %Component::Creator,
            qid = %request.query.qid,
            nuggets = current.len(),
            "Extraction finished"
        );

        Ok(Extraction {
            nuggets: current,
            trajectory,
            reports,
        })
    }
}
