//! Scoring: labels each nugget `vital` or `okay` for the query.

use nuggetizer_core::{Claim, Component, Error, Importance, NuggetScoreMode, Query, ScoredNugget};
use std::sync::Arc;
use tracing::{info, warn};

use super::StageOutput;
use crate::parse::parse_labels;
use crate::prompts::{python_list_repr, PromptTemplates, PromptVars, RenderedPrompt, TemplateKey};
use crate::runner::{windows, WindowedStageRunner};

pub const DEFAULT_WINDOW_SIZE: usize = 10;
pub const DEFAULT_MAX_NUGGETS: usize = 30;

/// Label given to every nugget of a window whose retries ran out.
pub const FALLBACK_IMPORTANCE: Importance = Importance::Okay;

pub struct ScoringStage {
    runner: WindowedStageRunner,
    templates: Arc<dyn PromptTemplates>,
    window_size: usize,
    max_nuggets: usize,
    mode: NuggetScoreMode,
}

impl ScoringStage {
    pub fn new(runner: WindowedStageRunner, templates: Arc<dyn PromptTemplates>) -> Self {
        Self {
            runner,
            templates,
            window_size: DEFAULT_WINDOW_SIZE,
            max_nuggets: DEFAULT_MAX_NUGGETS,
            mode: NuggetScoreMode::default(),
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

    pub fn with_mode(mut self, mode: NuggetScoreMode) -> Self {
        self.mode = mode;
        self
    }

    /// Score `nuggets`, keeping at most `max_nuggets` of them (earliest first).
    pub async fn run<N: Claim>(
        &self,
        query: &Query,
        nuggets: &[N],
    ) -> Result<StageOutput<ScoredNugget>, Error> {
        if nuggets.len() > self.max_nuggets {
            warn!(
                stage = %Component::Scorer,
                qid = %query.qid,
                nuggets = nuggets.len(),
                max_nuggets = self.max_nuggets,
                "Truncating nuggets to scorer cap"
            );
        }
        let texts: Vec<&str> = nuggets
            .iter()
            .take(self.max_nuggets)
            .map(|n| n.text())
            .collect();

        info!(
            stage = %Component::Scorer,
            qid = %query.qid,
            nuggets = texts.len(),
            window_size = self.window_size,
            "Scoring nuggets"
        );

        let key = TemplateKey::Scorer(self.mode);
        let mut items = Vec::with_capacity(texts.len());
        let mut reports = Vec::new();

        for window in windows(texts.len(), self.window_size) {
            let batch = &texts[window.clone()];

            let build = || {
                let vars = PromptVars::new()
                    .set("query", &query.text)
                    .set("nuggets", python_list_repr(batch))
                    .set("num_nuggets", batch.len());
                self.templates
                    .render(key, &vars)
                    .map(RenderedPrompt::into_messages)
            };
            let parse = |raw: &str| parse_labels(raw, batch.len(), Importance::GENERATED);

            let outcome = self
                .runner
                .run_window(Component::Scorer, window, build, parse)
                .await?;

            match outcome.accepted {
                Some(accepted) => {
                    items.extend(batch.iter().zip(accepted.value).map(|(text, importance)| {
                        ScoredNugget {
                            text: text.to_string(),
                            importance,
                            reasoning: accepted.reasoning.clone(),
                            trace: accepted.trace.clone(),
                        }
                    }));
                }
                None => {
                    items.extend(batch.iter().map(|text| ScoredNugget {
                        trace: outcome.fallback_trace.clone(),
                        ..ScoredNugget::new(*text, FALLBACK_IMPORTANCE)
                    }));
                }
            }
            reports.push(outcome.report);
        }

        Ok(StageOutput { items, reports })
    }
}
