//! Assignment: labels how well one passage supports each nugget.

use nuggetizer_core::{Assignable, Assignment, Component, Error, NuggetAssignMode, Query};
use std::sync::Arc;
use tracing::info;

use super::StageOutput;
use crate::parse::parse_labels;
use crate::prompts::{python_list_repr, PromptTemplates, PromptVars, RenderedPrompt, TemplateKey};
use crate::runner::{windows, WindowedStageRunner};

pub const DEFAULT_WINDOW_SIZE: usize = 10;

pub struct AssignmentStage {
    runner: WindowedStageRunner,
    templates: Arc<dyn PromptTemplates>,
    window_size: usize,
    mode: NuggetAssignMode,
}

impl AssignmentStage {
    pub fn new(runner: WindowedStageRunner, templates: Arc<dyn PromptTemplates>) -> Self {
        Self {
            runner,
            templates,
            window_size: DEFAULT_WINDOW_SIZE,
            mode: NuggetAssignMode::default(),
        }
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size.max(1);
        self
    }

    pub fn with_mode(mut self, mode: NuggetAssignMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> NuggetAssignMode {
        self.mode
    }

    /// Label every nugget against `passage`.
    ///
    /// A blank passage supports nothing: every nugget is `not_support` and
    /// no generation call is made. A window whose retries ran out is labeled
    /// `not_support` if the backend answered at least once, `failed` if it
    /// never did.
    pub async fn run<N: Assignable>(
        &self,
        query: &Query,
        passage: &str,
        nuggets: &[N],
    ) -> Result<StageOutput<N::Assigned>, Error> {
        if passage.trim().is_empty() {
            info!(
                stage = %Component::Assigner,
                qid = %query.qid,
                nuggets = nuggets.len(),
                "Empty passage, labeling every nugget not_support"
            );
            return Ok(StageOutput {
                items: nuggets
                    .iter()
                    .map(|n| n.assign(Assignment::NotSupport, None, None))
                    .collect(),
                reports: Vec::new(),
            });
        }

        info!(
            stage = %Component::Assigner,
            qid = %query.qid,
            nuggets = nuggets.len(),
            window_size = self.window_size,
            mode = ?self.mode,
            "Assigning nuggets"
        );

        let key = TemplateKey::Assigner(self.mode);
        let allowed = self.mode.labels();
        let mut items = Vec::with_capacity(nuggets.len());
        let mut reports = Vec::new();

        for window in windows(nuggets.len(), self.window_size) {
            let batch = &nuggets[window.clone()];

            let build = || {
                let texts: Vec<&str> = batch.iter().map(|n| n.text()).collect();
                let vars = PromptVars::new()
                    .set("query", &query.text)
                    .set("context", passage)
                    .set("nuggets", python_list_repr(&texts))
                    .set("num_nuggets", batch.len());
                self.templates
                    .render(key, &vars)
                    .map(RenderedPrompt::into_messages)
            };
            let parse = |raw: &str| parse_labels(raw, batch.len(), allowed);

            let outcome = self
                .runner
                .run_window(Component::Assigner, window, build, parse)
                .await?;

            match outcome.accepted {
                Some(accepted) => {
                    items.extend(batch.iter().zip(accepted.value).map(|(nugget, label)| {
                        nugget.assign(label, accepted.reasoning.clone(), accepted.trace.clone())
                    }));
                }
                None => {
                    let label = if outcome.report.responded() {
                        Assignment::NotSupport
                    } else {
                        Assignment::Failed
                    };
                    items.extend(batch.iter().map(|nugget| {
                        nugget.assign(label, None, outcome.fallback_trace.clone())
                    }));
                }
            }
            reports.push(outcome.report);
        }

        Ok(StageOutput { items, reports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::BuiltinTemplates;
    use crate::runner::RetryPolicy;
    use crate::test_helpers::{client_with, ScriptedProvider};
    use crate::trace::TraceRecorder;
    use nuggetizer_core::{Importance, Nugget, ProviderError, ScoredNugget};

    fn stage(provider: Arc<ScriptedProvider>, budget: u32) -> AssignmentStage {
        let runner = WindowedStageRunner::new(
            client_with(provider, &["k"]),
            RetryPolicy {
                budget,
                initial_temperature: 0.0,
                retry_temperature: 0.2,
            },
            TraceRecorder::default(),
        );
        AssignmentStage::new(runner, Arc::new(BuiltinTemplates))
    }

    fn scored() -> Vec<ScoredNugget> {
        vec![
            ScoredNugget::new("claim a", Importance::Vital),
            ScoredNugget::new("claim b", Importance::Okay),
        ]
    }

    fn query() -> Query {
        Query::new("q1", "benefits of X")
    }

    #[tokio::test]
    async fn empty_passage_short_circuits() {
        let provider = Arc::new(ScriptedProvider::texts(&[]));
        let output = stage(provider.clone(), 500)
            .run(&query(), "   \n", &scored())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 0);
        assert!(output
            .items
            .iter()
            .all(|n| n.assignment == Assignment::NotSupport));
        assert_eq!(output.items[0].importance, Importance::Vital);
    }

    #[tokio::test]
    async fn labels_keep_importance_and_order() {
        let provider = Arc::new(ScriptedProvider::texts(&["['partial_support', 'support']"]));
        let output = stage(provider.clone(), 500)
            .run(&query(), "X improves Y.", &scored())
            .await
            .unwrap();

        assert_eq!(output.items[0].text, "claim a");
        assert_eq!(output.items[0].assignment, Assignment::PartialSupport);
        assert_eq!(output.items[0].importance, Importance::Vital);
        assert_eq!(output.items[1].assignment, Assignment::Support);
        assert!(provider.user_prompts()[0].contains("Passage: X improves Y."));
    }

    #[tokio::test]
    async fn two_grade_mode_rejects_partial_support() {
        let provider = Arc::new(ScriptedProvider::texts(&["['partial_support']", "['support']"]));
        let stage = stage(provider.clone(), 500).with_mode(NuggetAssignMode::SupportGrade2);

        let output = stage
            .run(&query(), "passage", &[Nugget::new("only claim")])
            .await
            .unwrap();

        assert_eq!(provider.calls(), 2);
        assert_eq!(output.items[0].assignment, Assignment::Support);
    }

    #[tokio::test]
    async fn fallback_after_responses_is_not_support() {
        let provider = Arc::new(ScriptedProvider::texts(&["nope", "nope"]));
        let output = stage(provider, 2)
            .run(&query(), "passage", &scored())
            .await
            .unwrap();
        assert!(output
            .items
            .iter()
            .all(|n| n.assignment == Assignment::NotSupport));
        assert!(output
            .items
            .iter()
            .all(|n| n.trace.as_ref().and_then(|t| t.raw_output.as_deref()) == Some("nope")));
    }

    #[tokio::test]
    async fn fallback_without_any_response_is_failed() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Err(ProviderError::Network("down".into())),
            Err(ProviderError::Timeout("slow".into())),
        ]));
        let output = stage(provider, 2)
            .run(&query(), "passage", &scored())
            .await
            .unwrap();
        assert!(output.items.iter().all(|n| n.assignment == Assignment::Failed));
        assert!(!output.reports[0].responded());

        let trace = output.items[0].trace.as_ref().unwrap();
        assert!(trace.raw_output.is_none());
        assert!(trace.usage.is_none());
        assert_eq!(trace.params.temperature, 0.2);
    }
}
