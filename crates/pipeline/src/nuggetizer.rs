//! The `Nuggetizer` facade: one object wiring the three stages to their
//! provider clients, templates and retry policy.

use futures::future::join_all;
use nuggetizer_config::NuggetizerConfig;
use nuggetizer_core::{
    AssignedNugget, AssignedScoredNugget, Claim, Error, Nugget, Query, Request, ScoredNugget,
};
use nuggetizer_providers::ProviderClient;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::prompts::{BuiltinTemplates, PromptTemplates, YamlTemplates};
use crate::runner::{RetryPolicy, WindowedStageRunner};
use crate::stages::{AssignmentStage, Extraction, ExtractionStage, ScoringStage};
use crate::trace::TraceRecorder;

pub struct Nuggetizer {
    extraction: ExtractionStage,
    scoring: ScoringStage,
    assignment: AssignmentStage,
}

impl Nuggetizer {
    /// Build from configuration, resolving one provider client per distinct
    /// stage model from the process environment.
    pub fn from_config(config: &NuggetizerConfig) -> Result<Self, Error> {
        NuggetizerBuilder::new(config.clone()).build()
    }

    pub fn builder(config: NuggetizerConfig) -> NuggetizerBuilder {
        NuggetizerBuilder::new(config)
    }

    /// Extract a capped, ordered nugget list plus the per-window trajectory.
    pub async fn extract(&self, request: &Request) -> Result<Extraction, Error> {
        self.extraction.run(request).await
    }

    /// Score nuggets; input beyond the scorer cap is dropped.
    pub async fn score<N: Claim>(
        &self,
        query: &Query,
        nuggets: &[N],
    ) -> Result<Vec<ScoredNugget>, Error> {
        Ok(self.scoring.run(query, nuggets).await?.items)
    }

    /// Extract then score.
    pub async fn create(&self, request: &Request) -> Result<Vec<ScoredNugget>, Error> {
        let extraction = self.extract(request).await?;
        self.score(&request.query, &extraction.nuggets).await
    }

    pub async fn assign(
        &self,
        query: &Query,
        passage: &str,
        scored: &[ScoredNugget],
    ) -> Result<Vec<AssignedScoredNugget>, Error> {
        Ok(self.assignment.run(query, passage, scored).await?.items)
    }

    pub async fn assign_unscored(
        &self,
        query: &Query,
        passage: &str,
        nuggets: &[Nugget],
    ) -> Result<Vec<AssignedNugget>, Error> {
        Ok(self.assignment.run(query, passage, nuggets).await?.items)
    }

    /// Run [`create`](Self::create) for each request in turn.
    pub async fn create_batch(&self, requests: &[Request]) -> Result<Vec<Vec<ScoredNugget>>, Error> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.create(request).await?);
        }
        Ok(results)
    }

    /// Assign the same scored list against many passages concurrently.
    /// Results are in passage order. Passages share one client, so a
    /// transport failure in one rotates the credential for all of them and
    /// rotation order across passages is unspecified.
    pub async fn assign_batch<P: AsRef<str>>(
        &self,
        query: &Query,
        passages: &[P],
        scored: &[ScoredNugget],
    ) -> Result<Vec<Vec<AssignedScoredNugget>>, Error> {
        info!(qid = %query.qid, passages = passages.len(), "Assigning batch");
        join_all(
            passages
                .iter()
                .map(|passage| self.assign(query, passage.as_ref(), scored)),
        )
        .await
        .into_iter()
        .collect()
    }
}

/// Builder for [`Nuggetizer`], allowing templates and clients to be swapped.
pub struct NuggetizerBuilder {
    config: NuggetizerConfig,
    templates: Option<Arc<dyn PromptTemplates>>,
    creator_client: Option<Arc<ProviderClient>>,
    scorer_client: Option<Arc<ProviderClient>>,
    assigner_client: Option<Arc<ProviderClient>>,
}

impl NuggetizerBuilder {
    pub fn new(config: NuggetizerConfig) -> Self {
        Self {
            config,
            templates: None,
            creator_client: None,
            scorer_client: None,
            assigner_client: None,
        }
    }

    pub fn templates(mut self, templates: Arc<dyn PromptTemplates>) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Use one client for every stage.
    pub fn client(self, client: Arc<ProviderClient>) -> Self {
        self.creator_client(client.clone())
            .scorer_client(client.clone())
            .assigner_client(client)
    }

    pub fn creator_client(mut self, client: Arc<ProviderClient>) -> Self {
        self.creator_client = Some(client);
        self
    }

    pub fn scorer_client(mut self, client: Arc<ProviderClient>) -> Self {
        self.scorer_client = Some(client);
        self
    }

    pub fn assigner_client(mut self, client: Arc<ProviderClient>) -> Self {
        self.assigner_client = Some(client);
        self
    }

    pub fn build(self) -> Result<Nuggetizer, Error> {
        let config = &self.config;
        let templates: Arc<dyn PromptTemplates> = match (&self.templates, &config.templates_dir) {
            (Some(templates), _) => templates.clone(),
            (None, Some(dir)) => Arc::new(YamlTemplates::new(dir)),
            (None, None) => Arc::new(BuiltinTemplates),
        };

        let mut clients: HashMap<String, Arc<ProviderClient>> = HashMap::new();
        let mut client_for = |explicit: Option<Arc<ProviderClient>>, model: &str| -> Result<Arc<ProviderClient>, Error> {
            if let Some(client) = explicit {
                return Ok(client);
            }
            if let Some(client) = clients.get(model) {
                return Ok(client.clone());
            }
            let client = Arc::new(ProviderClient::from_config(model, &config.provider)?);
            clients.insert(model.to_string(), client.clone());
            Ok(client)
        };

        let creator = client_for(self.creator_client.clone(), config.creator_model())?;
        let scorer = client_for(self.scorer_client.clone(), config.scorer_model())?;
        let assigner = client_for(self.assigner_client.clone(), config.assigner_model())?;

        let policy = RetryPolicy::from(&config.runner);
        let recorder = TraceRecorder::new(config.store_trace, config.store_reasoning);
        let runner = |client| WindowedStageRunner::new(client, policy, recorder);

        info!(
            creator = %creator.model(),
            scorer = %scorer.model(),
            assigner = %assigner.model(),
            "Nuggetizer ready"
        );

        Ok(Nuggetizer {
            extraction: ExtractionStage::new(runner(creator), templates.clone())
                .with_window_size(config.creator_window_size())
                .with_max_nuggets(config.creator_max_nuggets())
                .with_mode(config.creator.mode),
            scoring: ScoringStage::new(runner(scorer), templates.clone())
                .with_window_size(config.scorer_window_size())
                .with_max_nuggets(config.scorer_max_nuggets())
                .with_mode(config.scorer.mode),
            assignment: AssignmentStage::new(runner(assigner), templates)
                .with_window_size(config.assigner_window_size())
                .with_mode(config.assigner.mode),
        })
    }
}
