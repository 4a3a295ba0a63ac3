//! The windowed generate-parse-retry loop shared by every stage.
//!
//! Each window runs an explicit state machine:
//!
//! ```text
//! Build ──► Generate ──► Parse ──► Done
//!              ▲           │
//!              │           ▼ (parse or transport failure)
//!              └── RetryGenerate ──► Fallback (budget spent)
//! ```
//!
//! The first attempt uses the initial temperature; every attempt after a
//! failure uses the retry temperature. Transport and parse failures both
//! spend one unit of the window's budget. A content-filter rejection leaves
//! the machine immediately and is returned to the caller. A window that
//! falls back still reports the trace of its last attempt.
//!
//! Budget bookkeeping lives in [`WindowMachine`], which has no provider
//! dependency, so the transitions can be tested on their own.

use nuggetizer_config::RunnerConfig;
use nuggetizer_core::{
    Component, Error, Message, ParseError, PromptError, ProviderError, Trace,
};
use nuggetizer_providers::{Generation, ProviderClient};
use serde::Serialize;
use std::fmt::Display;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::trace::TraceRecorder;

/// Parse-retry budget and temperature schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub budget: u32,
    pub initial_temperature: f32,
    pub retry_temperature: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RunnerConfig::default())
    }
}

impl From<&RunnerConfig> for RetryPolicy {
    fn from(config: &RunnerConfig) -> Self {
        Self {
            budget: config.parse_retry_budget,
            initial_temperature: config.initial_temperature,
            retry_temperature: config.retry_temperature,
        }
    }
}

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    RetryGenerate,
    Fallback,
}

/// Budget and temperature state for one window.
#[derive(Debug, Clone)]
pub struct WindowMachine {
    policy: RetryPolicy,
    remaining: u32,
    temperature: f32,
    attempts: u32,
    last_temperature: f32,
    responded: bool,
    last_error: Option<String>,
}

impl WindowMachine {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            remaining: policy.budget,
            temperature: policy.initial_temperature,
            attempts: 0,
            last_temperature: policy.initial_temperature,
            responded: false,
            last_error: None,
        }
    }

    pub fn can_attempt(&self) -> bool {
        self.remaining > 0
    }

    /// Start an attempt and return the temperature to use.
    pub fn begin_attempt(&mut self) -> f32 {
        self.attempts += 1;
        self.last_temperature = self.temperature;
        self.temperature
    }

    /// The backend produced text for this window.
    pub fn response_received(&mut self) {
        self.responded = true;
    }

    /// Spend one unit of budget and escalate the temperature.
    pub fn fail(&mut self, cause: impl Display) -> Transition {
        self.remaining = self.remaining.saturating_sub(1);
        self.temperature = self.policy.retry_temperature;
        self.last_error = Some(cause.to_string());
        if self.remaining > 0 {
            Transition::RetryGenerate
        } else {
            Transition::Fallback
        }
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn responded(&self) -> bool {
        self.responded
    }
}

/// How a window ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WindowDisposition {
    Accepted,
    Fallback {
        /// Whether any attempt got text back from the backend
        responded: bool,
        last_error: Option<String>,
    },
}

/// Outcome log entry for one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindowReport {
    pub component: Component,
    pub window_start: usize,
    pub window_end: usize,
    pub attempts: u32,
    /// Temperature of the last attempt made
    pub final_temperature: f32,
    pub disposition: WindowDisposition,
}

impl WindowReport {
    pub fn is_fallback(&self) -> bool {
        matches!(self.disposition, WindowDisposition::Fallback { .. })
    }

    /// For fallback windows, whether any response was obtained.
    pub fn responded(&self) -> bool {
        match &self.disposition {
            WindowDisposition::Accepted => true,
            WindowDisposition::Fallback { responded, .. } => *responded,
        }
    }
}

/// A parsed response plus the provenance to attach to its entities.
#[derive(Debug, Clone)]
pub struct Accepted<T> {
    pub value: T,
    pub trace: Option<Trace>,
    pub reasoning: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WindowOutcome<T> {
    /// `None` when the window fell back
    pub accepted: Option<Accepted<T>>,
    /// Provenance of the last attempt of a fallback window, when tracing is
    /// on and at least one call was made
    pub fallback_trace: Option<Trace>,
    pub report: WindowReport,
}

/// Split `len` items into consecutive windows of at most `size`.
pub fn windows(len: usize, size: usize) -> impl Iterator<Item = Range<usize>> {
    let size = size.max(1);
    (0..len)
        .step_by(size)
        .map(move |start| start..(start + size).min(len))
}

enum WindowState<T> {
    Build,
    Generate,
    Parse { generation: Generation },
    RetryGenerate,
    Done { value: T, generation: Generation },
    Fallback,
}

impl<T> From<Transition> for WindowState<T> {
    fn from(transition: Transition) -> Self {
        match transition {
            Transition::RetryGenerate => Self::RetryGenerate,
            Transition::Fallback => Self::Fallback,
        }
    }
}

/// Drives windows through the state machine against one provider client.
#[derive(Debug, Clone)]
pub struct WindowedStageRunner {
    client: Arc<ProviderClient>,
    policy: RetryPolicy,
    recorder: TraceRecorder,
}

impl WindowedStageRunner {
    pub fn new(client: Arc<ProviderClient>, policy: RetryPolicy, recorder: TraceRecorder) -> Self {
        Self {
            client,
            policy,
            recorder,
        }
    }

    pub fn client(&self) -> &Arc<ProviderClient> {
        &self.client
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run one window: build its prompt, then generate and parse until a
    /// response parses or the budget is spent.
    pub async fn run_window<T, B, P>(
        &self,
        component: Component,
        window: Range<usize>,
        build: B,
        parse: P,
    ) -> Result<WindowOutcome<T>, Error>
    where
        B: Fn() -> Result<Vec<Message>, PromptError>,
        P: Fn(&str) -> Result<T, ParseError>,
    {
        let mut machine = WindowMachine::new(self.policy);
        let mut messages = Vec::new();
        let mut last_generation: Option<Generation> = None;
        let mut state = WindowState::Build;

        loop {
            state = match state {
                WindowState::Build => {
                    messages = build()?;
                    debug!(
                        stage = %component,
                        window_start = window.start,
                        window_end = window.end,
                        prompt = %messages.last().map(|m| m.content.as_str()).unwrap_or_default(),
                        "Built window prompt"
                    );
                    if machine.can_attempt() {
                        WindowState::Generate
                    } else {
                        WindowState::Fallback
                    }
                }

                WindowState::Generate => {
                    let temperature = machine.begin_attempt();
                    match self.client.generate(&messages, temperature).await {
                        Ok(generation) => {
                            machine.response_received();
                            debug!(
                                stage = %component,
                                attempt = machine.attempts(),
                                raw = %generation.text,
                                "Received response"
                            );
                            WindowState::Parse { generation }
                        }
                        Err(e @ ProviderError::ContentFiltered(_)) => {
                            error!(
                                stage = %component,
                                window_start = window.start,
                                window_end = window.end,
                                error = %e,
                                "Generation blocked by content filter"
                            );
                            return Err(e.into());
                        }
                        Err(e) => {
                            warn!(
                                stage = %component,
                                window_start = window.start,
                                window_end = window.end,
                                attempt = machine.attempts(),
                                temperature,
                                error = %e,
                                "Generation failed"
                            );
                            machine.fail(&e).into()
                        }
                    }
                }

                WindowState::Parse { generation } => match parse(&generation.text) {
                    Ok(value) => WindowState::Done { value, generation },
                    Err(e) => {
                        warn!(
                            stage = %component,
                            window_start = window.start,
                            window_end = window.end,
                            attempt = machine.attempts(),
                            temperature = generation.temperature,
                            remaining = machine.remaining().saturating_sub(1),
                            error = %e,
                            "Failed to parse response"
                        );
                        last_generation = Some(generation);
                        machine.fail(&e).into()
                    }
                },

                WindowState::RetryGenerate => WindowState::Generate,

                WindowState::Done { value, generation } => {
                    info!(
                        stage = %component,
                        window_start = window.start,
                        window_end = window.end,
                        attempts = machine.attempts(),
                        temperature = generation.temperature,
                        tokens = generation.token_count,
                        "Window accepted"
                    );
                    let trace = self.recorder.record(
                        component,
                        self.client.model(),
                        &generation,
                        window.clone(),
                    );
                    let reasoning = self.recorder.reasoning(&generation);
                    return Ok(WindowOutcome {
                        accepted: Some(Accepted {
                            value,
                            trace,
                            reasoning,
                        }),
                        fallback_trace: None,
                        report: self.report(component, &window, &machine, WindowDisposition::Accepted),
                    });
                }

                WindowState::Fallback => {
                    error!(
                        stage = %component,
                        window_start = window.start,
                        window_end = window.end,
                        attempts = machine.attempts(),
                        responded = machine.responded(),
                        "Retry budget exhausted, using fallback"
                    );
                    let disposition = WindowDisposition::Fallback {
                        responded: machine.responded(),
                        last_error: machine.last_error.clone(),
                    };
                    let fallback_trace = match &last_generation {
                        Some(generation) => self.recorder.record(
                            component,
                            self.client.model(),
                            generation,
                            window.clone(),
                        ),
                        None if machine.attempts() > 0 => {
                            let (sent, temperature) =
                                self.client.adapt(&messages, machine.last_temperature);
                            self.recorder.record_unanswered(
                                component,
                                self.client.model(),
                                sent,
                                temperature,
                                window.clone(),
                            )
                        }
                        None => None,
                    };
                    return Ok(WindowOutcome {
                        accepted: None,
                        fallback_trace,
                        report: self.report(component, &window, &machine, disposition),
                    });
                }
            };
        }
    }

    fn report(
        &self,
        component: Component,
        window: &Range<usize>,
        machine: &WindowMachine,
        disposition: WindowDisposition,
    ) -> WindowReport {
        WindowReport {
            component,
            window_start: window.start,
            window_end: window.end,
            attempts: machine.attempts(),
            final_temperature: machine.last_temperature,
            disposition,
        }
    }
}
