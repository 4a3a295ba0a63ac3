//! Provenance capture for generation windows.

use chrono::Utc;
use nuggetizer_core::{CallParams, Component, Message, Trace};
use nuggetizer_providers::Generation;
use std::ops::Range;

/// Decides what provenance a window attaches to its entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceRecorder {
    store_trace: bool,
    store_reasoning: bool,
}

impl Default for TraceRecorder {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl TraceRecorder {
    pub fn new(store_trace: bool, store_reasoning: bool) -> Self {
        Self {
            store_trace,
            store_reasoning,
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, false)
    }

    pub fn stores_trace(&self) -> bool {
        self.store_trace
    }

    /// Build the trace for one generation call, if tracing is on. Messages
    /// and temperature are taken as sent.
    pub fn record(
        &self,
        component: Component,
        model: &str,
        generation: &Generation,
        window: Range<usize>,
    ) -> Option<Trace> {
        self.store_trace.then(|| Trace {
            component,
            model: model.to_string(),
            params: CallParams {
                temperature: generation.temperature,
            },
            messages: generation.messages.clone(),
            usage: generation.usage,
            raw_output: Some(generation.text.clone()),
            window_start: window.start,
            window_end: window.end,
            timestamp_utc: Utc::now(),
        })
    }

    /// Trace for a window whose calls never got text back.
    pub fn record_unanswered(
        &self,
        component: Component,
        model: &str,
        messages: Vec<Message>,
        temperature: f32,
        window: Range<usize>,
    ) -> Option<Trace> {
        self.store_trace.then(|| Trace {
            component,
            model: model.to_string(),
            params: CallParams { temperature },
            messages,
            usage: None,
            raw_output: None,
            window_start: window.start,
            window_end: window.end,
            timestamp_utc: Utc::now(),
        })
    }

    /// Model-reported reasoning to copy onto entities, if enabled.
    pub fn reasoning(&self, generation: &Generation) -> Option<String> {
        if self.store_reasoning {
            generation.reasoning.clone()
        } else {
            None
        }
    }
}
