//! Provenance records attached to emitted nuggets.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;
use crate::provider::Usage;

/// Which pipeline stage produced an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    Creator,
    Scorer,
    Assigner,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creator => write!(f, "creator"),
            Self::Scorer => write!(f, "scorer"),
            Self::Assigner => write!(f, "assigner"),
        }
    }
}

/// Parameters the generation call was made with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CallParams {
    pub temperature: f32,
}

/// One generation call's inputs and outputs.
///
/// A trace is created when the entity it describes is emitted and never
/// modified afterwards. Entities produced by the same call each own an
/// identical copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub component: Component,
    pub model: String,
    pub params: CallParams,
    /// The messages sent to the model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Raw text as returned, before fence stripping
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    pub window_start: usize,
    pub window_end: usize,
    pub timestamp_utc: DateTime<Utc>,
}

impl Trace {
    /// ISO-8601 rendering of the call time with a `Z` suffix.
    pub fn timestamp_iso(&self) -> String {
        self.timestamp_utc.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Trace {
        Trace {
            component: Component::Scorer,
            model: "gpt-4o".into(),
            params: CallParams { temperature: 0.2 },
            messages: vec![Message::user("label")],
            usage: None,
            raw_output: Some("['vital']".into()),
            window_start: 0,
            window_end: 1,
            timestamp_utc: Utc::now(),
        }
    }

    #[test]
    fn component_serializes_lowercase() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["component"], "scorer");
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["params"]["temperature"].as_f64().unwrap() as f32, 0.2);
        assert!(json.get("usage").is_none());
    }

    #[test]
    fn timestamp_has_utc_suffix() {
        assert!(sample().timestamp_iso().ends_with('Z'));
    }
}
