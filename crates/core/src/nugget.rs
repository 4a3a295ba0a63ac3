//! Requests and the nugget entities each stage emits.

use serde::{Deserialize, Serialize};

use crate::label::{Assignment, Importance};
use crate::trace::Trace;

/// The information need driving extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub qid: String,
    pub text: String,
}

impl Query {
    pub fn new(qid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            qid: qid.into(),
            text: text.into(),
        }
    }
}

/// One unit of evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub docid: String,
    pub segment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Document {
    pub fn new(docid: impl Into<String>, segment: impl Into<String>) -> Self {
        Self {
            docid: docid.into(),
            segment: segment.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// A query with its documents. Document order is significant: it fixes the
/// window order during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub query: Query,
    pub documents: Vec<Document>,
}

impl Request {
    pub fn new(query: Query, documents: Vec<Document>) -> Self {
        Self { query, documents }
    }
}

/// Anything that carries claim text a stage can put into a prompt.
pub trait Claim {
    fn text(&self) -> &str;
}

impl Claim for String {
    fn text(&self) -> &str {
        self
    }
}

/// An extracted claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nugget {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

impl Nugget {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: None,
            trace: None,
        }
    }
}

/// A claim with an importance label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNugget {
    pub text: String,
    pub importance: Importance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

impl ScoredNugget {
    pub fn new(text: impl Into<String>, importance: Importance) -> Self {
        Self {
            text: text.into(),
            importance,
            reasoning: None,
            trace: None,
        }
    }
}

/// A claim labeled against a passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedNugget {
    pub text: String,
    pub assignment: Assignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

/// A scored claim labeled against a passage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedScoredNugget {
    pub text: String,
    pub importance: Importance,
    pub assignment: Assignment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Trace>,
}

impl Claim for Nugget {
    fn text(&self) -> &str {
        &self.text
    }
}

impl Claim for ScoredNugget {
    fn text(&self) -> &str {
        &self.text
    }
}

impl Claim for AssignedScoredNugget {
    fn text(&self) -> &str {
        &self.text
    }
}

/// A claim that can receive an assignment label.
///
/// Implemented for both unscored and scored nuggets so one assignment stage
/// serves both shapes.
pub trait Assignable: Claim {
    type Assigned;

    fn assign(
        &self,
        assignment: Assignment,
        reasoning: Option<String>,
        trace: Option<Trace>,
    ) -> Self::Assigned;
}

impl Assignable for Nugget {
    type Assigned = AssignedNugget;

    fn assign(
        &self,
        assignment: Assignment,
        reasoning: Option<String>,
        trace: Option<Trace>,
    ) -> AssignedNugget {
        AssignedNugget {
            text: self.text.clone(),
            assignment,
            reasoning,
            trace,
        }
    }
}

impl Assignable for ScoredNugget {
    type Assigned = AssignedScoredNugget;

    fn assign(
        &self,
        assignment: Assignment,
        reasoning: Option<String>,
        trace: Option<Trace>,
    ) -> AssignedScoredNugget {
        AssignedScoredNugget {
            text: self.text.clone(),
            importance: self.importance,
            assignment,
            reasoning,
            trace,
        }
    }
}
