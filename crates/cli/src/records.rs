//! JSONL record shapes read and written by the batch commands.
//!
//! Fields a command does not use are carried through to its output
//! unchanged via `extra`.

use nuggetizer_core::{Document, Importance, Nugget, Query, Request, ScoredNugget};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A ranked candidate passage.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub docid: String,
    #[serde(default)]
    pub judgment: Option<f64>,
    pub doc: CandidateDoc,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CandidateDoc {
    pub segment: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl Candidate {
    /// Judged relevant (`judgment > 0`). Unjudged candidates are not.
    pub fn is_relevant(&self) -> bool {
        self.judgment.is_some_and(|j| j > 0.0)
    }

    pub fn into_document(self) -> Document {
        let document = Document::new(self.docid, self.doc.segment);
        match self.doc.title {
            Some(title) => document.with_title(title),
            None => document,
        }
    }
}

/// `create` input.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRecord {
    pub query: Query,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl CreateRecord {
    /// Build a request from the relevant candidates, in input order.
    pub fn into_request(self) -> Request {
        let documents = self
            .candidates
            .into_iter()
            .filter(Candidate::is_relevant)
            .map(Candidate::into_document)
            .collect();
        Request::new(self.query, documents)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuggetText {
    pub text: String,
}

/// `create` output.
#[derive(Debug, Serialize)]
pub struct CreateOutput {
    pub query: String,
    pub qid: String,
    pub nuggets: Vec<ScoredNugget>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nugget_trajectory: Option<Vec<Vec<NuggetText>>>,
}

impl CreateOutput {
    pub fn new(query: &Query, nuggets: Vec<ScoredNugget>) -> Self {
        Self {
            query: query.text.clone(),
            qid: query.qid.clone(),
            nuggets,
            nugget_trajectory: None,
        }
    }

    pub fn with_trajectory(mut self, trajectory: Vec<Vec<String>>) -> Self {
        self.nugget_trajectory = Some(
            trajectory
                .into_iter()
                .map(|step| step.into_iter().map(|text| NuggetText { text }).collect())
                .collect(),
        );
        self
    }
}

/// `score` input; `nuggets` is replaced by the scored list on output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreRecord<N> {
    pub qid: String,
    pub query: String,
    pub nuggets: Vec<N>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<N> ScoreRecord<N> {
    pub fn query(&self) -> Query {
        Query::new(&self.qid, &self.query)
    }

    pub fn with_nuggets<M>(self, nuggets: Vec<M>) -> ScoreRecord<M> {
        ScoreRecord {
            qid: self.qid,
            query: self.query,
            nuggets,
            extra: self.extra,
        }
    }
}

/// A nugget as it appears in `assign` input, scored or not.
#[derive(Debug, Clone, Deserialize)]
pub struct InputNugget {
    pub text: String,
    #[serde(default)]
    pub importance: Option<Importance>,
}

/// `assign` input. Exactly one of `answer_text` and `candidates` is used,
/// `answer_text` taking precedence.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignRecord {
    pub qid: String,
    pub query: String,
    pub nuggets: Vec<InputNugget>,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AssignRecord {
    pub fn query(&self) -> Query {
        Query::new(&self.qid, &self.query)
    }

    /// The nuggets with their importance, if every one of them has it.
    pub fn scored_nuggets(&self) -> Option<Vec<ScoredNugget>> {
        self.nuggets
            .iter()
            .map(|n| n.importance.map(|i| ScoredNugget::new(&n.text, i)))
            .collect()
    }

    pub fn plain_nuggets(&self) -> Vec<Nugget> {
        self.nuggets.iter().map(|n| Nugget::new(&n.text)).collect()
    }
}

/// Labels for one candidate passage.
#[derive(Debug, Serialize)]
pub struct PassageAssignment<A> {
    pub docid: String,
    pub nuggets: Vec<A>,
}

/// `assign` output. An answer-text record carries its labeled `nuggets`;
/// a candidates record carries one entry per passage in `assignments`.
#[derive(Debug, Serialize)]
pub struct AssignOutput<A> {
    pub qid: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nuggets: Option<Vec<A>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Vec<PassageAssignment<A>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn only_positively_judged_candidates_become_documents() {
        let record: CreateRecord = serde_json::from_value(json!({
            "query": {"qid": "q1", "text": "benefits of X"},
            "candidates": [
                {"docid": "d0", "judgment": 0, "doc": {"segment": "irrelevant"}},
                {"docid": "d1", "judgment": 2, "doc": {"segment": "X is cheap", "title": "X"}},
                {"docid": "d2", "doc": {"segment": "unjudged"}},
                {"docid": "d3", "judgment": 1, "doc": {"segment": "X is fast"}}
            ]
        }))
        .unwrap();

        let request = record.into_request();
        let ids: Vec<_> = request.documents.iter().map(|d| d.docid.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d3"]);
        assert_eq!(request.documents[0].title.as_deref(), Some("X"));
        assert_eq!(request.query.qid, "q1");
    }

    #[test]
    fn create_output_shape() {
        let query = Query::new("q1", "benefits of X");
        let output = CreateOutput::new(&query, vec![ScoredNugget::new("X is cheap", Importance::Vital)])
            .with_trajectory(vec![vec!["X is cheap".into()]]);

        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({
                "query": "benefits of X",
                "qid": "q1",
                "nuggets": [{"text": "X is cheap", "importance": "vital"}],
                "nugget_trajectory": [[{"text": "X is cheap"}]]
            })
        );
    }

    #[test]
    fn trajectory_is_omitted_unless_requested() {
        let output = CreateOutput::new(&Query::new("q1", "q"), Vec::new());
        let value = serde_json::to_value(&output).unwrap();
        assert!(value.get("nugget_trajectory").is_none());
    }

    #[test]
    fn score_record_keeps_unknown_fields() {
        let record: ScoreRecord<Nugget> = serde_json::from_value(json!({
            "qid": "q1",
            "query": "benefits of X",
            "nuggets": [{"text": "a"}],
            "run_id": "baseline"
        }))
        .unwrap();

        let scored = record.with_nuggets(vec![ScoredNugget::new("a", Importance::Okay)]);
        let value = serde_json::to_value(&scored).unwrap();
        assert_eq!(value["run_id"], "baseline");
        assert_eq!(value["nuggets"][0]["importance"], "okay");
    }

    #[test]
    fn scored_nuggets_require_every_importance() {
        let record: AssignRecord = serde_json::from_value(json!({
            "qid": "q1",
            "query": "q",
            "nuggets": [{"text": "a", "importance": "vital"}, {"text": "b"}],
            "answer_text": "a"
        }))
        .unwrap();
        assert!(record.scored_nuggets().is_none());
        assert_eq!(record.plain_nuggets().len(), 2);

        let record: AssignRecord = serde_json::from_value(json!({
            "qid": "q1",
            "query": "q",
            "nuggets": [{"text": "a", "importance": "vital"}],
            "candidates": [{"docid": "d1", "doc": {"segment": "a"}}]
        }))
        .unwrap();
        let scored = record.scored_nuggets().unwrap();
        assert_eq!(scored[0].importance, Importance::Vital);
        assert!(record.answer_text.is_none());
        assert!(!record.extra.contains_key("candidates"));
    }
}
