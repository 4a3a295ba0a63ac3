//! `nuggetizer assign`: label nuggets against an answer or passages.

use nuggetizer_core::{Assignment, Error};
use nuggetizer_pipeline::Nuggetizer;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::batch::{run_batch, BatchArgs};
use crate::records::{AssignOutput, AssignRecord, PassageAssignment};

pub async fn run(nuggetizer: &Nuggetizer, io: &BatchArgs) -> Result<(), Error> {
    run_batch(io, "/qid", |record| assign_record(nuggetizer, record)).await?;
    Ok(())
}

/// What a record is assigned against.
enum Target {
    Answer(String),
    Candidates(Vec<(String, String)>),
}

impl Target {
    fn passages(&self) -> Vec<&str> {
        match self {
            Self::Answer(text) => vec![text.as_str()],
            Self::Candidates(candidates) => candidates.iter().map(|(_, s)| s.as_str()).collect(),
        }
    }
}

async fn assign_record(nuggetizer: &Nuggetizer, record: Value) -> Result<Value, Error> {
    let mut record: AssignRecord = serde_json::from_value(record)?;
    let query = record.query();

    let target = match (record.answer_text.take(), record.candidates.take()) {
        (Some(answer), _) => Target::Answer(answer),
        (None, Some(candidates)) => Target::Candidates(
            candidates
                .into_iter()
                .map(|c| (c.docid, c.doc.segment))
                .collect(),
        ),
        (None, None) => {
            return Err(Error::Internal(format!(
                "record {} has neither answer_text nor candidates",
                record.qid
            )));
        }
    };
    let passages = target.passages();

    let output = match record.scored_nuggets() {
        Some(scored) => {
            let results = nuggetizer.assign_batch(&query, &passages, &scored).await?;
            log_labels(&record.qid, results.iter().flatten().map(|n| n.assignment));
            serde_json::to_value(build_output(record, target, results))?
        }
        None => {
            let nuggets = record.plain_nuggets();
            let mut results = Vec::with_capacity(passages.len());
            for passage in &passages {
                results.push(nuggetizer.assign_unscored(&query, passage, &nuggets).await?);
            }
            log_labels(&record.qid, results.iter().flatten().map(|n| n.assignment));
            serde_json::to_value(build_output(record, target, results))?
        }
    };
    Ok(output)
}

fn build_output<A: Serialize>(
    record: AssignRecord,
    target: Target,
    results: Vec<Vec<A>>,
) -> AssignOutput<A> {
    let (answer_text, nuggets, assignments) = match target {
        Target::Answer(answer) => (Some(answer), results.into_iter().next(), None),
        Target::Candidates(candidates) => {
            let assignments = candidates
                .into_iter()
                .zip(results)
                .map(|((docid, _), nuggets)| PassageAssignment { docid, nuggets })
                .collect();
            (None, None, Some(assignments))
        }
    };

    AssignOutput {
        qid: record.qid,
        query: record.query,
        answer_text,
        nuggets,
        assignments,
        extra: record.extra,
    }
}

fn log_labels(qid: &str, labels: impl Iterator<Item = Assignment>) {
    let (mut support, mut partial, mut not_support, mut failed) = (0, 0, 0, 0);
    for label in labels {
        match label {
            Assignment::Support => support += 1,
            Assignment::PartialSupport => partial += 1,
            Assignment::NotSupport => not_support += 1,
            Assignment::Failed => failed += 1,
        }
    }
    info!(qid, support, partial, not_support, failed, "Completed assignment");
}
