//! `nuggetizer metrics`: recall scores over assigned records.

use nuggetizer_core::{AssignedScoredNugget, Error};
use nuggetizer_pipeline::{calculate_global_metrics, calculate_nugget_scores, NuggetMetrics};
use serde::Deserialize;
use std::io::Write;
use std::path::Path;
use tracing::{error, info};

use crate::batch::{read_jsonl, JsonlWriter};

/// An assigned record as written by `assign` with an answer text.
#[derive(Debug, Deserialize)]
struct AssignedRecord {
    qid: String,
    #[serde(default)]
    nuggets: Vec<AssignedScoredNugget>,
}

pub fn run(input: &Path, output: Option<&Path>) -> Result<(), Error> {
    let records = read_jsonl(input)?;
    let per_query = score_records(records);
    let global = calculate_global_metrics(&per_query);

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout().lock()),
    };
    let mut writer = JsonlWriter::new(sink);
    for metrics in per_query.iter().chain(std::iter::once(&global)) {
        writer.write(metrics)?;
    }

    info!(
        queries = per_query.len(),
        strict_vital = global.strict_vital_score,
        vital = global.vital_score,
        "Computed metrics"
    );
    Ok(())
}

fn score_records(records: Vec<serde_json::Value>) -> Vec<NuggetMetrics> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value::<AssignedRecord>(record) {
            Ok(record) => Some(calculate_nugget_scores(&record.qid, &record.nuggets)),
            Err(e) => {
                error!(error = %e, "Skipping record without assigned nuggets");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unreadable_records_are_skipped() {
        let per_query = score_records(vec![
            json!({"qid": "q1", "nuggets": [
                {"text": "a", "importance": "vital", "assignment": "support"},
                {"text": "b", "importance": "okay", "assignment": "partial_support"}
            ]}),
            json!({"qid": "q2", "nuggets": [{"text": "a"}]}),
        ]);

        assert_eq!(per_query.len(), 1);
        assert_eq!(per_query[0].strict_vital_score, 1.0);
        assert_eq!(per_query[0].all_score, 0.75);
    }

    #[test]
    fn writes_one_line_per_query_plus_global() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("assigned.jsonl");
        let output = dir.path().join("metrics.jsonl");
        std::fs::write(
            &input,
            concat!(
                r#"{"qid": "q1", "nuggets": [{"text": "a", "importance": "vital", "assignment": "support"}]}"#,
                "\n",
                r#"{"qid": "q2", "nuggets": [{"text": "a", "importance": "vital", "assignment": "not_support"}]}"#,
                "\n"
            ),
        )
        .unwrap();

        run(&input, Some(&output)).unwrap();

        let lines = read_jsonl(&output).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["qid"], "q1");
        assert_eq!(lines[2]["qid"], "all");
        assert_eq!(lines[2]["strict_vital_score"], 0.5);
    }
}
