//! JSONL batch plumbing shared by the record-processing commands.
//!
//! Output is appended one flushed line per record, so an interrupted run can
//! be resumed: records whose qid already appears in the output are skipped.

use clap::Args;
use nuggetizer_core::Error;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Input and output files of a batch command.
#[derive(Debug, Clone, Args)]
pub struct BatchArgs {
    /// Path to input JSONL file
    #[arg(long, alias = "input_file")]
    pub input_file: PathBuf,

    /// Path to output JSONL file (appended to)
    #[arg(long, alias = "output_file")]
    pub output_file: PathBuf,
}

/// Counters reported at the end of a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub written: usize,
    pub already_processed: usize,
    pub failed: usize,
}

/// Read every JSON line of `path`. Blank lines are ignored and malformed
/// lines are logged and skipped.
pub fn read_jsonl(path: &Path) -> Result<Vec<Value>, Error> {
    let content = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = idx + 1,
                error = %e,
                "Skipping malformed JSON line"
            ),
        }
    }
    Ok(records)
}

/// The qids already written to `path`. A missing file has none.
pub fn processed_qids(path: &Path) -> Result<HashSet<String>, Error> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };

    Ok(content
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|record| qid_at(&record, "/qid"))
        .collect())
}

/// String qid found at a JSON pointer, if any.
pub fn qid_at(record: &Value, pointer: &str) -> Option<String> {
    record
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Writes one JSON document per line, flushing after each.
pub struct JsonlWriter<W: Write = File> {
    sink: W,
}

impl JsonlWriter<File> {
    pub fn append(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<(), Error> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        self.sink.write_all(line.as_bytes())?;
        self.sink.flush()?;
        Ok(())
    }
}

/// Run `process` over every input record not yet present in the output.
///
/// `qid_pointer` locates the qid inside an input record. A record whose
/// processing fails is logged and skipped unless the error affects the whole
/// batch, in which case the batch stops with that error.
pub async fn run_batch<F, Fut, T>(
    io: &BatchArgs,
    qid_pointer: &str,
    mut process: F,
) -> Result<BatchSummary, Error>
where
    F: FnMut(Value) -> Fut,
    Fut: Future<Output = Result<T, Error>>,
    T: Serialize,
{
    let done = processed_qids(&io.output_file)?;
    info!(
        already_processed = done.len(),
        output = %io.output_file.display(),
        "Found already processed records"
    );

    let records = read_jsonl(&io.input_file)?;
    let mut summary = BatchSummary {
        total: records.len(),
        ..Default::default()
    };
    info!(records = summary.total, input = %io.input_file.display(), "Processing records");

    let mut writer = JsonlWriter::append(&io.output_file)?;

    for (idx, record) in records.into_iter().enumerate() {
        let qid = qid_at(&record, qid_pointer);
        if qid.as_ref().is_some_and(|q| done.contains(q)) {
            info!(qid = qid.as_deref().unwrap_or_default(), "Skipping already processed record");
            summary.already_processed += 1;
            continue;
        }
        let label = qid.unwrap_or_else(|| format!("#{}", idx + 1));

        info!(qid = %label, record = idx + 1, total = summary.total, "Processing record");
        match process(record).await {
            Ok(output) => {
                writer.write(&output)?;
                summary.written += 1;
            }
            Err(e) if e.is_fatal_for_batch() => {
                error!(qid = %label, error = %e, "Stopping batch");
                return Err(e);
            }
            Err(e) => {
                error!(qid = %label, error = %e, "Error processing record, skipping");
                summary.failed += 1;
            }
        }
    }

    info!(
        written = summary.written,
        already_processed = summary.already_processed,
        failed = summary.failed,
        "Processing complete"
    );
    Ok(summary)
}
