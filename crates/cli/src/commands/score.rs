//! `nuggetizer score`: label existing nuggets vital or okay.

use nuggetizer_core::{Error, Importance, Nugget, ScoredNugget};
use nuggetizer_pipeline::Nuggetizer;
use serde_json::Value;
use tracing::info;

use crate::batch::{run_batch, BatchArgs};
use crate::records::ScoreRecord;

pub async fn run(nuggetizer: &Nuggetizer, io: &BatchArgs) -> Result<(), Error> {
    run_batch(io, "/qid", |record| score_record(nuggetizer, record)).await?;
    Ok(())
}

async fn score_record(
    nuggetizer: &Nuggetizer,
    record: Value,
) -> Result<ScoreRecord<ScoredNugget>, Error> {
    let record: ScoreRecord<Nugget> = serde_json::from_value(record)?;
    let scored = nuggetizer.score(&record.query(), &record.nuggets).await?;

    let vital = scored
        .iter()
        .filter(|n| n.importance == Importance::Vital)
        .count();
    info!(
        qid = %record.qid,
        vital,
        okay = scored.len() - vital,
        "Completed scoring"
    );

    Ok(record.with_nuggets(scored))
}
