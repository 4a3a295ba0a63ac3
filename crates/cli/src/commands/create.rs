//! `nuggetizer create`: extract and score nuggets per query.

use nuggetizer_core::{Error, Importance};
use nuggetizer_pipeline::Nuggetizer;
use serde_json::Value;
use tracing::info;

use crate::batch::{run_batch, BatchArgs};
use crate::records::{CreateOutput, CreateRecord};

pub async fn run(
    nuggetizer: &Nuggetizer,
    io: &BatchArgs,
    store_trajectory: bool,
) -> Result<(), Error> {
    run_batch(io, "/query/qid", |record| {
        create_record(nuggetizer, record, store_trajectory)
    })
    .await?;
    Ok(())
}

async fn create_record(
    nuggetizer: &Nuggetizer,
    record: Value,
    store_trajectory: bool,
) -> Result<CreateOutput, Error> {
    let request = serde_json::from_value::<CreateRecord>(record)?.into_request();

    let extraction = nuggetizer.extract(&request).await?;
    let scored = nuggetizer.score(&request.query, &extraction.nuggets).await?;

    info!(
        qid = %request.query.qid,
        documents = request.documents.len(),
        nuggets = scored.len(),
        vital = scored.iter().filter(|n| n.importance == Importance::Vital).count(),
        "Generated nuggets"
    );

    let output = CreateOutput::new(&request.query, scored);
    Ok(if store_trajectory {
        output.with_trajectory(extraction.trajectory)
    } else {
        output
    })
}
