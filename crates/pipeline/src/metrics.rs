//! Per-query and global nugget recall metrics.
//!
//! Strict scores count only `support`; the lenient scores add half credit for
//! `partial_support`. "Vital" scores restrict both numerator and denominator
//! to vital nuggets. An empty denominator scores 0.

use nuggetizer_core::{AssignedScoredNugget, Assignment, Importance};
use serde::{Deserialize, Serialize};

/// Label name used for the aggregate record.
pub const GLOBAL_QID: &str = "all";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NuggetMetrics {
    pub qid: String,
    pub strict_vital_score: f64,
    pub strict_all_score: f64,
    pub vital_score: f64,
    pub all_score: f64,
}

fn strict_credit(assignment: Assignment) -> f64 {
    match assignment {
        Assignment::Support => 1.0,
        _ => 0.0,
    }
}

fn lenient_credit(assignment: Assignment) -> f64 {
    match assignment {
        Assignment::Support => 1.0,
        Assignment::PartialSupport => 0.5,
        _ => 0.0,
    }
}

fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

fn credit_sum<'a>(
    items: impl Iterator<Item = &'a AssignedScoredNugget>,
    credit: fn(Assignment) -> f64,
) -> f64 {
    items.map(|n| credit(n.assignment)).sum()
}

pub fn calculate_nugget_scores(qid: &str, nuggets: &[AssignedScoredNugget]) -> NuggetMetrics {
    let vital: Vec<&AssignedScoredNugget> = nuggets
        .iter()
        .filter(|n| n.importance == Importance::Vital)
        .collect();

    NuggetMetrics {
        qid: qid.to_string(),
        strict_vital_score: ratio(credit_sum(vital.iter().copied(), strict_credit), vital.len()),
        strict_all_score: ratio(credit_sum(nuggets.iter(), strict_credit), nuggets.len()),
        vital_score: ratio(credit_sum(vital.iter().copied(), lenient_credit), vital.len()),
        all_score: ratio(credit_sum(nuggets.iter(), lenient_credit), nuggets.len()),
    }
}

fn mean(records: &[NuggetMetrics], field: impl Fn(&NuggetMetrics) -> f64) -> f64 {
    ratio(records.iter().map(field).sum(), records.len())
}

/// Arithmetic mean of every score across `records`.
pub fn calculate_global_metrics(records: &[NuggetMetrics]) -> NuggetMetrics {
    NuggetMetrics {
        qid: GLOBAL_QID.to_string(),
        strict_vital_score: mean(records, |m| m.strict_vital_score),
        strict_all_score: mean(records, |m| m.strict_all_score),
        vital_score: mean(records, |m| m.vital_score),
        all_score: mean(records, |m| m.all_score),
    }
}
