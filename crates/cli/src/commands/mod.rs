pub mod assign;
pub mod create;
pub mod metrics;
pub mod score;
