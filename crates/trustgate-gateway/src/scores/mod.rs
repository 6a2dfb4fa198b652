//! Trust score store (score aggregator role).
//!
//! Providers push raw per-user scores, optionally with normalization scripts;
//! the store keeps canonical `f64` values with a freshness timestamp and a
//! background sweeper evicts entries nobody refreshed. Readers address scores
//! as `provider:key`.

pub mod remote;
mod source;
mod store;
mod sweeper;

pub use remote::HttpScoreClient;
pub use source::{ScoreSink, ScoreSource};
pub use store::{
    AgeThresholds, ScoreEntry, ScoreRef, ScoreStore, SweepReport, UpdateSummary, BATCH_TABLE, RAW_TABLE,
};
pub use sweeper::spawn_sweeper;
