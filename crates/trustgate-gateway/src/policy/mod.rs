//! Policy decision point.
//!
//! Holds the active policy generation (ordered rules plus group membership),
//! evaluates requests against it with score data pulled from the score store,
//! and memoizes boolean decisions for a short TTL. Reloads swap a whole
//! generation or nothing.

pub mod cache;
pub mod document;
pub mod engine;
pub mod source;

pub use cache::{DecisionCache, DecisionKey};
pub use document::{Policy, PolicyDocument, PolicyEntry, PolicySet};
pub use engine::{Decision, DecisionPoint, DenyReason, SCORES_ALIAS, SCORES_TABLE};
pub use source::{spawn_reload_watcher, ConfigSource, FileConfigSource, StaticConfigSource};
