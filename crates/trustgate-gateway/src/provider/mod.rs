//! Bundled file-backed trust score provider.
//!
//! Reads `scores` (and an optional normalization `mapping`) from YAML and
//! pushes them to a score store on a fixed cadence.

mod feed;
mod push;

pub use feed::{FileProvider, ProviderFeed};
pub use push::run_push_loop;
