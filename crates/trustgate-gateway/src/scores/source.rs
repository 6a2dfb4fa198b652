use async_trait::async_trait;

use trustgate_core::error::Result;
use trustgate_core::protocol::api::{ScoreAnswer, ScoreUpdate};

use super::store::ScoreStore;

/// Read side of the score store, as seen by the decision point.
#[async_trait]
pub trait ScoreSource: Send + Sync {
    /// Known `provider:key` scores for `user`; unknown keys are absent.
    async fn get_scores(&self, user: &str, keys: &[String]) -> Result<ScoreAnswer>;
}

/// Write side of the score store, as seen by providers.
#[async_trait]
pub trait ScoreSink: Send + Sync {
    async fn onramp(&self, name: &str, pull: Option<&str>) -> Result<()>;
    async fn push(&self, update: &ScoreUpdate) -> Result<()>;
}

#[async_trait]
impl ScoreSource for ScoreStore {
    async fn get_scores(&self, user: &str, keys: &[String]) -> Result<ScoreAnswer> {
        Ok(ScoreStore::get_scores(self, user, keys))
    }
}

#[async_trait]
impl ScoreSink for ScoreStore {
    async fn onramp(&self, name: &str, pull: Option<&str>) -> Result<()> {
        self.register_provider(name, pull.map(str::to_string));
        Ok(())
    }

    /// Normalizes on the calling task. Only the co-located provider loop
    /// pushes through here; `/update` moves the same work off the runtime.
    async fn push(&self, update: &ScoreUpdate) -> Result<()> {
        self.update_scores(&update.name, &update.scores, update.mapping.as_ref())
            .map(|_| ())
    }
}
