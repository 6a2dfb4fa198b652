use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use serde_yaml::Value as YamlValue;

use trustgate_core::error::{Result, TrustGateError};
use trustgate_core::protocol::api::{NormalizationMapping, ScoreAnswer, ScoreUpdate, ScoresByUser};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FeedFile {
    scores: serde_yaml::Mapping,
    #[serde(default)]
    mapping: Option<NormalizationMapping>,
}

/// One snapshot of a provider's score file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFeed {
    name: String,
    scores: ScoresByUser,
    mapping: Option<NormalizationMapping>,
}

impl ProviderFeed {
    /// Parse feed YAML. Users and keys become strings, values become `f64`.
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let file: FeedFile = serde_yaml::from_str(text)
            .map_err(|e| TrustGateError::Config(format!("provider {name}: invalid yaml: {e}")))?;

        let mut scores = ScoresByUser::new();
        for (user, table) in &file.scores {
            let user = canonical_name(user).ok_or_else(|| {
                TrustGateError::Config(format!("provider {name}: user names must be scalars"))
            })?;
            let table = table.as_mapping().ok_or_else(|| {
                TrustGateError::Config(format!("provider {name}: scores of {user} must be a map"))
            })?;

            let mut row = HashMap::with_capacity(table.len());
            for (key, value) in table {
                let key = canonical_name(key).ok_or_else(|| {
                    TrustGateError::Config(format!("provider {name}: score keys of {user} must be scalars"))
                })?;
                let value = canonical_value(value).ok_or_else(|| {
                    TrustGateError::Config(format!("provider {name}: {user}.{key} is not a number"))
                })?;
                row.insert(key, value);
            }
            scores.insert(user, row);
        }

        Ok(Self {
            name: name.to_string(),
            scores,
            mapping: file.mapping.filter(|m| !m.is_empty()),
        })
    }

    pub async fn load(name: &str, path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            TrustGateError::Config(format!("provider {name}: read {}: {e}", path.display()))
        })?;
        Self::parse(name, &text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scores(&self) -> &ScoresByUser {
        &self.scores
    }

    pub fn mapping(&self) -> Option<&NormalizationMapping> {
        self.mapping.as_ref()
    }

    /// Requested keys the feed has for `user`.
    pub fn get(&self, user: &str, keys: &[String]) -> ScoreAnswer {
        let Some(row) = self.scores.get(user) else {
            return ScoreAnswer::new();
        };
        keys.iter()
            .filter_map(|k| row.get(k).map(|v| (k.clone(), *v)))
            .collect()
    }

    /// `/update` body carrying the whole feed.
    pub fn to_update(&self) -> ScoreUpdate {
        ScoreUpdate {
            name: self.name.clone(),
            scores: self.scores.clone(),
            mapping: self.mapping.clone(),
        }
    }
}

fn canonical_name(v: &YamlValue) -> Option<String> {
    match v {
        YamlValue::String(s) => Some(s.clone()),
        YamlValue::Number(n) => Some(n.to_string()),
        YamlValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn canonical_value(v: &YamlValue) -> Option<f64> {
    match v {
        YamlValue::Number(n) => n.as_f64(),
        YamlValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        YamlValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// File-backed provider whose feed is re-read before every push.
#[derive(Debug)]
pub struct FileProvider {
    path: PathBuf,
    current: RwLock<Arc<ProviderFeed>>,
}

impl FileProvider {
    pub async fn open(name: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let feed = ProviderFeed::load(name, &path).await?;
        tracing::info!(provider = %name, file = %path.display(), users = feed.scores().len(), "provider feed loaded");
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(feed)),
        })
    }

    pub fn current(&self) -> Arc<ProviderFeed> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn name(&self) -> String {
        self.current().name().to_string()
    }

    /// Re-read the file. On error the previous feed stays current.
    pub async fn reload(&self) -> Result<Arc<ProviderFeed>> {
        let name = self.name();
        let feed = Arc::new(ProviderFeed::load(&name, &self.path).await?);
        tracing::debug!(provider = %name, users = feed.scores().len(), "provider feed reloaded");
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&feed);
        Ok(feed)
    }
}
