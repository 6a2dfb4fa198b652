#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use trustgate_core::error::{Result, TrustGateError};
use trustgate_core::protocol::api::ScoreAnswer;
use trustgate_gateway::obs::metrics::GatewayMetrics;
use trustgate_gateway::policy::{
    ConfigSource, Decision, DecisionCache, DecisionKey, DecisionPoint, DenyReason,
    StaticConfigSource,
};
use trustgate_gateway::scores::ScoreSource;
use trustgate_gateway::script::ScriptRuntime;

#[derive(Default)]
struct CountingSource {
    calls: AtomicUsize,
    scores: ScoreAnswer,
}

impl CountingSource {
    fn with(pairs: &[(&str, f64)]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            scores: pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScoreSource for CountingSource {
    async fn get_scores(&self, _user: &str, keys: &[String]) -> Result<ScoreAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(keys
            .iter()
            .filter_map(|k| self.scores.get(k).map(|v| (k.clone(), *v)))
            .collect())
    }
}

struct DownSource;

#[async_trait]
impl ScoreSource for DownSource {
    async fn get_scores(&self, _user: &str, _keys: &[String]) -> Result<ScoreAnswer> {
        Err(TrustGateError::Unavailable("connection refused".into()))
    }
}

const POLICY: &str = r#"
groups:
  ops: [alice]
  viewers: [bob, 42]
policies:
  - resource_group: wsw-rpc
    resource: "^admin"
    groups: [ops]
    keys: ["tscp1:risk"]
    policy: |
      local risk = scores["tscp1:risk"]
      risk ~= nil and risk < 0.5
  - resource_group: wsw-sub
    resource: "topic\\."
    groups: [ops, viewers]
    policy: "true"
  - resource_group: wsw-event
    resource: "zero"
    groups: [viewers]
    policy: "0"
  - resource_group: wsw-event
    resource: "boom"
    groups: [viewers]
    policy: "error('boom')"
"#;

fn decision_point(source: Arc<dyn ScoreSource>, ttl: Duration) -> DecisionPoint {
    DecisionPoint::new(
        source,
        ScriptRuntime::default(),
        ttl,
        Arc::new(GatewayMetrics::default()),
    )
}

fn loaded(source: Arc<dyn ScoreSource>, text: &str) -> DecisionPoint {
    let dp = decision_point(source, Duration::from_secs(10));
    dp.reload(text).expect("policy loads");
    dp
}

#[tokio::test]
async fn empty_key_list_never_queries_scores() {
    let source = Arc::new(CountingSource::default());
    let dp = loaded(source.clone(), POLICY);

    let d = dp.evaluate("alice", "wsw-sub", "topic.x").await;
    assert!(d.is_allowed());
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn score_threshold_decides() {
    let low = Arc::new(CountingSource::with(&[("tscp1:risk", 0.2)]));
    let dp = loaded(low.clone(), POLICY);
    assert_eq!(
        dp.evaluate("alice", "wsw-rpc", "adminReset").await,
        Decision::Allowed { policy: "wsw-rpc:^admin".into() }
    );
    assert_eq!(low.calls(), 1);

    let high = Arc::new(CountingSource::with(&[("tscp1:risk", 0.7)]));
    let dp = loaded(high, POLICY);
    assert_eq!(
        dp.evaluate("alice", "wsw-rpc", "adminReset").await,
        Decision::Denied(DenyReason::PolicyRejected { policy: "wsw-rpc:^admin".into() })
    );

    // missing score is nil inside the predicate
    let none = Arc::new(CountingSource::default());
    let dp = loaded(none, POLICY);
    assert!(!dp.evaluate("alice", "wsw-rpc", "adminReset").await.is_allowed());
}

#[tokio::test]
async fn cached_evaluation_runs_once_within_ttl() {
    let source = Arc::new(CountingSource::with(&[("tscp1:risk", 0.2)]));
    let dp = loaded(source.clone(), POLICY);

    assert!(dp.evaluate_cached("alice", "wsw-rpc", "adminReset").await);
    assert!(dp.evaluate_cached("alice", "wsw-rpc", "adminReset").await);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn denials_are_cached_too() {
    let source = Arc::new(CountingSource::with(&[("tscp1:risk", 0.9)]));
    let dp = loaded(source.clone(), POLICY);

    assert!(!dp.evaluate_cached("alice", "wsw-rpc", "adminReset").await);
    assert!(!dp.evaluate_cached("alice", "wsw-rpc", "adminReset").await);
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn zero_ttl_disables_the_cache() {
    let source = Arc::new(CountingSource::with(&[("tscp1:risk", 0.2)]));
    let dp = decision_point(source.clone(), Duration::ZERO);
    dp.reload(POLICY).unwrap();

    dp.evaluate_cached("alice", "wsw-rpc", "adminReset").await;
    dp.evaluate_cached("alice", "wsw-rpc", "adminReset").await;
    assert_eq!(source.calls(), 2);
}

#[tokio::test]
async fn groupless_user_is_denied_everywhere() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    for (rg, res) in [("wsw-sub", "topic.x"), ("wsw-rpc", "adminReset"), ("wsw-event", "zero")] {
        assert_eq!(
            dp.evaluate("mallory", rg, res).await,
            Decision::Denied(DenyReason::UnknownUser)
        );
    }
}

#[tokio::test]
async fn nothing_applicable_is_default_deny() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    // bob is known but only ops may call admin rpcs
    assert_eq!(
        dp.evaluate("bob", "wsw-rpc", "adminReset").await,
        Decision::Denied(DenyReason::NoMatchingPolicy)
    );
    assert_eq!(
        dp.evaluate("alice", "wsw-sub", "other.x").await,
        Decision::Denied(DenyReason::NoMatchingPolicy)
    );
}

#[tokio::test]
async fn numeric_members_are_strings() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    assert!(dp.evaluate("42", "wsw-sub", "topic.x").await.is_allowed());
}

#[tokio::test]
async fn first_fully_applicable_policy_wins() {
    let text = r#"
groups:
  g: [alice]
policies:
  - resource_group: r
    resource: "a.*"
    groups: [g]
    policy: "false"
  - resource_group: r
    resource: "ab"
    groups: [g]
    policy: "true"
"#;
    let dp = loaded(Arc::new(CountingSource::default()), text);
    assert_eq!(
        dp.evaluate("alice", "r", "ab").await,
        Decision::Denied(DenyReason::PolicyRejected { policy: "r:a.*".into() })
    );
}

#[tokio::test]
async fn policy_outside_callers_groups_is_skipped() {
    let text = r#"
groups:
  g: [alice]
  h: [harry]
policies:
  - resource_group: r
    resource: "a.*"
    groups: [g]
    policy: "false"
  - resource_group: r
    resource: "ab"
    groups: [h]
    policy: "true"
"#;
    let dp = loaded(Arc::new(CountingSource::default()), text);
    assert_eq!(
        dp.evaluate("harry", "r", "ab").await,
        Decision::Allowed { policy: "r:ab".into() }
    );
    assert!(!dp.evaluate("alice", "r", "ab").await.is_allowed());
}

#[tokio::test]
async fn pattern_is_a_prefix_match() {
    let text = r#"
groups:
  g: [alice]
policies:
  - resource_group: r
    resource: "^foo"
    groups: [g]
    policy: "true"
"#;
    let dp = loaded(Arc::new(CountingSource::default()), text);
    assert!(dp.evaluate("alice", "r", "foobar").await.is_allowed());
    assert!(dp.evaluate("alice", "r", "foo").await.is_allowed());
    assert!(!dp.evaluate("alice", "r", "barfoo").await.is_allowed());
}

#[tokio::test]
async fn numeric_zero_result_is_a_denial() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    assert_eq!(
        dp.evaluate("bob", "wsw-event", "zero").await,
        Decision::Denied(DenyReason::PolicyRejected { policy: "wsw-event:zero".into() })
    );
}

#[tokio::test]
async fn script_error_fails_closed() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    let d = dp.evaluate("bob", "wsw-event", "boom").await;
    assert!(matches!(d, Decision::EvaluationFailed { ref policy, .. } if policy == "wsw-event:boom"));
    assert!(!d.is_allowed());
    assert!(!dp.evaluate_cached("bob", "wsw-event", "boom").await);
}

#[tokio::test]
async fn unreachable_score_store_fails_closed() {
    let dp = loaded(Arc::new(DownSource), POLICY);
    let d = dp.evaluate("alice", "wsw-rpc", "adminReset").await;
    assert_eq!(d.outcome(), "failed");
    assert!(!dp.evaluate_cached("alice", "wsw-rpc", "adminReset").await);
}

#[tokio::test]
async fn bad_reload_keeps_active_generation() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    assert_eq!(dp.generation(), 1);
    let before = dp.snapshot();

    let bad_pattern = r#"
groups:
  g: [alice]
policies:
  - resource_group: r
    resource: "(unclosed"
    groups: [g]
    policy: "true"
"#;
    let err = dp.reload(bad_pattern).unwrap_err();
    assert_eq!(err.client_code().as_str(), "CONFIG");
    assert_eq!(dp.generation(), 1);
    assert!(Arc::ptr_eq(&before, &dp.snapshot()));
    assert!(dp.evaluate("alice", "wsw-sub", "topic.x").await.is_allowed());

    assert!(dp.reload("policies: [").is_err());
    assert!(dp.reload("groups: {}\npolicies:\n  - resource_group: r\n    resource: x\n    groups: []\n    policy: 'x +'\n").is_err());
    assert_eq!(dp.generation(), 1);
}

#[tokio::test]
async fn reload_swaps_generation_while_snapshots_stay_valid() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    let old = dp.snapshot();

    let generation = dp
        .reload_from(&StaticConfigSource("groups: {}\npolicies: []\n".into()))
        .await
        .unwrap();
    assert_eq!(generation, 2);
    assert_eq!(old.generation(), 1);
    assert_eq!(old.policies().len(), 4);
    assert!(dp.snapshot().policies().is_empty());
    assert_eq!(
        dp.evaluate("alice", "wsw-sub", "topic.x").await,
        Decision::Denied(DenyReason::UnknownUser)
    );
}

#[tokio::test]
async fn reload_leaves_cached_decisions_until_ttl() {
    let dp = loaded(Arc::new(CountingSource::default()), POLICY);
    assert!(dp.evaluate_cached("alice", "wsw-sub", "topic.x").await);

    dp.reload("groups: {}\npolicies: []\n").unwrap();
    assert_eq!(dp.generation(), 2);

    assert!(dp.evaluate_cached("alice", "wsw-sub", "topic.x").await);
    assert_eq!(
        dp.evaluate("alice", "wsw-sub", "topic.x").await,
        Decision::Denied(DenyReason::UnknownUser)
    );
}

#[tokio::test]
async fn scores_are_also_readable_as_dte() {
    let source = Arc::new(CountingSource::with(&[("tscp1:risk", 0.2)]));
    let dp = loaded(
        source,
        r#"
groups:
  ops: [alice]
policies:
  - resource_group: wsw-rpc
    resource: "^admin"
    groups: [ops]
    keys: ["tscp1:risk"]
    policy: 'dte["tscp1:risk"] < 0.5 and scores["tscp1:risk"] == dte["tscp1:risk"]'
"#,
    );
    assert!(dp.evaluate("alice", "wsw-rpc", "adminReset").await.is_allowed());
}

#[test]
fn cache_entries_expire_after_ttl() {
    let cache = DecisionCache::new(Duration::from_secs(10));
    let key = DecisionKey::new("alice", "r", "x");
    let t0 = Instant::now();
    cache.insert_at(key.clone(), true, t0);

    assert_eq!(cache.get_at(&key, t0 + Duration::from_secs(9)), Some(true));
    assert_eq!(cache.get_at(&key, t0 + Duration::from_secs(10)), None);
    assert_eq!(cache.purge_expired_at(t0 + Duration::from_secs(11)), 1);
    assert!(cache.is_empty());
}

#[test]
fn fresh_decision_point_denies_everything() {
    let dp = decision_point(Arc::new(CountingSource::default()), Duration::from_secs(1));
    assert_eq!(dp.generation(), 0);
    let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
    assert_eq!(
        rt.block_on(dp.evaluate("alice", "wsw-sub", "topic.x")),
        Decision::Denied(DenyReason::UnknownUser)
    );
}

#[tokio::test]
async fn watcher_reloads_changed_policy_file() {
    use trustgate_gateway::lifecycle::Shutdown;
    use trustgate_gateway::policy::{spawn_reload_watcher, FileConfigSource};

    let dir = std::env::temp_dir().join(format!("trustgate-policy-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("policy.yaml");
    std::fs::write(&path, "groups: {}\npolicies: []\n").unwrap();

    let dp = Arc::new(decision_point(
        Arc::new(CountingSource::default()),
        Duration::from_secs(10),
    ));
    let source = Arc::new(FileConfigSource::new(&path));
    dp.reload_from(source.as_ref()).await.unwrap();
    assert_eq!(dp.generation(), 1);

    let shutdown = Shutdown::new();
    let task = spawn_reload_watcher(
        dp.clone(),
        source,
        Duration::from_millis(20),
        shutdown.signal(),
    );

    // coarse mtime resolution on some filesystems
    tokio::time::sleep(Duration::from_millis(1100)).await;
    std::fs::write(&path, POLICY).unwrap();

    let reloaded = tokio::time::timeout(Duration::from_secs(5), async {
        while dp.generation() < 2 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(reloaded.is_ok(), "watcher picks up the change");
    assert!(dp.evaluate("alice", "wsw-sub", "topic.x").await.is_allowed());

    shutdown.trigger();
    task.await.unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}

/// In-memory source whose revision is bumped by hand.
struct VersionedSource {
    text: std::sync::Mutex<(u32, String)>,
}

impl VersionedSource {
    fn new(text: &str) -> Self {
        Self {
            text: std::sync::Mutex::new((1, text.to_string())),
        }
    }

    fn publish(&self, text: &str) {
        let mut guard = self.text.lock().unwrap();
        guard.0 += 1;
        guard.1 = text.to_string();
    }
}

#[async_trait]
impl ConfigSource for VersionedSource {
    fn describe(&self) -> String {
        "versioned".to_string()
    }

    async fn load(&self) -> Result<String> {
        Ok(self.text.lock().unwrap().1.clone())
    }

    async fn revision(&self) -> Result<Option<String>> {
        Ok(Some(self.text.lock().unwrap().0.to_string()))
    }
}

#[tokio::test]
async fn watcher_follows_any_revisioned_source() {
    use trustgate_gateway::lifecycle::Shutdown;
    use trustgate_gateway::policy::spawn_reload_watcher;

    let dp = Arc::new(decision_point(
        Arc::new(CountingSource::default()),
        Duration::from_secs(10),
    ));
    let source = Arc::new(VersionedSource::new("groups: {}\npolicies: []\n"));
    dp.reload_from(source.as_ref()).await.unwrap();

    let shutdown = Shutdown::new();
    let task = spawn_reload_watcher(
        dp.clone(),
        source.clone(),
        Duration::from_millis(10),
        shutdown.signal(),
    );

    source.publish(POLICY);
    let reloaded = tokio::time::timeout(Duration::from_secs(5), async {
        while dp.generation() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reloaded.is_ok(), "watcher picks up the new revision");
    assert!(dp.evaluate("alice", "wsw-sub", "topic.x").await.is_allowed());

    // unchanged revision: no further reloads
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(dp.generation(), 2);

    shutdown.trigger();
    task.await.unwrap();
}

#[tokio::test]
async fn static_source_is_never_reloaded_by_the_watcher() {
    use trustgate_gateway::lifecycle::Shutdown;
    use trustgate_gateway::policy::spawn_reload_watcher;

    let dp = Arc::new(decision_point(
        Arc::new(CountingSource::default()),
        Duration::from_secs(10),
    ));
    let source = Arc::new(StaticConfigSource(POLICY.to_string()));
    dp.reload_from(source.as_ref()).await.unwrap();

    let shutdown = Shutdown::new();
    let task = spawn_reload_watcher(dp.clone(), source, Duration::from_millis(10), shutdown.signal());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(dp.generation(), 1);

    shutdown.trigger();
    task.await.unwrap();
}
