#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use trustgate_gateway::lifecycle::Shutdown;
use trustgate_gateway::provider::{run_push_loop, FileProvider, ProviderFeed};
use trustgate_gateway::scores::{AgeThresholds, ScoreStore};
use trustgate_gateway::script::ScriptRuntime;

const FEED: &str = r#"
scores:
  alice:
    device_trust: 0.8
    mfa: true
  1001:
    device_trust: "0.25"
mapping:
  risk: "device_trust * 0.5"
"#;

fn keys(ks: &[&str]) -> Vec<String> {
    ks.iter().map(|k| k.to_string()).collect()
}

#[test]
fn feed_is_canonicalized() {
    let feed = ProviderFeed::parse("tscp1", FEED).unwrap();
    assert_eq!(feed.name(), "tscp1");
    assert_eq!(feed.scores()["alice"]["mfa"], 1.0);
    assert_eq!(feed.scores()["1001"]["device_trust"], 0.25);
    assert_eq!(feed.mapping().unwrap()["risk"], "device_trust * 0.5");

    let update = feed.to_update();
    assert_eq!(update.name, "tscp1");
    assert_eq!(update.scores.len(), 2);
}

#[test]
fn lookup_returns_known_keys_only() {
    let feed = ProviderFeed::parse("tscp1", FEED).unwrap();
    let got = feed.get("alice", &keys(&["device_trust", "nope"]));
    assert_eq!(got.len(), 1);
    assert_eq!(got["device_trust"], 0.8);
    assert!(feed.get("nobody", &keys(&["device_trust"])).is_empty());
}

#[test]
fn non_numeric_values_are_rejected() {
    let bad = "scores:\n  alice:\n    device_trust: high\n";
    let err = ProviderFeed::parse("tscp1", bad).unwrap_err();
    assert_eq!(err.client_code().as_str(), "CONFIG");
    assert!(ProviderFeed::parse("tscp1", "mapping: {}\n").is_err());
}

#[tokio::test]
async fn push_loop_onramps_and_pushes() {
    let dir = std::env::temp_dir().join(format!("trustgate-feed-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("scores.yaml");
    std::fs::write(&path, FEED).unwrap();

    let provider = Arc::new(FileProvider::open("tscp1", &path).await.unwrap());
    let store = Arc::new(ScoreStore::new(ScriptRuntime::default(), AgeThresholds::default()));
    let shutdown = Shutdown::new();

    let task = run_push_loop(
        provider,
        store.clone(),
        Duration::from_secs(3600),
        shutdown.signal(),
    );

    let pushed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if store.entry("tscp1", "alice", "risk").is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(pushed.is_ok(), "first push happens immediately");
    assert_eq!(store.provider_names(), vec!["tscp1".to_string()]);
    assert_eq!(store.entry("tscp1", "alice", "risk").unwrap().value, 0.4);
    assert_eq!(store.entry("tscp1", "1001", "risk").unwrap().value, 0.125);

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("loop stops on shutdown")
        .unwrap();
    let _ = std::fs::remove_dir_all(&dir);
}
