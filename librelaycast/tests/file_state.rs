//! Relay runs persisting through real state files

use librelaycast::mock::{MockSink, MockSource};
use librelaycast::state::StateKey;
use librelaycast::{Account, FileStore, Post, Relay, RunLock, RunOptions};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn accounts() -> Vec<Account> {
    vec![Account::new("acme", "10"), Account::new("globex", "20")]
}

/// A fresh relay over the same directory, as a new cron invocation would build
fn relay(dir: &TempDir, source: &MockSource, sink: &MockSink) -> Relay {
    Relay::new(
        accounts(),
        Arc::new(FileStore::new(dir.path())),
        Box::new(source.clone()),
        Box::new(sink.clone()),
    )
}

#[tokio::test]
async fn test_state_survives_between_invocations() {
    let dir = TempDir::new().unwrap();
    let source = MockSource::new();
    source.add_posts("acme", vec![Post::new("t1", "hello", "acme")]);
    let sink = MockSink::new();

    let first = relay(&dir, &source, &sink).run(RunOptions::default()).await;
    assert_eq!(first.polled, vec!["acme"]);
    assert_eq!(first.processed_count, 1);

    let store = FileStore::new(dir.path());
    assert_eq!(
        fs::read_to_string(store.path_for(StateKey::ProcessedPosts)).unwrap(),
        r#"{"acme":["t1"]}"#
    );
    assert_eq!(
        fs::read_to_string(store.path_for(StateKey::RotationCursor)).unwrap(),
        "acme"
    );

    // Next invocation rotates to globex, which has nothing new
    let second = relay(&dir, &source, &sink).run(RunOptions::default()).await;
    assert_eq!(second.polled, vec!["globex"]);
    assert_eq!(second.processed_count, 0);

    // And back to acme, whose post is already recorded
    let third = relay(&dir, &source, &sink).run(RunOptions::default()).await;
    assert_eq!(third.polled, vec!["acme"]);
    assert_eq!(third.processed_count, 0);

    assert_eq!(sink.calls().len(), 1);
}

#[tokio::test]
async fn test_corrupt_processed_file_is_replaced() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::new(dir.path());
    fs::write(store.path_for(StateKey::ProcessedPosts), "[oops").unwrap();

    let source = MockSource::new();
    source.add_posts("globex", vec![Post::new("g1", "hi", "globex")]);
    let sink = MockSink::new();

    let report = relay(&dir, &source, &sink)
        .run(RunOptions {
            force_all: true,
            dry_run: false,
        })
        .await;

    assert_eq!(report.processed_count, 1);
    assert_eq!(
        fs::read_to_string(store.path_for(StateKey::ProcessedPosts)).unwrap(),
        r#"{"globex":["g1"]}"#
    );
}

#[tokio::test]
async fn test_run_under_lock() {
    let dir = TempDir::new().unwrap();
    let source = MockSource::new();
    let sink = MockSink::new();

    let lock = RunLock::try_acquire(dir.path()).unwrap().unwrap();
    let report = relay(&dir, &source, &sink).run(RunOptions::default()).await;
    drop(lock);

    assert_eq!(report.polled, vec!["acme"]);
    assert!(dir.path().join(RunLock::FILE_NAME).exists());
}
