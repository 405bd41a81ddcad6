mod common;

use anyhow::Result;
use common::{create_test_config, init_logging, CollectingHandler, FixtureStream};
use go_zoom_dynamo_streams::{
    CheckpointStore, ConsumerError, InMemoryCheckpointStore, IteratorPosition,
    JsonFileCheckpointStore, ShardDescriptor, ShardProgress, StoreStatusHandler, StreamConsumer,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tempfile::TempDir;

const RUN_TIMEOUT: Duration = Duration::from_secs(5);

fn order_stream() -> FixtureStream {
    let stream = FixtureStream::new();
    stream.add_shard(ShardDescriptor::new("A"), &["100", "101"]);
    stream.add_shard(ShardDescriptor::with_parent("B", "A"), &["200", "201", "202"]);
    stream
}

#[tokio::test]
async fn test_restart_from_file_snapshot() -> Result<()> {
    init_logging();
    let dir = TempDir::new()?;
    let path = dir.path().join("shards.json");
    let stream = order_stream();

    // first run dies on a poison record in the child shard
    let poisoned = CollectingHandler::new();
    poisoned.fail_on("B", "201");
    let (mut consumer, _) = StreamConsumer::new(create_test_config(), stream.clone(), None);
    consumer.set_record_handler(poisoned.clone());
    consumer.set_status_handler(StoreStatusHandler::new(JsonFileCheckpointStore::new(&path)));

    let err = tokio::time::timeout(RUN_TIMEOUT, consumer.run(None))
        .await?
        .unwrap_err();
    assert!(matches!(err, ConsumerError::RecordHandler { .. }));
    assert_eq!(poisoned.sequences(), vec!["100", "101", "200"]);

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw, serde_json::json!({"A": "closed", "B": "200"}));

    // second run resumes from the file without re-delivering anything
    let store = JsonFileCheckpointStore::new(&path);
    let prior = store.load_snapshot().await?;
    let resumed_stream = order_stream();
    let handler = CollectingHandler::new();
    let (mut consumer, _) = StreamConsumer::new(create_test_config(), resumed_stream.clone(), Some(prior));
    consumer.set_record_handler(handler.clone());
    consumer.set_status_handler(StoreStatusHandler::new(store));

    tokio::time::timeout(RUN_TIMEOUT, consumer.run(None)).await??;

    assert_eq!(handler.sequences(), vec!["201", "202"]);
    assert_eq!(
        resumed_stream.iterator_requests(),
        vec![(
            "B".to_string(),
            IteratorPosition::AfterSequenceNumber("200".to_string())
        )]
    );

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(raw, serde_json::json!({"A": "closed", "B": "closed"}));
    Ok(())
}

#[tokio::test]
async fn test_progress_matches_persisted_layout() -> Result<()> {
    init_logging();
    let stream = FixtureStream::new();
    stream.add_shard(ShardDescriptor::new("root"), &["1"]);
    stream.add_shard(ShardDescriptor::with_parent("left", "root"), &["2", "3"]);
    stream.add_shard(ShardDescriptor::with_parent("right", "root"), &["4"]);
    stream.add_shard(ShardDescriptor::with_parent("leaf", "left"), &[]);

    let store = InMemoryCheckpointStore::new();
    let handler = CollectingHandler::new();
    let (mut consumer, _) = StreamConsumer::new(create_test_config(), stream, None);
    consumer.set_record_handler(handler.clone());
    consumer.set_status_handler(StoreStatusHandler::new(store.clone()));

    tokio::time::timeout(RUN_TIMEOUT, consumer.run(None)).await??;

    let progress = consumer.progress();
    assert_eq!(progress, store.load_snapshot().await?);
    assert_eq!(
        serde_json::to_value(&progress)?,
        serde_json::json!({"root": "closed", "left": "closed", "right": "closed", "leaf": "closed"})
    );

    let seen = handler.seen();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0], ("root".to_string(), "1".to_string()));
    let left: Vec<_> = seen.iter().filter(|(s, _)| s == "left").map(|(_, q)| q.as_str()).collect();
    assert_eq!(left, vec!["2", "3"]);
    Ok(())
}

#[tokio::test]
async fn test_deadline_run_is_resumable() -> Result<()> {
    init_logging();
    let stream = FixtureStream::new();
    stream.add_shard(ShardDescriptor::new("A"), &["1", "2", "3", "4", "5"]);

    let mut config = create_test_config();
    config.busy_poll_delay = Duration::from_millis(40);

    let (consumer, _) = StreamConsumer::new(config, stream.clone(), None);
    tokio::time::timeout(RUN_TIMEOUT, consumer.run_for(Duration::from_millis(60))).await??;

    let progress = consumer.progress();
    match progress.get("A") {
        Some(ShardProgress::At(seq)) => assert!(seq.parse::<u64>()? < 5, "stopped at {seq}"),
        other => panic!("expected a resumable position, got {other:?}"),
    }

    let (consumer, _) = StreamConsumer::new(create_test_config(), stream, Some(progress));
    tokio::time::timeout(RUN_TIMEOUT, consumer.run(None)).await??;
    assert_eq!(consumer.progress().get("A"), Some(&ShardProgress::Closed));
    Ok(())
}
