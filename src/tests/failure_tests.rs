//! Error propagation out of a run

use anyhow::Result;
use pretty_assertions::assert_eq;

use super::common::*;
use crate::client::StreamsClientError;
use crate::test::mocks::Call;
use crate::{ConsumerError, RecordBatch, ShardDescriptor, ShardProgress};

#[tokio::test]
async fn test_record_handler_error_stops_shard() -> Result<()> {
    let ctx = TestContext::new();
    ctx.client.set_shards(vec![ShardDescriptor::new("A")]);
    ctx.client.script_shard("A", &[&["1", "2", "3"]], true);
    ctx.records.fail_on("2");

    let consumer = ctx.consumer(None);
    let err = run_bounded(&consumer, None).await.unwrap_err();

    match err {
        ConsumerError::RecordHandler {
            shard_id,
            sequence_number,
            ..
        } => {
            assert_eq!(shard_id, "A");
            assert_eq!(sequence_number, "2");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // 2 was attempted but never checkpointed, 3 never attempted
    assert_eq!(ctx.log.delivered(), vec!["1", "2"]);
    assert_eq!(
        ctx.log.statuses("A"),
        vec![ShardProgress::New, ShardProgress::At("1".to_string())]
    );
    assert_eq!(
        consumer.progress().get("A"),
        Some(&ShardProgress::At("1".to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn test_status_handler_error_stops_shard() -> Result<()> {
    let ctx = TestContext::new();
    ctx.client.set_shards(vec![ShardDescriptor::new("A")]);
    ctx.client.script_shard("A", &[&["1", "2", "3"]], true);
    ctx.statuses.fail_on("A", ShardProgress::At("2".to_string()));

    let consumer = ctx.consumer(None);
    let err = run_bounded(&consumer, None).await.unwrap_err();

    assert!(
        matches!(&err, ConsumerError::StatusHandler { shard_id, status, .. }
            if shard_id == "A" && *status == ShardProgress::At("2".to_string())),
        "unexpected error: {err:?}"
    );
    assert_eq!(ctx.log.delivered(), vec!["1", "2"]);
    Ok(())
}

#[tokio::test]
async fn test_get_records_failure_fails_run() -> Result<()> {
    let ctx = TestContext::new();
    ctx.client.set_shards(vec![ShardDescriptor::new("A")]);
    ctx.client.mock_iterator("A", Ok("A-it-0".to_string()));
    ctx.client
        .mock_records("A-it-0", Err(StreamsClientError::ExpiredIterator));

    let consumer = ctx.consumer(None);
    let err = run_bounded(&consumer, None).await.unwrap_err();

    assert!(err.is_wire_error());
    assert!(matches!(
        err,
        ConsumerError::GetRecordsFailed {
            ref shard_id,
            source: StreamsClientError::ExpiredIterator,
        } if shard_id == "A"
    ));
    // failures are not retried
    assert_eq!(ctx.log.count(|c| matches!(c, Call::GetRecords { .. })), 1);
    Ok(())
}

#[tokio::test]
async fn test_malformed_response_fails_run() -> Result<()> {
    let ctx = TestContext::new();
    ctx.client.set_shards(vec![ShardDescriptor::new("A")]);
    ctx.client
        .mock_iterator("A", Err(StreamsClientError::MissingField("ShardIterator")));

    let consumer = ctx.consumer(None);
    let err = run_bounded(&consumer, None).await.unwrap_err();

    assert!(matches!(err, ConsumerError::MalformedResponse("ShardIterator")));
    Ok(())
}

#[tokio::test]
async fn test_list_shards_failure_fails_run() -> Result<()> {
    let ctx = TestContext::new();
    ctx.client.fail_list_shards(StreamsClientError::LimitExceeded);

    let consumer = ctx.consumer(None);
    let err = run_bounded(&consumer, None).await.unwrap_err();

    assert!(matches!(
        err,
        ConsumerError::ListShardsFailed(StreamsClientError::LimitExceeded)
    ));
    assert!(consumer.progress().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failure_stops_open_siblings() -> Result<()> {
    let ctx = TestContext::new();
    ctx.client.set_shards(vec![
        ShardDescriptor::new("broken"),
        ShardDescriptor::new("idle"),
    ]);
    // "idle" is never scripted: it stays open with empty batches forever
    ctx.client.mock_iterator("broken", Ok("broken-it-0".to_string()));
    ctx.client.mock_records(
        "broken-it-0",
        Ok(RecordBatch::new(vec![], Some("broken-it-1".to_string()))),
    );
    ctx.client.mock_records(
        "broken-it-1",
        Err(StreamsClientError::InternalServerError("boom".to_string())),
    );

    let consumer = ctx.consumer(None);
    let err = run_bounded(&consumer, None).await.unwrap_err();

    assert!(matches!(err, ConsumerError::GetRecordsFailed { .. }));
    assert_eq!(consumer.progress().get("idle"), Some(&ShardProgress::New));
    Ok(())
}
