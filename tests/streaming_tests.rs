//! Throttle properties of the streaming updater, under a paused clock.

mod common;

use std::time::Duration;

use common::{ChunkStep, DeliveryCall, RecordingDelivery, ScriptedEngine};
use lore::core::models::{ChannelType, Job};
use lore::engine::KEEPALIVE_TEXT;
use lore::errors::BotError;
use lore::worker::streaming::{
    INCOMPLETE_NOTICE, StreamingOutcome, StreamingSettings, run_streaming,
};

fn streaming_job() -> Job {
    Job {
        question_text: "What is X?".to_string(),
        channel_id: Some("C1".to_string()),
        response_url: None,
        thread_ts: None,
        channel_type: ChannelType::Channel,
        placeholder_ts: Some("200.2".to_string()),
        event_ts: Some("100.1".to_string()),
        use_streaming: true,
    }
}

fn settings() -> StreamingSettings {
    StreamingSettings {
        update_interval: Duration::from_millis(2000),
        final_flush: Duration::from_millis(1000),
    }
}

fn snapshots(n: usize) -> Vec<ChunkStep> {
    // Growing content snapshots: "part 1", "part 1 part 2", ...
    let mut content = String::new();
    (1..=n)
        .map(|i| {
            if !content.is_empty() {
                content.push(' ');
            }
            content.push_str(&format!("part {i}"));
            ChunkStep::Snapshot(content.clone())
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn updates_are_bounded_by_the_throttle_interval() {
    // 10 chunks at 500 ms: total duration 5000 ms, so at most
    // ceil(5000 / 2000) + 1 = 4 update calls including the final flush.
    let engine = ScriptedEngine::streaming(snapshots(10), Duration::from_millis(500));
    let delivery = RecordingDelivery::new();
    let job = streaming_job();

    let outcome = run_streaming(&delivery, &engine, &job, settings())
        .await
        .unwrap();

    assert_eq!(outcome, StreamingOutcome::Completed);
    let updates = delivery.updates();
    assert!(
        updates.len() <= 4,
        "expected at most 4 updates, saw {}",
        updates.len()
    );

    // The final content always lands, whatever the throttle dropped.
    let DeliveryCall::Update { text, .. } = updates.last().unwrap() else {
        panic!("expected an update call");
    };
    assert_eq!(text, "part 1 part 2 part 3 part 4 part 5 part 6 part 7 part 8 part 9 part 10");
}

#[tokio::test(start_paused = true)]
async fn final_flush_waits_out_the_smaller_window() {
    let engine = ScriptedEngine::streaming(snapshots(2), Duration::ZERO);
    let delivery = RecordingDelivery::new();
    let job = streaming_job();

    let outcome = run_streaming(&delivery, &engine, &job, settings())
        .await
        .unwrap();

    assert_eq!(outcome, StreamingOutcome::Completed);
    let updates = delivery.updates();
    assert_eq!(updates.len(), 2);
    let DeliveryCall::Update { text, .. } = updates.last().unwrap() else {
        panic!("expected an update call");
    };
    assert_eq!(text, "part 1 part 2");
}

#[tokio::test(start_paused = true)]
async fn keepalive_snapshots_are_never_delivered() {
    let engine = ScriptedEngine::streaming(
        vec![
            ChunkStep::Snapshot(KEEPALIVE_TEXT.to_string()),
            ChunkStep::Snapshot(String::new()),
            ChunkStep::Snapshot("real content".to_string()),
        ],
        Duration::ZERO,
    );
    let delivery = RecordingDelivery::new();
    let job = streaming_job();

    run_streaming(&delivery, &engine, &job, settings())
        .await
        .unwrap();

    for call in delivery.updates() {
        let DeliveryCall::Update { text, .. } = call else {
            continue;
        };
        assert_ne!(text, KEEPALIVE_TEXT);
        assert!(!text.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn mid_stream_failure_delivers_partial_content_with_notice() {
    let engine = ScriptedEngine::streaming(
        vec![
            ChunkStep::Snapshot("the answer begins".to_string()),
            ChunkStep::Fail("engine connection reset".to_string()),
        ],
        Duration::ZERO,
    );
    let delivery = RecordingDelivery::new();
    let job = streaming_job();

    let outcome = run_streaming(&delivery, &engine, &job, settings())
        .await
        .unwrap();

    let StreamingOutcome::Partial { error } = outcome else {
        panic!("expected partial outcome");
    };
    assert!(error.contains("engine connection reset"));

    let updates = delivery.updates();
    let DeliveryCall::Update { text, .. } = updates.last().unwrap() else {
        panic!("expected an update call");
    };
    assert_eq!(text, &format!("the answer begins\n\n{INCOMPLETE_NOTICE}"));
}

#[tokio::test(start_paused = true)]
async fn failure_before_any_content_surfaces_the_error() {
    let engine = ScriptedEngine::streaming(
        vec![ChunkStep::Fail("engine unavailable".to_string())],
        Duration::ZERO,
    );
    let delivery = RecordingDelivery::new();
    let job = streaming_job();

    let result = run_streaming(&delivery, &engine, &job, settings()).await;

    assert!(matches!(result, Err(BotError::Generation(_))));
    assert!(delivery.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn empty_stream_is_a_generation_error() {
    let engine = ScriptedEngine::streaming(Vec::new(), Duration::ZERO);
    let delivery = RecordingDelivery::new();
    let job = streaming_job();

    let result = run_streaming(&delivery, &engine, &job, settings()).await;

    assert!(matches!(result, Err(BotError::Generation(_))));
    assert!(delivery.calls().is_empty());
}
