use super::*;
use async_trait::async_trait;
use shared_types::{CompletionStatus, StreamEvent, StreamFrame, StreamState, ToolStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Default)]
struct RecordingTransport {
    frames: Mutex<Vec<StreamFrame>>,
    closes: AtomicUsize,
    fail_at_seq: Option<u64>,
    stall: Option<Duration>,
}

impl RecordingTransport {
    fn failing_at(seq: u64) -> Self {
        Self {
            fail_at_seq: Some(seq),
            ..Default::default()
        }
    }

    fn stalling(delay: Duration) -> Self {
        Self {
            stall: Some(delay),
            ..Default::default()
        }
    }

    fn kinds(&self) -> Vec<&'static str> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.event.kind())
            .collect()
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamTransport for RecordingTransport {
    async fn send(&self, frame: &StreamFrame) -> StreamResult<()> {
        if let Some(delay) = self.stall {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at_seq == Some(frame.seq) {
            return Err(StreamError::transport("connection reset"));
        }
        self.frames.lock().unwrap().push(frame.clone());
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn settings() -> StreamSettings {
    StreamSettings {
        close_grace: Duration::from_secs(5),
        write_timeout: Duration::from_secs(10),
        orphan_threshold: Duration::from_secs(1800),
    }
}

fn open(manager: &StreamManager, job_id: &str) -> (Arc<RecordingTransport>, Arc<StreamOutputAdapter>) {
    let transport = Arc::new(RecordingTransport::default());
    let adapter = manager.open(job_id, transport.clone()).unwrap();
    (transport, adapter)
}

#[tokio::test(start_paused = true)]
async fn test_completion_flushes_before_stream_end_then_closes_once() {
    let manager = StreamManager::new(settings());
    let (transport, adapter) = open(&manager, "j1");

    manager.emit("j1", StreamEvent::text("Hello")).unwrap();
    manager.emit("j1", StreamEvent::text(" world")).unwrap();
    manager.emit("j1", StreamEvent::completion("done")).unwrap();
    assert_eq!(adapter.state(), StreamState::Draining);

    manager.acknowledge_end("j1").unwrap();
    adapter.closed().await;

    assert_eq!(
        transport.kinds(),
        vec!["text", "text", "completion", "stream_end"]
    );
    assert_eq!(transport.closes(), 1);
    assert_eq!(adapter.state(), StreamState::Closed);

    let frames = transport.frames.lock().unwrap().clone();
    let seqs: Vec<u64> = frames.iter().map(|f| f.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3, 4]);
    assert_eq!(frames[3].event, StreamEvent::StreamEnd { delivered: 3 });
}

#[tokio::test(start_paused = true)]
async fn test_fallback_timer_closes_without_acknowledgement() {
    let manager = StreamManager::new(settings());
    let (transport, adapter) = open(&manager, "j1");

    manager
        .complete("j1", CompletionStatus::Succeeded, "done".to_string())
        .unwrap();
    let started = Instant::now();
    adapter.closed().await;

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(transport.kinds(), vec!["completion", "stream_end"]);
    assert_eq!(transport.closes(), 1);

    // A late acknowledgement is harmless and adds nothing
    manager.acknowledge_end("j1").unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(transport.kinds().len(), 2);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_second_open_for_active_job_conflicts() {
    let manager = StreamManager::new(settings());
    let (_transport, _adapter) = open(&manager, "j1");

    let err = manager
        .open("j1", Arc::new(RecordingTransport::default()))
        .err()
        .unwrap();
    assert_eq!(err, StreamError::conflict("j1"));

    // Other jobs are independent
    assert!(manager
        .open("j2", Arc::new(RecordingTransport::default()))
        .is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_job_can_reopen_after_close() {
    let manager = StreamManager::new(settings());
    let (_transport, first) = open(&manager, "j1");

    manager.cancel("j1").await.unwrap();
    assert_eq!(first.state(), StreamState::Closed);

    let (_transport, second) = open(&manager, "j1");
    assert_ne!(first.stream_id(), second.stream_id());
    assert!(manager.is_active("j1"));
}

#[tokio::test(start_paused = true)]
async fn test_early_close_flushes_queued_frames_first() {
    let manager = StreamManager::new(settings());
    let (transport, _adapter) = open(&manager, "j1");

    for i in 0..3 {
        manager
            .emit("j1", StreamEvent::text(format!("chunk {i}")))
            .unwrap();
    }
    let summary = manager.close("j1").await.unwrap();

    assert_eq!(transport.kinds(), vec!["text", "text", "text", "stream_end"]);
    assert_eq!(transport.closes(), 1);
    assert_eq!(summary.state, StreamState::Closed);
    assert_eq!(summary.events_queued, 4);
    assert_eq!(summary.events_flushed, 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_does_not_wait_for_fallback_timer() {
    let manager = StreamManager::new(settings());
    let (transport, _adapter) = open(&manager, "j1");
    manager
        .emit(
            "j1",
            StreamEvent::Tool {
                name: "bash".to_string(),
                status: ToolStatus::Started,
                detail: None,
            },
        )
        .unwrap();

    let started = Instant::now();
    manager.cancel("j1").await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(transport.kinds(), vec!["tool", "stream_end"]);
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn test_write_failure_forces_close() {
    let manager = StreamManager::new(settings());
    let transport = Arc::new(RecordingTransport::failing_at(2));
    let adapter = manager.open("j1", transport.clone()).unwrap();

    manager.emit("j1", StreamEvent::text("one")).unwrap();
    manager.emit("j1", StreamEvent::text("two")).unwrap();
    adapter.closed().await;

    assert_eq!(transport.kinds(), vec!["text"]);
    assert_eq!(transport.closes(), 1);

    let report = manager.health_check();
    assert_eq!(report.flush_failures, 1);
    assert!(report.active.is_empty());
    let closed = &report.recently_closed[0];
    assert_eq!(closed.job_id, "j1");
    assert!(closed
        .last_error
        .as_deref()
        .unwrap()
        .contains("connection reset"));

    let err = manager.emit("j1", StreamEvent::text("three")).unwrap_err();
    assert!(matches!(err, StreamError::Closed { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_stalled_write_times_out() {
    let manager = StreamManager::new(settings());
    let transport = Arc::new(RecordingTransport::stalling(Duration::from_secs(3600)));
    let adapter = manager.open("j1", transport.clone()).unwrap();

    manager.emit("j1", StreamEvent::text("stuck")).unwrap();
    adapter.closed().await;

    assert_eq!(transport.closes(), 1);
    let summary = adapter.summary(Duration::from_secs(1800));
    assert!(summary.last_error.unwrap().contains("timed out"));
    assert_eq!(summary.events_flushed, 0);
}

#[tokio::test]
async fn test_events_after_end_are_rejected() {
    let manager = StreamManager::new(settings());
    let (_transport, _adapter) = open(&manager, "j1");

    let err = manager
        .emit("j1", StreamEvent::StreamEnd { delivered: 0 })
        .unwrap_err();
    assert!(matches!(err, StreamError::InvalidEvent { .. }));

    manager.emit("j1", StreamEvent::completion("done")).unwrap();
    let err = manager.emit("j1", StreamEvent::text("late")).unwrap_err();
    assert_eq!(
        err,
        StreamError::EndSignaled {
            job_id: "j1".to_string()
        }
    );
    assert!(manager.emit("j1", StreamEvent::completion("again")).is_err());
}

#[tokio::test]
async fn test_acknowledge_requires_stream_end() {
    let manager = StreamManager::new(settings());
    let (_transport, _adapter) = open(&manager, "j1");

    assert!(matches!(
        manager.acknowledge_end("j1"),
        Err(StreamError::NotDraining { .. })
    ));
    assert!(matches!(
        manager.acknowledge_end("missing"),
        Err(StreamError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_health_check_flags_orphans() {
    let manager = StreamManager::new(settings());
    let (_transport, _adapter) = open(&manager, "old");

    tokio::time::advance(Duration::from_secs(1801)).await;
    let (_transport, _adapter) = open(&manager, "fresh");
    manager.emit("fresh", StreamEvent::text("hi")).unwrap();

    let report = manager.health_check();
    assert_eq!(report.active.len(), 2);
    assert_eq!(report.orphaned, 1);
    let old = report.active.iter().find(|s| s.job_id == "old").unwrap();
    assert!(old.orphaned);
    assert!(old.duration_ms >= 1_801_000);
    let fresh = report.active.iter().find(|s| s.job_id == "fresh").unwrap();
    assert!(!fresh.orphaned);
    assert_eq!(fresh.events_queued, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sse_consumer_leaving_after_end_closes_early() {
    let manager = StreamManager::new(settings());
    let transport = Arc::new(SseTransport::new(8));
    let mut consumer = transport.subscribe();
    let adapter = manager.open("j1", transport.clone()).unwrap();

    manager.emit("j1", StreamEvent::completion("done")).unwrap();

    let mut seen = Vec::new();
    while let Some(chunk) = consumer.recv().await {
        let text = String::from_utf8_lossy(&chunk).to_string();
        let end = text.contains(r#""type":"stream_end""#);
        seen.push(text);
        if end {
            break;
        }
    }
    drop(consumer);

    let started = Instant::now();
    adapter.closed().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(seen.len(), 2);
    assert!(seen[0].contains(r#""type":"completion""#));
}

#[tokio::test(start_paused = true)]
async fn test_reset_cancels_all_streams() {
    let manager = StreamManager::new(settings());
    let (first, a) = open(&manager, "a");
    let (second, b) = open(&manager, "b");

    manager.reset().await;

    assert_eq!(a.state(), StreamState::Closed);
    assert_eq!(b.state(), StreamState::Closed);
    assert_eq!(first.closes(), 1);
    assert_eq!(second.closes(), 1);
    assert!(manager.get("a").is_none());
    assert!(manager.health_check().recently_closed.is_empty());
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let manager = StreamManager::new(settings());
    assert_eq!(
        manager.emit("nope", StreamEvent::text("x")).unwrap_err(),
        StreamError::not_found("nope")
    );
    assert!(manager.close("nope").await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_reconnecting_consumer_joins_running_stream() {
    let manager = StreamManager::new(settings());
    let transport = Arc::new(SseTransport::new(8));
    let first = transport.subscribe();
    let adapter = manager.open("j1", transport.clone()).unwrap();

    // The first consumer goes away while the job is still running
    drop(first);
    manager.emit("j1", StreamEvent::text("missed")).unwrap();
    while adapter.summary(settings().orphan_threshold).events_flushed < 1 {
        tokio::task::yield_now().await;
    }
    assert_eq!(adapter.state(), StreamState::Open);

    let (attached, mut second) = manager.attach("j1").unwrap().unwrap();
    assert_eq!(attached.stream_id(), adapter.stream_id());
    assert_eq!(transport.subscriber_count(), 1);

    manager.emit("j1", StreamEvent::text("seen")).unwrap();
    manager.emit("j1", StreamEvent::completion("done")).unwrap();
    manager.acknowledge_end("j1").unwrap();

    let mut seen = Vec::new();
    while let Some(chunk) = second.recv().await {
        seen.push(String::from_utf8_lossy(&chunk).to_string());
    }
    adapter.closed().await;

    assert_eq!(seen.len(), 3);
    assert!(seen[0].contains(r#""content":"seen""#));
    assert!(seen[2].contains(r#""type":"stream_end""#));
}

#[tokio::test(start_paused = true)]
async fn test_attach_requires_an_open_shareable_stream() {
    let manager = StreamManager::new(settings());
    assert!(manager.attach("j1").unwrap().is_none());

    // A single peer transport cannot take a second consumer
    let (_transport, _adapter) = open(&manager, "j1");
    assert_eq!(
        manager.attach("j1").unwrap_err(),
        StreamError::conflict("j1")
    );

    let transport = Arc::new(SseTransport::new(8));
    let _consumer = transport.subscribe();
    let adapter = manager.open("j2", transport).unwrap();
    manager.emit("j2", StreamEvent::completion("done")).unwrap();
    assert_eq!(
        manager.attach("j2").unwrap_err(),
        StreamError::conflict("j2")
    );

    manager.cancel("j2").await.unwrap();
    assert_eq!(adapter.state(), StreamState::Closed);
    assert!(manager.attach("j2").unwrap().is_none());
}
