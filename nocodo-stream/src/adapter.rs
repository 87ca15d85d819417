use crate::error::{StreamError, StreamResult};
use crate::health::HealthLedger;
use crate::transport::StreamTransport;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use shared_types::{CompletionStatus, StreamEvent, StreamFrame, StreamState, StreamSummary};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Fallback timer between the stream_end flush and a forced transport close
    pub close_grace: Duration,
    /// Upper bound for one transport write
    pub write_timeout: Duration,
    /// Active streams older than this are flagged as orphaned
    pub orphan_threshold: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            close_grace: Duration::from_millis(5000),
            write_timeout: Duration::from_millis(10_000),
            orphan_threshold: Duration::from_secs(1800),
        }
    }
}

struct StreamInner {
    state: StreamState,
    queue: VecDeque<StreamFrame>,
    next_seq: u64,
    end_signaled: bool,
    cancelled: bool,
    queued: u64,
    flushed: u64,
    last_error: Option<String>,
    lifetime: Option<Duration>,
}

/// Serializes one job's output into an ordered push-stream.
///
/// A single writer task owns the transport. Frames go out in enqueue order,
/// `stream_end` is always the last one, and the transport is closed exactly
/// once: after the consumer acknowledges the end, after every consumer left,
/// after the fallback timer, on cancel, or on a failed write.
pub struct StreamOutputAdapter {
    stream_id: String,
    job_id: String,
    opened_at: DateTime<Utc>,
    started: Instant,
    inner: Mutex<StreamInner>,
    wake: Notify,
    release: Notify,
    state: watch::Sender<StreamState>,
    transport: Arc<dyn StreamTransport>,
    health: Arc<HealthLedger>,
}

impl std::fmt::Debug for StreamOutputAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamOutputAdapter")
            .field("stream_id", &self.stream_id)
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl StreamOutputAdapter {
    /// Open a stream on `transport` and spawn its writer
    pub fn start(
        job_id: &str,
        transport: Arc<dyn StreamTransport>,
        settings: StreamSettings,
        health: Arc<HealthLedger>,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(StreamState::Open);
        let adapter = Arc::new(Self {
            stream_id: uuid::Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            opened_at: Utc::now(),
            started: Instant::now(),
            inner: Mutex::new(StreamInner {
                state: StreamState::Open,
                queue: VecDeque::new(),
                next_seq: 0,
                end_signaled: false,
                cancelled: false,
                queued: 0,
                flushed: 0,
                last_error: None,
                lifetime: None,
            }),
            wake: Notify::new(),
            release: Notify::new(),
            state,
            transport: transport.clone(),
            health,
        });

        info!(stream_id = %adapter.stream_id, job_id = %job_id, "Stream opened");
        tokio::spawn(adapter.clone().run(transport, settings));
        adapter
    }

    fn lock(&self) -> MutexGuard<'_, StreamInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> StreamState {
        self.lock().state
    }

    /// Add a consumer to the running stream. It sees frames written from now on.
    pub fn attach(&self) -> StreamResult<mpsc::Receiver<Bytes>> {
        let inner = self.lock();
        self.check_accepting(&inner)?;
        let frames = self
            .transport
            .attach()
            .ok_or_else(|| StreamError::conflict(&self.job_id))?;
        debug!(stream_id = %self.stream_id, job_id = %self.job_id, "Consumer attached");
        Ok(frames)
    }

    /// Queue an event, returning its sequence number. A completion starts draining.
    pub fn emit(&self, event: StreamEvent) -> StreamResult<u64> {
        let event = match event {
            StreamEvent::StreamEnd { .. } => {
                return Err(StreamError::invalid_event(
                    "stream_end is written by the stream itself",
                ))
            }
            StreamEvent::Completion { status, result } => return self.complete(status, result),
            event => event,
        };

        let seq = {
            let mut inner = self.lock();
            self.check_accepting(&inner)?;
            self.push(&mut inner, event)
        };
        self.wake.notify_one();
        Ok(seq)
    }

    /// Queue the completion payload followed by `stream_end`
    pub fn complete(&self, status: CompletionStatus, result: String) -> StreamResult<u64> {
        let seq = {
            let mut inner = self.lock();
            self.check_accepting(&inner)?;
            let seq = self.push(&mut inner, StreamEvent::Completion { status, result });
            self.signal_end(&mut inner);
            seq
        };
        self.wake.notify_one();
        Ok(seq)
    }

    /// Early close: whatever is queued is flushed, then `stream_end`, then the
    /// usual acknowledgement wait bounded by the fallback timer
    pub async fn close(&self) {
        {
            let mut inner = self.lock();
            if inner.state.is_active() && !inner.end_signaled {
                self.signal_end(&mut inner);
            }
        }
        self.wake.notify_one();
        self.closed().await;
    }

    /// Best-effort flush of what is queued, then close without waiting for
    /// the consumer
    pub async fn cancel(&self) {
        {
            let mut inner = self.lock();
            if inner.state.is_active() {
                inner.cancelled = true;
                if !inner.end_signaled {
                    self.signal_end(&mut inner);
                }
            }
        }
        info!(stream_id = %self.stream_id, job_id = %self.job_id, "Stream cancelled");
        self.wake.notify_one();
        self.release.notify_one();
        self.closed().await;
    }

    /// The consumer saw `stream_end` and is ready for the connection to go
    pub fn acknowledge_end(&self) -> StreamResult<()> {
        {
            let inner = self.lock();
            if inner.state == StreamState::Closed {
                return Ok(());
            }
            if !inner.end_signaled {
                return Err(StreamError::NotDraining {
                    job_id: self.job_id.clone(),
                });
            }
        }
        self.release.notify_one();
        Ok(())
    }

    /// Resolves once the transport has been closed
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == StreamState::Closed).await;
    }

    pub fn summary(&self, orphan_threshold: Duration) -> StreamSummary {
        let inner = self.lock();
        self.summary_locked(&inner, Some(orphan_threshold))
    }

    fn summary_locked(&self, inner: &StreamInner, orphan_threshold: Option<Duration>) -> StreamSummary {
        let age = inner.lifetime.unwrap_or_else(|| self.started.elapsed());
        StreamSummary {
            stream_id: self.stream_id.clone(),
            job_id: self.job_id.clone(),
            state: inner.state,
            opened_at: self.opened_at.timestamp(),
            duration_ms: age.as_millis() as u64,
            events_queued: inner.queued,
            events_flushed: inner.flushed,
            orphaned: inner.state.is_active()
                && orphan_threshold.is_some_and(|threshold| age >= threshold),
            last_error: inner.last_error.clone(),
        }
    }

    fn check_accepting(&self, inner: &StreamInner) -> StreamResult<()> {
        if inner.state == StreamState::Closed {
            return Err(StreamError::closed(&self.job_id));
        }
        if inner.end_signaled {
            return Err(StreamError::EndSignaled {
                job_id: self.job_id.clone(),
            });
        }
        Ok(())
    }

    fn push(&self, inner: &mut StreamInner, event: StreamEvent) -> u64 {
        inner.next_seq += 1;
        let seq = inner.next_seq;
        inner.queue.push_back(StreamFrame {
            seq,
            job_id: self.job_id.clone(),
            event,
        });
        inner.queued += 1;
        seq
    }

    fn signal_end(&self, inner: &mut StreamInner) {
        // Every frame ahead of the marker is flushed before it goes out
        let delivered = inner.queued;
        self.push(inner, StreamEvent::StreamEnd { delivered });
        inner.end_signaled = true;

        if inner.state == StreamState::Open {
            inner.state = StreamState::Draining;
            self.state.send_replace(StreamState::Draining);
            info!(stream_id = %self.stream_id, job_id = %self.job_id, queued = inner.queued, "Stream draining");
        }
    }

    async fn run(self: Arc<Self>, transport: Arc<dyn StreamTransport>, settings: StreamSettings) {
        match self.flush(transport.as_ref(), settings.write_timeout).await {
            Ok(()) => self.await_release(transport.as_ref(), settings.close_grace).await,
            Err(e) => {
                error!(
                    stream_id = %self.stream_id,
                    job_id = %self.job_id,
                    error = %e,
                    "Stream write failed, forcing close"
                );
                self.health.record_failure();
                self.lock().last_error = Some(e.to_string());
            }
        }

        transport.close().await;
        self.finish();
    }

    /// Write frames in order until `stream_end` has gone out
    async fn flush(&self, transport: &dyn StreamTransport, write_timeout: Duration) -> StreamResult<()> {
        loop {
            let next = self.lock().queue.pop_front();
            let Some(frame) = next else {
                self.wake.notified().await;
                continue;
            };

            match tokio::time::timeout(write_timeout, transport.send(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(StreamError::transport(format!(
                        "write of frame {} timed out after {}ms",
                        frame.seq,
                        write_timeout.as_millis()
                    )))
                }
            }

            self.lock().flushed += 1;
            if frame.event.is_stream_end() {
                return Ok(());
            }
        }
    }

    async fn await_release(&self, transport: &dyn StreamTransport, close_grace: Duration) {
        if self.lock().cancelled {
            return;
        }

        tokio::select! {
            _ = self.release.notified() => {
                debug!(stream_id = %self.stream_id, "Stream end acknowledged");
            }
            _ = transport.peer_closed() => {
                debug!(stream_id = %self.stream_id, "Every consumer left after stream end");
            }
            _ = tokio::time::sleep(close_grace) => {
                warn!(
                    stream_id = %self.stream_id,
                    job_id = %self.job_id,
                    grace_ms = close_grace.as_millis() as u64,
                    "Fallback close timer fired before stream end was acknowledged"
                );
            }
        }
    }

    fn finish(&self) {
        let summary = {
            let mut inner = self.lock();
            inner.state = StreamState::Closed;
            inner.queue.clear();
            inner.lifetime = Some(self.started.elapsed());
            self.summary_locked(&inner, None)
        };

        info!(
            stream_id = %self.stream_id,
            job_id = %self.job_id,
            flushed = summary.events_flushed,
            duration_ms = summary.duration_ms,
            "Stream closed"
        );
        self.health.record_closed(summary);
        self.state.send_replace(StreamState::Closed);
    }
}
