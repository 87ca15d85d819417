use crate::error::{StreamError, StreamResult};
use async_trait::async_trait;
use bytes::Bytes;
use shared_types::StreamFrame;
use std::convert::Infallible;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Where an adapter writes its frames
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn send(&self, frame: &StreamFrame) -> StreamResult<()>;

    /// Tear down the connection. The adapter calls this exactly once.
    async fn close(&self);

    /// Resolves once no consumer is left to read the stream. Transports that
    /// cannot tell never resolve.
    async fn peer_closed(&self) {
        std::future::pending::<()>().await
    }

    /// Add another consumer to a live transport. `None` for transports bound
    /// to a single peer.
    fn attach(&self) -> Option<mpsc::Receiver<Bytes>> {
        None
    }
}

/// Server-sent events transport fanning out to every attached subscriber
pub struct SseTransport {
    subscribers: Mutex<Vec<mpsc::Sender<Bytes>>>,
    capacity: usize,
}

impl SseTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            capacity: capacity.max(1),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::Sender<Bytes>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a consumer; the receiver yields SSE chunks
    pub fn subscribe(&self) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers().push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers().iter().filter(|tx| !tx.is_closed()).count()
    }
}

#[async_trait]
impl StreamTransport for SseTransport {
    async fn send(&self, frame: &StreamFrame) -> StreamResult<()> {
        let chunk = Bytes::from(frame.to_sse()?);
        let targets: Vec<mpsc::Sender<Bytes>> = {
            let mut subscribers = self.subscribers();
            subscribers.retain(|tx| !tx.is_closed());
            subscribers.clone()
        };

        for tx in targets {
            if tx.send(chunk.clone()).await.is_err() {
                debug!(seq = frame.seq, job_id = %frame.job_id, "SSE subscriber went away");
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.subscribers().clear();
    }

    fn attach(&self) -> Option<mpsc::Receiver<Bytes>> {
        Some(self.subscribe())
    }

    async fn peer_closed(&self) {
        let targets: Vec<mpsc::Sender<Bytes>> = self.subscribers().clone();
        futures_util::future::join_all(targets.iter().map(|tx| tx.closed())).await;
    }
}

/// Body stream for an HTTP response
pub fn sse_body_stream(
    mut rx: mpsc::Receiver<Bytes>,
) -> impl futures_util::Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    async_stream::stream! {
        while let Some(chunk) = rx.recv().await {
            yield Ok::<Bytes, Infallible>(chunk);
        }
    }
}
