use crate::adapter::{StreamOutputAdapter, StreamSettings};
use crate::error::{StreamError, StreamResult};
use crate::health::HealthLedger;
use crate::transport::StreamTransport;
use bytes::Bytes;
use shared_types::{CompletionStatus, StreamEvent, StreamHealthReport, StreamSummary};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Owns the adapters, at most one open or draining stream per job
pub struct StreamManager {
    streams: Mutex<HashMap<String, Arc<StreamOutputAdapter>>>,
    settings: StreamSettings,
    health: Arc<HealthLedger>,
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new(StreamSettings::default())
    }
}

impl StreamManager {
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            settings,
            health: Arc::new(HealthLedger::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<StreamOutputAdapter>>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn open(
        &self,
        job_id: &str,
        transport: Arc<dyn StreamTransport>,
    ) -> StreamResult<Arc<StreamOutputAdapter>> {
        let mut streams = self.lock();
        if let Some(existing) = streams.get(job_id) {
            if existing.state().is_active() {
                warn!(job_id = %job_id, stream_id = %existing.stream_id(), "Rejected second stream for job");
                return Err(StreamError::conflict(job_id));
            }
        }

        let adapter =
            StreamOutputAdapter::start(job_id, transport, self.settings, self.health.clone());
        streams.insert(job_id.to_string(), adapter.clone());
        Ok(adapter)
    }

    /// Join the job's open stream as another consumer.
    ///
    /// `Ok(None)` when the job has no active stream. A stream that already
    /// signaled its end, or whose transport serves a single peer, conflicts.
    pub fn attach(
        &self,
        job_id: &str,
    ) -> StreamResult<Option<(Arc<StreamOutputAdapter>, mpsc::Receiver<Bytes>)>> {
        let streams = self.lock();
        let Some(adapter) = streams.get(job_id).filter(|a| a.state().is_active()) else {
            return Ok(None);
        };

        match adapter.attach() {
            Ok(frames) => Ok(Some((adapter.clone(), frames))),
            Err(StreamError::Closed { .. }) => Ok(None),
            Err(StreamError::EndSignaled { .. }) => {
                warn!(job_id = %job_id, stream_id = %adapter.stream_id(), "Rejected consumer for draining stream");
                Err(StreamError::conflict(job_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Latest stream of a job, closed or not
    pub fn get(&self, job_id: &str) -> Option<Arc<StreamOutputAdapter>> {
        self.lock().get(job_id).cloned()
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.get(job_id).is_some_and(|a| a.state().is_active())
    }

    fn require(&self, job_id: &str) -> StreamResult<Arc<StreamOutputAdapter>> {
        self.get(job_id)
            .ok_or_else(|| StreamError::not_found(job_id))
    }

    pub fn emit(&self, job_id: &str, event: StreamEvent) -> StreamResult<u64> {
        self.require(job_id)?.emit(event)
    }

    pub fn complete(
        &self,
        job_id: &str,
        status: CompletionStatus,
        result: String,
    ) -> StreamResult<u64> {
        self.require(job_id)?.complete(status, result)
    }

    /// Drive the job's stream through drain to closed
    pub async fn close(&self, job_id: &str) -> StreamResult<StreamSummary> {
        let adapter = self.require(job_id)?;
        adapter.close().await;
        Ok(adapter.summary(self.settings.orphan_threshold))
    }

    pub async fn cancel(&self, job_id: &str) -> StreamResult<StreamSummary> {
        let adapter = self.require(job_id)?;
        adapter.cancel().await;
        Ok(adapter.summary(self.settings.orphan_threshold))
    }

    pub fn acknowledge_end(&self, job_id: &str) -> StreamResult<()> {
        self.require(job_id)?.acknowledge_end()
    }

    /// Durations, counters and orphan flags. Closed streams are pruned here.
    pub fn health_check(&self) -> StreamHealthReport {
        let threshold = self.settings.orphan_threshold;
        let mut active: Vec<StreamSummary> = {
            let mut streams = self.lock();
            streams.retain(|_, adapter| adapter.state().is_active());
            streams
                .values()
                .map(|adapter| adapter.summary(threshold))
                .collect()
        };
        active.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then(a.job_id.cmp(&b.job_id)));

        let orphaned = active.iter().filter(|s| s.orphaned).count();
        if orphaned > 0 {
            warn!(
                orphaned,
                threshold_secs = threshold.as_secs(),
                "Streams open past the orphan threshold"
            );
        }

        StreamHealthReport {
            active,
            recently_closed: self.health.recently_closed(),
            orphaned,
            flush_failures: self.health.failures(),
        }
    }

    /// Cancel every stream and forget the history
    pub async fn reset(&self) {
        let adapters: Vec<Arc<StreamOutputAdapter>> =
            self.lock().drain().map(|(_, adapter)| adapter).collect();
        let count = adapters.len();
        for adapter in adapters {
            adapter.cancel().await;
        }
        self.health.reset();
        info!(cancelled = count, "Stream manager reset");
    }
}
