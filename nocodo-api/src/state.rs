use crate::config::ApiConfig;
use crate::relay;
use nocodo_interaction::QuestionStore;
use nocodo_stream::StreamManager;
use std::sync::Arc;

/// Shared by every worker of the server
pub struct AppState {
    pub store: Arc<QuestionStore>,
    pub streams: Arc<StreamManager>,
    pub config: ApiConfig,
}

impl AppState {
    /// Build the store and stream manager and wire question events into streams
    pub fn new(config: ApiConfig) -> Self {
        let store = Arc::new(QuestionStore::with_retention(config.questions.retention()));
        let streams = Arc::new(StreamManager::new(config.streams.settings()));
        relay::install_relay(&store, streams.clone());
        Self {
            store,
            streams,
            config,
        }
    }
}
