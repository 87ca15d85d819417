use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// A job already owns an open or draining stream
    #[error("Job {job_id} already has an active stream")]
    Conflict { job_id: String },

    #[error("No stream for job {job_id}")]
    NotFound { job_id: String },

    #[error("Stream for job {job_id} is closed")]
    Closed { job_id: String },

    /// Append attempted after the terminal marker was queued
    #[error("Stream for job {job_id} already signaled its end")]
    EndSignaled { job_id: String },

    #[error("Invalid stream event: {message}")]
    InvalidEvent { message: String },

    /// Acknowledgement arrived before any stream_end was queued
    #[error("Stream for job {job_id} is not draining")]
    NotDraining { job_id: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StreamError {
    pub fn conflict<S: Into<String>>(job_id: S) -> Self {
        Self::Conflict {
            job_id: job_id.into(),
        }
    }

    pub fn not_found<S: Into<String>>(job_id: S) -> Self {
        Self::NotFound {
            job_id: job_id.into(),
        }
    }

    pub fn closed<S: Into<String>>(job_id: S) -> Self {
        Self::Closed {
            job_id: job_id.into(),
        }
    }

    pub fn invalid_event<S: Into<String>>(message: S) -> Self {
        Self::InvalidEvent {
            message: message.into(),
        }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport(message.into())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
