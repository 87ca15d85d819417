use crate::error::QuestionError;
use crate::question::Question;
use crate::store::QuestionStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Timer that expires one question at its deadline. Aborted when dropped.
pub struct ExpiryTimer {
    handle: Option<JoinHandle<()>>,
}

impl ExpiryTimer {
    /// Arm a timer for the question's deadline; inert if it has none
    pub fn schedule(store: Arc<QuestionStore>, question: &Question) -> Self {
        let Some(deadline) = question.expires_at else {
            return Self { handle: None };
        };

        let delay = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let question_id = question.id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.expire(&question_id) {
                Ok(_) => info!(question_id = %question_id, "Question expired"),
                Err(QuestionError::InvalidState { status, .. }) => {
                    debug!(question_id = %question_id, status = %status, "Question settled before its deadline")
                }
                Err(QuestionError::NotFound { .. }) => {
                    debug!(question_id = %question_id, "Question gone before its deadline")
                }
                Err(e) => warn!(question_id = %question_id, error = %e, "Failed to expire question"),
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    /// Let the timer outlive this guard
    pub fn detach(mut self) {
        self.handle.take();
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
