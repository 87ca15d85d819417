//! Answer collectors: the waiting side of a question.
//!
//! A collector blocks the asking job until the store settles the question.
//! All three variants share one wait path (`WaitRegistry`) and differ only in
//! how the answer reaches the store.

mod correlated;
mod in_process;
mod message_queue;
mod registry;


pub use correlated::CorrelatedHttpCollector;
pub use in_process::InProcessCollector;
pub use message_queue::{apply_message, MessageQueueCollector, DEFAULT_QUEUE_CAPACITY};

use crate::error::QuestionResult;
use async_trait::async_trait;
use std::time::Duration;

/// How long a wait tolerates a question id the store has not registered yet
pub const DEFAULT_LOOKUP_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorKind {
    InProcess,
    CorrelatedHttp,
    MessageQueue,
}

impl std::fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CollectorKind::InProcess => "in_process",
            CollectorKind::CorrelatedHttp => "correlated_http",
            CollectorKind::MessageQueue => "message_queue",
        };
        f.write_str(name)
    }
}

#[async_trait]
pub trait AnswerCollector: Send + Sync {
    fn kind(&self) -> CollectorKind;

    /// Resolve with the answer, or fail with `Cancelled`, `Expired`,
    /// `NotFound` or `AlreadyWaiting`
    async fn wait_for_answer(&self, question_id: &str) -> QuestionResult<String>;

    /// Cancel a question in the store and reject its local waiter, if any
    fn cancel_question(&self, question_id: &str, reason: &str) -> QuestionResult<()>;

    /// Cancel every question this collector is still waiting on
    fn cleanup(&self);

    fn pending_waits(&self) -> usize;
}
