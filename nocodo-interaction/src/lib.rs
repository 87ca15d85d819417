//! Question/answer correlation between running agent jobs and the operator.
//!
//! The [`QuestionStore`] owns every question and its lifecycle. Collectors
//! wait on it, handlers render questions to a surface and block on a
//! collector, and the [`LifecycleEmitter`] broadcasts each transition.

pub mod collector;
pub mod error;
pub mod events;
pub mod expiry;
pub mod handler;
pub mod question;
pub mod store;

pub use collector::{
    AnswerCollector, CollectorKind, CorrelatedHttpCollector, InProcessCollector,
    MessageQueueCollector, DEFAULT_LOOKUP_GRACE,
};
pub use error::{QuestionError, QuestionResult};
pub use events::{EventListener, LifecycleEmitter, QuestionEvent};
pub use expiry::ExpiryTimer;
pub use handler::{
    prepare_question, ApiQuestionHandler, CliQuestionHandler, QuestionHandler,
    VsCodeQuestionHandler,
};
pub use question::{NewQuestion, Question, QuestionState};
pub use store::{QuestionStore, QuestionSubscription, SweepReport, DEFAULT_RETENTION};
