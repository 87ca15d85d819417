use nocodo_interaction::{QuestionEvent, QuestionStore};
use nocodo_stream::{StreamError, StreamManager};
use shared_types::{QuestionStatus, StreamEvent};
use std::sync::Arc;
use tracing::{debug, warn};

/// Forward question lifecycle events onto the owning job's open stream.
///
/// The forward runs inside the store mutation, so a question's frame is queued
/// before the call that created or settled it returns. Lock order is store,
/// then stream manager, then adapter.
pub fn install_relay(store: &QuestionStore, streams: Arc<StreamManager>) {
    store
        .emitter()
        .add_listener(Arc::new(move |event: &QuestionEvent| forward(&streams, event)));
}

fn forward(streams: &StreamManager, event: &QuestionEvent) {
    let job_id = event.job_id();
    if !streams.is_active(job_id) {
        return;
    }

    let kind = event.kind();
    match streams.emit(job_id, stream_event(event.clone())) {
        Ok(seq) => debug!(job_id = %job_id, seq, kind, "Relayed question event"),
        Err(
            e @ (StreamError::EndSignaled { .. }
            | StreamError::Closed { .. }
            | StreamError::NotFound { .. }),
        ) => {
            debug!(job_id = %job_id, kind, error = %e, "Stream no longer accepts question events")
        }
        Err(e) => warn!(job_id = %job_id, kind, error = %e, "Failed to relay question event"),
    }
}

pub fn stream_event(event: QuestionEvent) -> StreamEvent {
    match event {
        QuestionEvent::Created { question } => StreamEvent::Question {
            question: question.to_view(),
        },
        QuestionEvent::Answered {
            question_id,
            answer,
            ..
        } => StreamEvent::Answer {
            question_id,
            answer,
        },
        QuestionEvent::Cancelled {
            question_id,
            reason,
            ..
        } => StreamEvent::QuestionClosed {
            question_id,
            status: QuestionStatus::Cancelled,
            reason: Some(reason),
        },
        QuestionEvent::Expired { question_id, .. } => StreamEvent::QuestionClosed {
            question_id,
            status: QuestionStatus::Expired,
            reason: None,
        },
    }
}
