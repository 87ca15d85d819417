use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use actix_web::{delete, get, post, web, HttpResponse};
use nocodo_stream::{sse_body_stream, SseTransport};
use serde::Serialize;
use shared_types::{CompleteRequest, StreamEvent};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    pub seq: u64,
}

/// Open the job's push-stream, or join the one already running.
///
/// A fresh stream replays the job's pending questions first. The replay runs
/// under the store lock, so a question created meanwhile is relayed exactly
/// once and after the replay.
#[get("/jobs/{job_id}/stream")]
pub async fn open_stream(
    job_id: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job_id = job_id.into_inner();
    let (adapter, frames, attached) = state.store.with_pending(&job_id, |pending| -> AppResult<_> {
        if let Some((adapter, frames)) = state.streams.attach(&job_id)? {
            return Ok((adapter, frames, true));
        }

        let transport = Arc::new(SseTransport::new(state.config.streams.channel_capacity));
        let frames = transport.subscribe();
        let adapter = state.streams.open(&job_id, transport)?;
        for question in pending {
            let event = StreamEvent::Question {
                question: question.to_view(),
            };
            if let Err(e) = adapter.emit(event) {
                warn!(job_id = %job_id, question_id = %question.id, error = %e, "Failed to replay pending question");
            }
        }
        Ok((adapter, frames, false))
    })?;
    info!(job_id = %job_id, stream_id = %adapter.stream_id(), attached, "SSE consumer connected");

    Ok(HttpResponse::Ok()
        .insert_header((CONTENT_TYPE, "text/event-stream"))
        .insert_header((CACHE_CONTROL, "no-cache"))
        .streaming(sse_body_stream(frames)))
}

/// Append a task event. A `completion` starts draining the stream.
#[post("/jobs/{job_id}/events")]
pub async fn append_event(
    job_id: web::Path<String>,
    body: web::Json<StreamEvent>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job_id = job_id.into_inner();
    let event = body.into_inner();
    if matches!(
        event,
        StreamEvent::Question { .. }
            | StreamEvent::Answer { .. }
            | StreamEvent::QuestionClosed { .. }
    ) {
        return Err(AppError::InvalidRequest(format!(
            "{} events are published by the question store",
            event.kind()
        )));
    }

    let seq = state.streams.emit(&job_id, event)?;
    Ok(HttpResponse::Ok().json(QueuedResponse { seq }))
}

#[post("/jobs/{job_id}/complete")]
pub async fn complete_stream(
    job_id: web::Path<String>,
    body: web::Json<CompleteRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job_id = job_id.into_inner();
    let CompleteRequest { status, result } = body.into_inner();
    let seq = state.streams.complete(&job_id, status, result)?;
    Ok(HttpResponse::Accepted().json(QueuedResponse { seq }))
}

/// The consumer saw `stream_end`; release the transport
#[post("/jobs/{job_id}/stream/ack")]
pub async fn acknowledge_end(
    job_id: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state.streams.acknowledge_end(&job_id)?;
    Ok(HttpResponse::NoContent().finish())
}

/// Flush what is queued, signal the end and wait for the close
#[post("/jobs/{job_id}/stream/close")]
pub async fn close_stream(
    job_id: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let summary = state.streams.close(&job_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[delete("/jobs/{job_id}/stream")]
pub async fn cancel_stream(
    job_id: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let summary = state.streams.cancel(&job_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[get("/streams/health")]
pub async fn stream_health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.streams.health_check())
}
