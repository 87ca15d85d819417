use crate::error::{AppError, AppResult};
use crate::state::AppState;
use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use nocodo_interaction::{
    AnswerCollector, ApiQuestionHandler, CorrelatedHttpCollector, ExpiryTimer, NewQuestion,
    QuestionError, QuestionStore,
};
use serde::Deserialize;
use shared_types::{
    AnswerRequest, AskQuestionRequest, CancelRequest, CreateQuestionRequest,
    PendingQuestionsResponse, QuestionResponse,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    /// Long-poll budget, capped by `questions.max_wait_secs`
    pub wait_ms: Option<u64>,
    /// Job the question belongs to; looked up in the store when absent
    pub job_id: Option<String>,
}

#[get("/questions/stats")]
pub async fn question_stats(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.store.stats())
}

#[get("/questions/{question_id}")]
pub async fn get_question(
    question_id: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let question_id = question_id.into_inner();
    let question = state
        .store
        .get(&question_id)
        .ok_or_else(|| QuestionError::not_found(&question_id))?;
    Ok(HttpResponse::Ok().json(question.to_view()))
}

#[post("/questions/{question_id}/answer")]
pub async fn answer_question(
    question_id: web::Path<String>,
    body: web::Json<AnswerRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let question_id = question_id.into_inner();
    let question = state.store.resolve(&question_id, &body.answer)?;
    Ok(HttpResponse::Ok().json(question.to_view()))
}

#[post("/questions/{question_id}/cancel")]
pub async fn cancel_question(
    question_id: web::Path<String>,
    body: Option<web::Json<CancelRequest>>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let question_id = question_id.into_inner();
    let reason = body
        .and_then(|b| b.into_inner().reason)
        .unwrap_or_else(|| "cancelled by operator".to_string());
    let question = state.store.cancel(&question_id, &reason)?;
    Ok(HttpResponse::Ok().json(question.to_view()))
}

/// Long-poll for the answer of one question
#[get("/questions/{question_id}/answer")]
pub async fn wait_for_answer(
    question_id: web::Path<String>,
    query: web::Query<WaitQuery>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let question_id = question_id.into_inner();
    let limits = &state.config.questions;
    let wait = query
        .wait_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| limits.max_wait())
        .min(limits.max_wait());

    let job_id = match &query.job_id {
        Some(job_id) => job_id.clone(),
        None => {
            state
                .store
                .wait_for_creation(&question_id, limits.lookup_grace())
                .await?
                .question
                .job_id
        }
    };

    let collector = CorrelatedHttpCollector::new(state.store.clone(), job_id)
        .with_lookup_grace(limits.lookup_grace());
    let answer = match tokio::time::timeout(wait, collector.wait_for_answer(&question_id)).await {
        Ok(answer) => answer?,
        Err(_) => {
            debug!(question_id = %question_id, wait_ms = wait.as_millis() as u64, "Long-poll elapsed");
            return Err(AppError::Timeout(format!(
                "No answer for question {} within {}ms",
                question_id,
                wait.as_millis()
            )));
        }
    };

    let answered_at = state
        .store
        .get(&question_id)
        .and_then(|q| q.settled_at)
        .unwrap_or_else(Utc::now)
        .timestamp();

    Ok(HttpResponse::Ok().json(QuestionResponse {
        question_id,
        answer,
        answered_at,
    }))
}

#[get("/jobs/{job_id}/questions")]
pub async fn list_job_questions(
    job_id: web::Path<String>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let job_id = job_id.into_inner();
    let questions = state
        .store
        .list_pending(&job_id)
        .iter()
        .map(|q| q.to_view())
        .collect();
    HttpResponse::Ok().json(PendingQuestionsResponse { job_id, questions })
}

/// Create a question without waiting for it
#[post("/jobs/{job_id}/questions")]
pub async fn create_question(
    job_id: web::Path<String>,
    body: web::Json<CreateQuestionRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job_id = job_id.into_inner();
    let CreateQuestionRequest {
        question_id,
        question,
    } = body.into_inner();

    let data = question.into_data(&job_id);
    data.validate().map_err(QuestionError::validation)?;

    let mut new = NewQuestion::from_data(&data, Utc::now());
    new.id = question_id;
    let question = state.store.insert(new)?;
    ExpiryTimer::schedule(state.store.clone(), &question).detach();

    Ok(HttpResponse::Created().json(question.to_view()))
}

/// Cancels the question if the client goes away mid-ask
struct CancelOnDrop {
    store: Arc<QuestionStore>,
    question_id: String,
    armed: bool,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let pending = self
            .store
            .get(&self.question_id)
            .is_some_and(|q| q.is_pending());
        if pending && self.store.cancel(&self.question_id, "client disconnected").is_ok() {
            info!(question_id = %self.question_id, "Cancelled question of a disconnected asker");
        }
    }
}

/// Ask and block until the question settles, bounded by `max_wait_secs`
#[post("/jobs/{job_id}/ask")]
pub async fn ask_question(
    job_id: web::Path<String>,
    body: web::Json<AskQuestionRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let job_id = job_id.into_inner();
    let limits = &state.config.questions;
    let handler = ApiQuestionHandler::new(state.store.clone(), job_id.clone())
        .with_lookup_grace(limits.lookup_grace());

    let question_id = uuid::Uuid::new_v4().to_string();
    let mut guard = CancelOnDrop {
        store: state.store.clone(),
        question_id: question_id.clone(),
        armed: true,
    };

    let outcome = tokio::time::timeout(
        limits.max_wait(),
        handler.ask_with_id(question_id.clone(), body.into_inner().into_data(&job_id)),
    )
    .await;
    guard.armed = false;

    match outcome {
        Ok(response) => Ok(HttpResponse::Ok().json(response?)),
        Err(_) => {
            if let Err(e) = handler
                .collector()
                .cancel_question(&question_id, "ask timed out")
            {
                warn!(question_id = %question_id, error = %e, "Could not cancel timed out question");
            }
            Err(AppError::Timeout(format!(
                "Question {} was not answered within {}s",
                question_id,
                limits.max_wait().as_secs()
            )))
        }
    }
}
