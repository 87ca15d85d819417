mod common;

use actix_web::http::StatusCode;
use actix_web::test::{self, TestRequest};
use common::{setup_test_app, setup_test_app_with, test_config};
use nocodo_interaction::NewQuestion;
use serde_json::{json, Value};
use shared_types::QuestionStatus;
use std::time::Duration;

#[actix_rt::test]
async fn test_create_list_answer_and_reject_second_answer() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;

    let req = TestRequest::post()
        .uri("/jobs/job-1/questions")
        .set_json(json!({
            "prompt": "Which environment?",
            "suggestions": ["staging", "production"]
        }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created: Value = test::read_body_json(resp).await;
    let question_id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["status"], "pending");
    assert_eq!(created["job_id"], "job-1");

    let req = TestRequest::get().uri("/jobs/job-1/questions").to_request();
    let pending: Value = test::call_and_read_body_json(&test_app.app, req).await;
    assert_eq!(pending["questions"].as_array().unwrap().len(), 1);
    assert_eq!(pending["questions"][0]["id"], question_id.as_str());

    let req = TestRequest::post()
        .uri(&format!("/questions/{question_id}/answer"))
        .set_json(json!({ "answer": "staging" }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let answered: Value = test::read_body_json(resp).await;
    assert_eq!(answered["status"], "answered");
    assert_eq!(answered["answer"], "staging");

    // A late duplicate must not overwrite the first answer
    let req = TestRequest::post()
        .uri(&format!("/questions/{question_id}/answer"))
        .set_json(json!({ "answer": "production" }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_state");

    let req = TestRequest::get()
        .uri(&format!("/questions/{question_id}"))
        .to_request();
    let current: Value = test::call_and_read_body_json(&test_app.app, req).await;
    assert_eq!(current["answer"], "staging");

    let req = TestRequest::get().uri("/jobs/job-1/questions").to_request();
    let pending: Value = test::call_and_read_body_json(&test_app.app, req).await;
    assert!(pending["questions"].as_array().unwrap().is_empty());

    Ok(())
}

#[actix_rt::test]
async fn test_stats_route_is_not_a_question_id() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;
    test_app
        .state
        .store
        .create("job-1", "First?", Vec::new(), None);
    let second = test_app
        .state
        .store
        .create("job-1", "Second?", Vec::new(), None);
    test_app.state.store.cancel(&second.id, "not needed")?;

    let req = TestRequest::get().uri("/questions/stats").to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let stats: Value = test::read_body_json(resp).await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_state"]["pending"], 1);
    assert_eq!(stats["by_state"]["cancelled"], 1);
    assert_eq!(stats["by_state"]["answered"], 0);

    Ok(())
}

#[actix_rt::test]
async fn test_unknown_question_is_404() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;

    let req = TestRequest::get().uri("/questions/missing").to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "question_not_found");

    let req = TestRequest::post()
        .uri("/questions/missing/answer")
        .set_json(json!({ "answer": "x" }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[actix_rt::test]
async fn test_cancel_without_body_then_answer_conflicts() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;
    let question = test_app
        .state
        .store
        .create("job-1", "Delete the branch?", Vec::new(), None);

    let req = TestRequest::post()
        .uri(&format!("/questions/{}/cancel", question.id))
        .to_request();
    let cancelled: Value = test::call_and_read_body_json(&test_app.app, req).await;
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["reason"], "cancelled by operator");

    let req = TestRequest::post()
        .uri(&format!("/questions/{}/answer", question.id))
        .set_json(json!({ "answer": "yes" }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    Ok(())
}

#[actix_rt::test]
async fn test_create_rejects_invalid_and_duplicate_questions() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;

    let req = TestRequest::post()
        .uri("/jobs/job-1/questions")
        .set_json(json!({ "prompt": "   " }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "invalid_question");

    // A timeout too large for a deadline would never expire
    let req = TestRequest::post()
        .uri("/jobs/job-1/questions")
        .set_json(json!({ "prompt": "Eventually?", "timeout_secs": u64::MAX }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(test_app.state.store.list_pending("job-1").is_empty());

    let create = || {
        TestRequest::post()
            .uri("/jobs/job-1/questions")
            .set_json(json!({ "question_id": "q-fixed", "prompt": "Continue?" }))
            .to_request()
    };
    let resp = test::call_service(&test_app.app, create()).await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let resp = test::call_service(&test_app.app, create()).await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "duplicate_question");

    Ok(())
}

#[actix_rt::test]
async fn test_long_poll_returns_answer() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;
    let store = test_app.state.store.clone();
    let question = store.create("job-1", "Token?", Vec::new(), None);

    let answering = {
        let store = store.clone();
        let question_id = question.id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            store.resolve(&question_id, "abc123")
        })
    };

    let req = TestRequest::get()
        .uri(&format!("/questions/{}/answer?wait_ms=2000", question.id))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["question_id"], question.id.as_str());
    assert_eq!(body["answer"], "abc123");

    answering.await??;
    Ok(())
}

#[actix_rt::test]
async fn test_long_poll_tolerates_creation_lag() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;
    let store = test_app.state.store.clone();

    // The asker polls before the create request has landed
    let asker = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.insert(NewQuestion::new("job-1", "Proceed?").with_id("q-late"))?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        store.resolve("q-late", "go")
    });

    let req = TestRequest::get()
        .uri("/questions/q-late/answer?job_id=job-1&wait_ms=2000")
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["answer"], "go");

    asker.await??;
    Ok(())
}

#[actix_rt::test]
async fn test_long_poll_elapses_and_unknown_id_is_404() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;
    let question = test_app
        .state
        .store
        .create("job-1", "Anyone?", Vec::new(), None);

    let req = TestRequest::get()
        .uri(&format!("/questions/{}/answer?wait_ms=50", question.id))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "timeout");
    assert!(test_app.state.store.get(&question.id).unwrap().is_pending());

    let req = TestRequest::get()
        .uri("/questions/never-created/answer?wait_ms=1000")
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[actix_rt::test]
async fn test_long_poll_on_cancelled_question_is_gone() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;
    let question = test_app
        .state
        .store
        .create("job-1", "Retry?", Vec::new(), None);
    test_app.state.store.cancel(&question.id, "job stopped")?;

    let req = TestRequest::get()
        .uri(&format!("/questions/{}/answer?wait_ms=500", question.id))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::GONE);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "question_cancelled");

    Ok(())
}

#[actix_rt::test]
async fn test_ask_blocks_until_answered() -> anyhow::Result<()> {
    let test_app = setup_test_app().await?;
    let store = test_app.state.store.clone();

    let req = TestRequest::post()
        .uri("/jobs/job-ask/ask")
        .set_json(json!({ "prompt": "Ship it?", "suggestions": ["yes", "no"] }))
        .to_request();

    let operator = async {
        loop {
            if let Some(question) = store.list_pending("job-ask").into_iter().next() {
                return store.resolve(&question.id, "yes");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };

    let (resp, resolved) = tokio::join!(test::call_service(&test_app.app, req), operator);
    let resolved = resolved?;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["answer"], "yes");
    assert_eq!(body["question_id"], resolved.id.as_str());

    Ok(())
}

#[actix_rt::test]
async fn test_ask_times_out_and_cancels_question() -> anyhow::Result<()> {
    let mut config = test_config();
    config.questions.max_wait_secs = 1;
    let test_app = setup_test_app_with(config).await?;

    let req = TestRequest::post()
        .uri("/jobs/job-slow/ask")
        .set_json(json!({ "prompt": "Still there?" }))
        .to_request();
    let resp = test::call_service(&test_app.app, req).await;
    assert_eq!(resp.status(), StatusCode::REQUEST_TIMEOUT);

    let questions = test_app.state.store.list_job("job-slow");
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].status(), QuestionStatus::Cancelled);

    Ok(())
}
