#![allow(dead_code)]

use actix_web::{test, web, App};
use nocodo_api::{configure, ApiConfig, AppState};
use serde_json::Value;

pub struct TestApp<S> {
    pub state: web::Data<AppState>,
    pub app: S,
}

/// Defaults with short timers so drain and long-poll paths finish quickly
pub fn test_config() -> ApiConfig {
    let mut config = ApiConfig::default();
    config.questions.lookup_grace_ms = 100;
    config.questions.max_wait_secs = 5;
    config.streams.close_grace_ms = 200;
    config.streams.write_timeout_ms = 1000;
    config
}

pub async fn setup_test_app() -> anyhow::Result<TestApp<impl actix_web::dev::Service<
    actix_http::Request,
    Response = actix_web::dev::ServiceResponse,
    Error = actix_web::Error,
>>> {
    setup_test_app_with(test_config()).await
}

pub async fn setup_test_app_with(
    config: ApiConfig,
) -> anyhow::Result<TestApp<impl actix_web::dev::Service<
    actix_http::Request,
    Response = actix_web::dev::ServiceResponse,
    Error = actix_web::Error,
>>> {
    let state = web::Data::new(AppState::new(config));

    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .configure(configure),
    )
    .await;

    Ok(TestApp { state, app })
}

/// Decode the `data:` payload of every SSE frame in a response body
pub fn sse_frames(body: &[u8]) -> anyhow::Result<Vec<Value>> {
    let text = std::str::from_utf8(body)?;
    let mut frames = Vec::new();
    for block in text.split("\n\n").filter(|b| !b.trim().is_empty()) {
        let data = block
            .lines()
            .find_map(|line| line.strip_prefix("data: "))
            .ok_or_else(|| anyhow::anyhow!("SSE frame without data: {block:?}"))?;
        frames.push(serde_json::from_str(data)?);
    }
    Ok(frames)
}

pub fn frame_types(frames: &[Value]) -> Vec<String> {
    frames
        .iter()
        .map(|f| f["type"].as_str().unwrap_or_default().to_string())
        .collect()
}
