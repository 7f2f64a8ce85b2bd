use super::AppState;
use crate::domain::model::{ChatMessage, LiveData, PageCount, PipelineCounts};
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

pub const CHAT_UNAVAILABLE: &str = "Ollama not available in cloud mode. Use Ask OpenClaw instead.";
pub const RELAY_UNAVAILABLE: &str = "OpenClaw is only available when running locally.";

#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub message: String,
}

/// What the relay gets to see of the live data.
#[derive(Serialize)]
struct RelaySummary<'a> {
    pipeline: &'a Option<PipelineCounts>,
    pageviews_7d: Option<u64>,
    top_pages: &'a Option<Vec<PageCount>>,
}

/// Missing or malformed bodies read as an empty request.
fn lenient<T: for<'de> Deserialize<'de> + Default>(body: &Bytes) -> T {
    serde_json::from_slice(body).unwrap_or_default()
}

fn error_reply(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    match tokio::fs::read_to_string(&state.dashboard_path).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            tracing::warn!(
                "Dashboard {} unavailable: {}",
                state.dashboard_path.display(),
                e
            );
            (StatusCode::NOT_FOUND, "dashboard not found").into_response()
        }
    }
}

pub async fn data(State(state): State<Arc<AppState>>) -> Json<LiveData> {
    Json(state.live.get().await)
}

pub async fn refresh(State(state): State<Arc<AppState>>) -> Json<LiveData> {
    Json(state.live.refresh().await)
}

pub fn system_prompt(name: &str, description: &str, data: &LiveData) -> String {
    let live = serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string());
    format!(
        "You are an AI assistant for {}, {}.\n\
         You have access to live business data. Answer questions about leads, pipeline, traffic, and marketing. Be concise and direct.\n\n\
         LIVE DATA:\n{}",
        name, description, live
    )
}

pub async fn chat(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: ChatRequest = lenient(&body);
    let data = state.live.get().await;

    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(ChatMessage::system(system_prompt(
        &state.business_name,
        &state.business_description,
        &data,
    )));
    messages.extend(request.history);
    messages.push(ChatMessage::user(request.message));

    match state.chat.chat(&messages).await {
        Ok(Some(reply)) => Json(json!({ "response": reply })).into_response(),
        Ok(None) => error_reply(StatusCode::SERVICE_UNAVAILABLE, CHAT_UNAVAILABLE),
        Err(e) => {
            tracing::debug!("Chat backend failed: {}", e);
            error_reply(StatusCode::SERVICE_UNAVAILABLE, CHAT_UNAVAILABLE)
        }
    }
}

pub fn relay_prompt(name: &str, data: &LiveData, question: &str) -> String {
    let summary = RelaySummary {
        pipeline: &data.pipeline,
        pageviews_7d: data.pageviews_7d,
        top_pages: &data.top_pages,
    };
    let summary = serde_json::to_string(&summary).unwrap_or_else(|_| "{}".to_string());
    format!("[{} Live Data]\n{}\n\nQuestion: {}", name, summary, question)
}

pub async fn ask_openclaw(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let request: AskRequest = lenient(&body);
    let data = state.live.get().await;
    let prompt = relay_prompt(&state.business_name, &data, &request.message);

    match state.relay.ask(&prompt).await {
        Ok(reply) => Json(json!({ "response": reply })).into_response(),
        Err(e) => {
            tracing::debug!("Relay failed: {}", e);
            error_reply(StatusCode::SERVICE_UNAVAILABLE, RELAY_UNAVAILABLE)
        }
    }
}
