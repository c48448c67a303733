//! Run endpoints
//!
//! Streaming runs are served as server-sent events, one wire record per
//! event; buffered runs return the collected [`RunResponse`].

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use playground_core::ToolResolution;
use run_engine::{ContinueRequest, RunHandle, RunOutcome, RunRequest};

use super::{resolve_entity, run_error, RouteError};
use crate::state::AppState;

// ============================================================================
// Request types
// ============================================================================

fn default_stream() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateRunBody {
    /// Plain-text input for agents and teams
    #[serde(default)]
    pub message: Option<String>,
    /// Structured input; takes precedence over `message`
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

impl CreateRunBody {
    fn take_input(&mut self) -> Value {
        match (self.input.take(), self.message.take()) {
            (Some(input), _) => input,
            (None, Some(message)) => Value::String(message),
            (None, None) => Value::Null,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContinueRunBody {
    #[serde(default, alias = "tools")]
    pub resolutions: Vec<ToolResolution>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_run(
    State(state): State<AppState>,
    Path((kind, entity_id)): Path<(String, String)>,
    Json(mut body): Json<CreateRunBody>,
) -> Result<Response, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;

    let outcome = state
        .dispatcher()
        .create_run(RunRequest {
            entity_id,
            input: body.take_input(),
            session_id: body.session_id,
            user_id: body.user_id,
            stream: body.stream,
        })
        .await
        .map_err(run_error)?;
    Ok(respond(outcome))
}

async fn continue_run(
    State(state): State<AppState>,
    Path((kind, entity_id, run_id)): Path<(String, String, String)>,
    Json(body): Json<ContinueRunBody>,
) -> Result<Response, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;

    let outcome = state
        .dispatcher()
        .continue_run(ContinueRequest {
            entity_id,
            run_id,
            session_id: body.session_id,
            resolutions: body.resolutions,
            stream: body.stream,
        })
        .await
        .map_err(run_error)?;
    Ok(respond(outcome))
}

fn respond(outcome: RunOutcome) -> Response {
    match outcome {
        RunOutcome::Streaming(handle) => event_stream(handle).into_response(),
        RunOutcome::Buffered(response) => Json(response).into_response(),
    }
}

fn event_stream(handle: RunHandle) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(run_id = %handle.run_id(), "Streaming run events");
    let events = handle.map(|event| {
        let sse = Event::default()
            .event(event.kind.name())
            .id(event.seq.to_string());
        Ok(sse.json_data(&event).unwrap_or_else(|e| {
            warn!(run_id = %event.run_id, "Failed to encode event: {}", e);
            Event::default().comment("unencodable event")
        }))
    });
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/playground/{kind}/{id}/runs", post(create_run))
        .route(
            "/playground/{kind}/{id}/runs/{run_id}/continue",
            post(continue_run),
        )
}

#[cfg(test)]
mod tests {
    use axum::http::{header, StatusCode};
    use serde_json::{json, Value};

    use crate::routes::test_support::{app, json_body, send, text_body};

    fn data_lines(body: &str) -> Vec<Value> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim_start()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn buffered_run_returns_response() {
        let app = app().await;
        let response = send(
            &app,
            "POST",
            "/playground/agents/assistant/runs",
            Some(json!({ "message": "hello world", "stream": false })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["content"], "hello world");
        let events = body["events"].as_array().unwrap();
        assert_eq!(events.last().unwrap()["kind"], "completed");
        assert_eq!(events[0]["seq"], 1);
    }

    #[tokio::test]
    async fn streaming_run_sends_wire_records() {
        let app = app().await;
        let response = send(
            &app,
            "POST",
            "/playground/agents/assistant/runs",
            Some(json!({ "message": "one two three", "session_id": "s1" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/event-stream"));

        let records = data_lines(&text_body(response).await);
        let kinds: Vec<&str> = records.iter().map(|r| r["kind"].as_str().unwrap()).collect();
        assert_eq!(
            kinds,
            vec!["content-delta", "content-delta", "content-delta", "completed"]
        );
        let run_id = &records[0]["run_id"];
        for (i, record) in records.iter().enumerate() {
            assert_eq!(&record["run_id"], run_id);
            assert_eq!(record["session_id"], "s1");
            assert_eq!(record["seq"], (i + 1) as u64);
        }
    }

    #[tokio::test]
    async fn paused_run_continues_after_confirmation() {
        let app = app().await;
        let paused = json_body(
            send(
                &app,
                "POST",
                "/playground/agents/assistant/runs",
                Some(json!({ "message": "/delete_notes groceries", "stream": false })),
            )
            .await,
        )
        .await;
        assert_eq!(paused["status"], "paused");
        let run_id = paused["run_id"].as_str().unwrap().to_string();
        let session_id = paused["session_id"].as_str().unwrap().to_string();
        let call_id = paused["pending_tool_calls"][0]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let uri = format!("/playground/agents/assistant/runs/{}/continue", run_id);
        let rejected = send(
            &app,
            "POST",
            &uri,
            Some(json!({ "session_id": session_id, "resolutions": [], "stream": false })),
        )
        .await;
        assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(rejected).await["code"], "invalid-resume");

        let resumed = send(
            &app,
            "POST",
            &uri,
            Some(json!({
                "session_id": session_id,
                "tools": [{ "tool_call_id": call_id, "confirmed": true }],
                "stream": false
            })),
        )
        .await;
        assert_eq!(resumed.status(), StatusCode::OK);
        let body = json_body(resumed).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["run_id"], run_id.as_str());
        assert!(body["content"]
            .as_str()
            .unwrap()
            .starts_with("Tool returned:"));
    }

    #[tokio::test]
    async fn single_shot_workflow_is_buffered() {
        let app = app().await;
        let response = send(
            &app,
            "POST",
            "/playground/workflows/shout/runs",
            Some(json!({ "input": { "message": "quiet" }, "stream": true })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("application/json"));

        let body = json_body(response).await;
        assert_eq!(body["content"], "QUIET");
        assert_eq!(body["status"], "completed");
    }

    #[tokio::test]
    async fn request_errors_use_taxonomy() {
        let app = app().await;

        let response = send(
            &app,
            "POST",
            "/playground/agents/nobody/runs",
            Some(json!({ "message": "hi" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "entity-not-found");

        let response = send(
            &app,
            "POST",
            "/playground/agents/assistant/runs",
            Some(json!({ "input": [1, 2, 3] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "unsupported-input");

        let response = send(
            &app,
            "POST",
            "/playground/workflows/write-and-count/runs/r1/continue",
            Some(json!({ "resolutions": [] })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "invalid-resume");
    }

    #[tokio::test]
    async fn execution_failure_is_a_terminal_event() {
        let app = app().await;
        let response = send(
            &app,
            "POST",
            "/playground/workflows/shout/runs",
            Some(json!({ "input": { "text": "no message" } })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["status"], "errored");
        assert_eq!(body["events"][0]["kind"], "error");
    }
}
