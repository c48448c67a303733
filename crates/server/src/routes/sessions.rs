//! Session and memory endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use playground_core::{Run, SessionSummary, SessionView, UserMemory};

use super::{resolve_entity, run_error, RouteError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryQuery {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionBody {
    pub name: String,
}

async fn list_sessions(
    State(state): State<AppState>,
    Path((kind, entity_id)): Path<(String, String)>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<SessionSummary>>, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;
    let sessions = state
        .dispatcher()
        .list_sessions(&entity_id, query.user_id.as_deref())
        .await
        .map_err(run_error)?;
    Ok(Json(sessions))
}

async fn get_session(
    State(state): State<AppState>,
    Path((kind, entity_id, session_id)): Path<(String, String, String)>,
    Query(query): Query<UserQuery>,
) -> Result<Json<SessionView>, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;
    let view = state
        .dispatcher()
        .get_session(&entity_id, &session_id, query.user_id.as_deref())
        .await
        .map_err(run_error)?;
    Ok(Json(view))
}

async fn delete_session(
    State(state): State<AppState>,
    Path((kind, entity_id, session_id)): Path<(String, String, String)>,
) -> Result<StatusCode, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;
    state
        .dispatcher()
        .delete_session(&entity_id, &session_id)
        .await
        .map_err(run_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn rename_session(
    State(state): State<AppState>,
    Path((kind, entity_id, session_id)): Path<(String, String, String)>,
    Json(body): Json<RenameSessionBody>,
) -> Result<StatusCode, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;
    state
        .dispatcher()
        .rename_session(&entity_id, &session_id, &body.name)
        .await
        .map_err(run_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_run(
    State(state): State<AppState>,
    Path((kind, entity_id, session_id, run_id)): Path<(String, String, String, String)>,
) -> Result<Json<Run>, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;
    let run = state
        .dispatcher()
        .get_run(&entity_id, &session_id, &run_id)
        .await
        .map_err(run_error)?;
    Ok(Json(run))
}

async fn get_memories(
    State(state): State<AppState>,
    Path((kind, entity_id)): Path<(String, String)>,
    Query(query): Query<MemoryQuery>,
) -> Result<Json<Vec<UserMemory>>, RouteError> {
    resolve_entity(&state, &kind, &entity_id)?;
    let memories = state
        .dispatcher()
        .memories(&entity_id, &query.user_id)
        .await
        .map_err(run_error)?;
    Ok(Json(memories))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/playground/{kind}/{id}/sessions", get(list_sessions))
        .route(
            "/playground/{kind}/{id}/sessions/{session_id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/playground/{kind}/{id}/sessions/{session_id}/rename",
            post(rename_session),
        )
        .route(
            "/playground/{kind}/{id}/sessions/{session_id}/runs/{run_id}",
            get(get_run),
        )
        .route("/playground/{kind}/{id}/memories", get(get_memories))
}
