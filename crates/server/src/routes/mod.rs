//! Route handlers

pub mod entities;
pub mod runs;
pub mod sessions;
pub mod status;

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use playground_core::EntityKind;
use run_engine::{Entity, RunError};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type RouteError = (StatusCode, Json<ErrorResponse>);

pub fn route_error(status: StatusCode, code: &str, error: impl Into<String>) -> RouteError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

pub fn status_for(error: &RunError) -> StatusCode {
    match error {
        RunError::EntityNotFound { .. }
        | RunError::SessionNotFound { .. }
        | RunError::RunNotFound { .. }
        | RunError::StorageUnavailable { .. }
        | RunError::MemoryUnavailable { .. } => StatusCode::NOT_FOUND,
        RunError::InvalidResume { .. } | RunError::UnsupportedInput { .. } => {
            StatusCode::BAD_REQUEST
        }
        RunError::SessionConflict { .. } => StatusCode::CONFLICT,
        RunError::Execution { .. } | RunError::Configuration { .. } | RunError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl From<RunError> for ErrorResponse {
    fn from(error: RunError) -> Self {
        Self {
            code: error.code().to_string(),
            error: error.to_string(),
        }
    }
}

pub fn run_error(error: RunError) -> RouteError {
    let status = status_for(&error);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", error);
    } else {
        tracing::debug!("Request rejected: {}", error);
    }
    (status, Json(error.into()))
}

/// Parse a route's kind segment (`agents`, `teams`, `workflows`).
pub fn parse_kind(segment: &str) -> Result<EntityKind, RouteError> {
    EntityKind::from_str(segment)
        .map_err(|e| route_error(StatusCode::NOT_FOUND, "unknown-kind", e.to_string()))
}

/// Look up an entity addressed as `/{kind}/{id}`; a kind mismatch reads as a
/// missing entity.
pub fn resolve_entity<'a>(
    state: &'a AppState,
    kind: &str,
    entity_id: &str,
) -> Result<&'a Entity, RouteError> {
    let kind = parse_kind(kind)?;
    match state.dispatcher().entity(entity_id) {
        Ok(entity) if entity.kind() == kind => Ok(entity),
        Ok(_) => Err(run_error(RunError::EntityNotFound {
            entity_id: entity_id.to_string(),
        })),
        Err(e) => Err(run_error(e)),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, Response},
        Router,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use playground_core::{MemorySessionStore, SessionStore};
    use run_engine::{Dispatcher, EngineConfig};

    use crate::config::ServerConfig;
    use crate::demo;
    use crate::state::AppState;

    pub async fn build_state() -> AppState {
        let storage: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
        let registry = demo::registry(storage).await.unwrap();
        let dispatcher = Dispatcher::new(Arc::new(registry), EngineConfig::default());
        let config = ServerConfig {
            app_id: Some("demo-app".to_string()),
            ..ServerConfig::default()
        };
        AppState::new(dispatcher, config)
    }

    pub async fn app() -> Router {
        crate::router(build_state().await)
    }

    pub async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("Content-Type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        app.clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn json_body(response: Response<Body>) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn text_body(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&RunError::EntityNotFound {
                entity_id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RunError::StorageUnavailable {
                entity_id: "x".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(&RunError::invalid_resume("partial")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RunError::unsupported_input("list")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&RunError::SessionConflict {
                session_id: "s".into()
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_error_body_carries_code() {
        let (status, Json(body)) = run_error(RunError::invalid_resume("missing t2"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "invalid-resume");
        assert!(body.error.contains("missing t2"));
    }
}
