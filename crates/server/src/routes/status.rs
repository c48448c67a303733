//! Playground status endpoint

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use playground_core::EntityKind;

use super::{route_error, RouteError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(default)]
    app_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    playground: &'static str,
    version: &'static str,
    app_id: Option<String>,
    agents: usize,
    teams: usize,
    workflows: usize,
}

async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, RouteError> {
    let config = state.config();
    if let (Some(requested), Some(active)) = (&query.app_id, &config.app_id) {
        if requested != active {
            return Err(route_error(
                StatusCode::NOT_FOUND,
                "app-not-found",
                format!("App not found: {}", requested),
            ));
        }
    }

    let registry = state.dispatcher().registry();
    Ok(Json(StatusResponse {
        playground: "available",
        version: env!("CARGO_PKG_VERSION"),
        app_id: config.app_id.clone(),
        agents: registry.of_kind(EntityKind::Agent).count(),
        teams: registry.of_kind(EntityKind::Team).count(),
        workflows: registry.of_kind(EntityKind::Workflow).count(),
    }))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/playground/status", get(status))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::test_support::{app, json_body, send};

    #[tokio::test]
    async fn status_reports_registry() {
        let app = app().await;
        let response = send(&app, "GET", "/playground/status", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["playground"], "available");
        assert_eq!(body["agents"], 1);
        assert_eq!(body["teams"], 1);
        assert_eq!(body["workflows"], 2);
    }

    #[tokio::test]
    async fn status_checks_app_id() {
        let app = app().await;
        let ok = send(&app, "GET", "/playground/status?app_id=demo-app", None).await;
        assert_eq!(ok.status(), StatusCode::OK);

        let missing = send(&app, "GET", "/playground/status?app_id=other", None).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await["code"], "app-not-found");
    }
}
