//! Entity listing endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use run_engine::EntityDescriptor;

use super::{parse_kind, resolve_entity, RouteError};
use crate::state::AppState;

async fn list_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<Vec<EntityDescriptor>>, RouteError> {
    let kind = parse_kind(&kind)?;
    Ok(Json(state.dispatcher().entities(Some(kind))))
}

async fn get_entity(
    State(state): State<AppState>,
    Path((kind, entity_id)): Path<(String, String)>,
) -> Result<Json<EntityDescriptor>, RouteError> {
    let entity = resolve_entity(&state, &kind, &entity_id)?;
    Ok(Json(entity.descriptor()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/playground/{kind}", get(list_entities))
        .route("/playground/{kind}/{id}", get(get_entity))
}
