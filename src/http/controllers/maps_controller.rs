use crate::http::error::ApiError;
use crate::StudioEngine;
use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

/// Handler for GET /v1/maps/{id}/style
#[tracing::instrument(name = "handler_map_style", skip(engine), fields(mapstudio.map_id = %map_id))]
pub async fn map_style_handler(
    State(engine): State<Arc<StudioEngine>>,
    Path(map_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let style = engine.map_style(&map_id).await?;
    Ok(Json(style))
}
