use crate::catalog::UploadStatus;
use crate::http::error::ApiError;
use crate::http::models::{
    FinalizeUploadRequest, FinalizeUploadResponse, ListUploadsResponse, UploadResponse,
    UploadStatusResponse,
};
use crate::ingest::IngestError;
use crate::StudioEngine;
use axum::{
    body::Bytes,
    extract::{Path, Query as QueryParams, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

/// Query parameters for listing uploads
#[derive(Debug, Deserialize)]
pub struct ListUploadsParams {
    pub status: Option<String>,
}

/// Maximum upload size: 2GB
pub const MAX_UPLOAD_SIZE: usize = 2 * 1024 * 1024 * 1024;

/// Original filename of a raw-body upload. The extension selects the GDAL driver.
pub const FILENAME_HEADER: &str = "x-filename";

/// Handler for POST /v1/uploads - Upload a geospatial file
#[tracing::instrument(
    name = "handler_upload_file",
    skip(engine, headers, body),
    fields(
        mapstudio.upload_id = tracing::field::Empty,
        mapstudio.size_bytes = tracing::field::Empty,
        mapstudio.content_type = tracing::field::Empty,
    )
)]
pub async fn upload_file(
    State(engine): State<Arc<StudioEngine>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    if body.is_empty() {
        return Err(ApiError::bad_request("Upload cannot be empty"));
    }

    if body.len() > MAX_UPLOAD_SIZE {
        return Err(ApiError::bad_request(format!(
            "Upload exceeds maximum size of {} bytes",
            MAX_UPLOAD_SIZE
        )));
    }

    let filename = headers
        .get(FILENAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("Missing '{}' header", FILENAME_HEADER)))?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let upload = engine
        .store_upload(filename, content_type, &body, None)
        .await?;

    tracing::Span::current()
        .record("mapstudio.upload_id", &upload.id)
        .record("mapstudio.size_bytes", upload.size_bytes)
        .record(
            "mapstudio.content_type",
            upload.content_type.as_deref().unwrap_or(""),
        );

    Ok((StatusCode::CREATED, Json(upload.into())))
}

/// Handler for GET /v1/uploads - List uploads
#[tracing::instrument(
    name = "handler_list_uploads",
    skip(engine),
    fields(mapstudio.upload_count = tracing::field::Empty)
)]
pub async fn list_uploads(
    State(engine): State<Arc<StudioEngine>>,
    QueryParams(params): QueryParams<ListUploadsParams>,
) -> Result<Json<ListUploadsResponse>, ApiError> {
    let status = match params.status.as_deref() {
        Some(s) => Some(
            UploadStatus::parse(s)
                .ok_or_else(|| ApiError::bad_request(format!("Unknown upload status '{}'", s)))?,
        ),
        None => None,
    };
    let uploads = engine.list_uploads(status).await?;

    tracing::Span::current().record("mapstudio.upload_count", uploads.len());

    Ok(Json(ListUploadsResponse {
        uploads: uploads.into_iter().map(UploadResponse::from).collect(),
    }))
}

/// Handler for GET /v1/uploads/{id} - Poll upload status
#[tracing::instrument(name = "handler_get_upload", skip(engine), fields(mapstudio.upload_id = %upload_id))]
pub async fn get_upload(
    State(engine): State<Arc<StudioEngine>>,
    Path(upload_id): Path<String>,
) -> Result<Json<UploadStatusResponse>, ApiError> {
    let upload = engine
        .get_upload(&upload_id)
        .await?
        .ok_or_else(|| IngestError::upload_not_found(&upload_id))?;
    Ok(Json(upload.into()))
}

/// Handler for POST /v1/uploads/{id}/finalize - Apply the revised report and
/// generate the dataset and map
#[tracing::instrument(
    name = "handler_finalize_upload",
    skip(engine, request),
    fields(
        mapstudio.upload_id = %upload_id,
        mapstudio.dataset_id = tracing::field::Empty,
        mapstudio.map_id = tracing::field::Empty,
    )
)]
pub async fn finalize_upload(
    State(engine): State<Arc<StudioEngine>>,
    Path(upload_id): Path<String>,
    request: Option<Json<FinalizeUploadRequest>>,
) -> Result<(StatusCode, Json<FinalizeUploadResponse>), ApiError> {
    let revised = request.and_then(|Json(r)| r.info);
    let (dataset, map) = engine.complete_upload(&upload_id, revised).await?;

    tracing::Span::current()
        .record("mapstudio.dataset_id", &dataset.id)
        .record("mapstudio.map_id", &map.id);

    Ok((
        StatusCode::CREATED,
        Json(FinalizeUploadResponse {
            upload_id,
            dataset_id: dataset.id,
            map_id: map.id,
        }),
    ))
}
