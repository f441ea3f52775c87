use crate::catalog::UploadRecord;
use crate::ingest::UploadReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response body for POST /v1/uploads
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub id: String,
    pub filename: String,
    pub status: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<UploadRecord> for UploadResponse {
    fn from(upload: UploadRecord) -> Self {
        Self {
            id: upload.id,
            filename: upload.filename,
            status: upload.status,
            size_bytes: upload.size_bytes,
            content_type: upload.content_type,
            created_at: upload.created_at,
        }
    }
}

/// Response body for GET /v1/uploads/{id}
///
/// `info` is the validation report once the upload has been validated; the
/// client edits it and posts it back to finalize.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub id: String,
    pub filename: String,
    pub status: String,
    pub info: Option<UploadReport>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<UploadRecord> for UploadStatusResponse {
    fn from(upload: UploadRecord) -> Self {
        // A report that no longer parses is omitted rather than failing the poll.
        let info = upload
            .info_json
            .as_deref()
            .and_then(|json| serde_json::from_str(json).ok());
        Self {
            id: upload.id,
            filename: upload.filename,
            status: upload.status,
            info,
            error: upload.error,
            updated_at: upload.updated_at,
        }
    }
}

/// Response body for GET /v1/uploads
#[derive(Debug, Serialize, Deserialize)]
pub struct ListUploadsResponse {
    pub uploads: Vec<UploadResponse>,
}

/// Request body for POST /v1/uploads/{id}/finalize. An absent `info` keeps the
/// stored report.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FinalizeUploadRequest {
    #[serde(default)]
    pub info: Option<UploadReport>,
}

/// Response body for POST /v1/uploads/{id}/finalize
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalizeUploadResponse {
    pub upload_id: String,
    pub dataset_id: String,
    pub map_id: String,
}
