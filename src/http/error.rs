use crate::ingest::IngestError;
use crate::style::StyleError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error with HTTP status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub code: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            code: "NOT_FOUND".to_string(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
            code: "CONFLICT".to_string(),
        }
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: message.into(),
            code: "UNPROCESSABLE_ENTITY".to_string(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
            code: "INTERNAL_SERVER_ERROR".to_string(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
            code: "SERVICE_UNAVAILABLE".to_string(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "code": self.code,
            }
        }));

        (self.status, body).into_response()
    }
}

/// Convert anyhow::Error to ApiError
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<StyleError>() {
            Ok(e) => e.into(),
            Err(err) => match err.downcast::<IngestError>() {
                Ok(e) => e.into(),
                Err(err) => ApiError::internal_error(err.to_string()),
            },
        }
    }
}

impl From<StyleError> for ApiError {
    fn from(e: StyleError) -> Self {
        let constructor = if e.is_not_found() {
            ApiError::not_found
        } else {
            match &e {
                StyleError::MissingLabelStyle
                | StyleError::UnsupportedGeometry(_)
                | StyleError::InvalidTemplate(_) => ApiError::unprocessable,
                _ => ApiError::internal_error,
            }
        };
        constructor(e.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        let constructor = match &e {
            IngestError::NotFound { .. } => ApiError::not_found,
            IngestError::InvalidState { .. } | IngestError::AlreadyFinalized { .. } => {
                ApiError::conflict
            }
            IngestError::Style(style) if style.is_not_found() => ApiError::not_found,
            IngestError::NotConfigured(_) | IngestError::QueueClosed => {
                ApiError::service_unavailable
            }
            err if err.is_user_error() => ApiError::unprocessable,
            _ => ApiError::internal_error,
        };
        constructor(e.message())
    }
}
