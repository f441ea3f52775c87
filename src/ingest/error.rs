use crate::catalog::UploadStatus;
use crate::stats::StatisticsError;
use crate::style::StyleError;
use thiserror::Error;

/// Errors raised by the ingestion pipeline.
///
/// The `Display` output of each variant is what gets persisted into an upload's
/// `error` field, so validation and conversion failures carry the tool-derived text
/// unchanged.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The info tool rejected the file or could not read it.
    #[error("{0}")]
    Validation(String),

    /// The convert tool failed; the message is its captured standard output.
    #[error("{0}")]
    Conversion(String),

    #[error("{tool} did not finish within {seconds} seconds")]
    ToolTimeout { tool: String, seconds: u64 },

    #[error("failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// A finalize DDL statement failed. Statements that already succeeded stay applied.
    #[error("failed to update column '{column}': {source}")]
    SchemaReconciliation {
        column: String,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Statistics(#[from] StatisticsError),

    /// The default layer could not be built for the new dataset.
    #[error(transparent)]
    Style(#[from] StyleError),

    /// A required default (basemap or palette) does not exist in the catalog.
    #[error("no default {0} is configured")]
    NotConfigured(&'static str),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("upload '{id}' is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        actual: UploadStatus,
        expected: UploadStatus,
    },

    #[error("upload '{id}' was already finalized as dataset '{dataset_id}'")]
    AlreadyFinalized { id: String, dataset_id: String },

    /// The ingestion task panicked before it could finish.
    #[error("ingestion stopped unexpectedly")]
    Aborted,

    #[error("ingestion queue is closed")]
    QueueClosed,

    #[error("catalog error: {0}")]
    Catalog(#[source] anyhow::Error),

    #[error("spatial store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// User-facing message recorded on the failed upload.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn upload_not_found(id: &str) -> Self {
        Self::NotFound {
            kind: "upload",
            id: id.to_string(),
        }
    }

    /// Whether the failure was caused by the input rather than the service.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::Conversion(_)
                | Self::SchemaReconciliation { .. }
                | Self::InvalidState { .. }
                | Self::AlreadyFinalized { .. }
        )
    }
}
