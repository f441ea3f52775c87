//! Upload ingestion: validate, ingest, finalize, then generate a dataset and map.
//!
//! Status lifecycle persisted on each upload:
//!
//! ```text
//! uploaded -> validating -> ingesting -> done
//!      \___________\____________\________\___> error (absorbing)
//! ```

mod error;
mod pipeline;
mod report;
mod tool;
mod worker;

pub use error::IngestError;
pub use pipeline::{
    datasource_path, table_name, IngestPipeline, DEFAULT_CACHE_CONTROL, DEFAULT_MAP_ZOOM,
    DEFAULT_MAXZOOM, DEFAULT_MINZOOM, DEFAULT_TARGET_SRS, GEOMETRY_COLUMN, TABLE_SUFFIX,
    UNSUPPORTED_FORMAT_MESSAGE,
};
pub use report::{
    normalize_type, parse_info_report, sanitize_field_name, UploadAttribute, UploadReport,
};
pub use tool::{ConvertOptions, ExternalTool, GdalTool, MockTool, ToolCall, ToolOutput};
pub use worker::{ingest_channel, IngestJob, IngestQueue, IngestWorker, INGEST_CHANNEL_CAPACITY};
