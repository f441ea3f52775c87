pub mod catalog;
pub mod config;
pub mod datastore;
mod engine;
pub mod http;
pub mod id;
pub mod ingest;
pub mod stats;
pub mod style;
pub mod telemetry;

pub use engine::{sanitize_upload_filename, StudioEngine, StudioEngineBuilder};
