pub mod health_controller;
pub mod maps_controller;
pub mod uploads_controller;

pub use health_controller::health_handler;
pub use maps_controller::map_style_handler;
pub use uploads_controller::{
    finalize_upload, get_upload, list_uploads, upload_file, FILENAME_HEADER, MAX_UPLOAD_SIZE,
};
