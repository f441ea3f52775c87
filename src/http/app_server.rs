use crate::http::controllers::{
    finalize_upload, get_upload, health_handler, list_uploads, map_style_handler, upload_file,
    MAX_UPLOAD_SIZE,
};
use crate::StudioEngine;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub struct AppServer {
    pub router: Router,
    pub engine: Arc<StudioEngine>,
}

pub const PATH_HEALTH: &str = "/health";
pub const PATH_UPLOADS: &str = "/v1/uploads";
pub const PATH_UPLOAD: &str = "/v1/uploads/{id}";
pub const PATH_UPLOAD_FINALIZE: &str = "/v1/uploads/{id}/finalize";
pub const PATH_MAP_STYLE: &str = "/v1/maps/{id}/style";

impl AppServer {
    pub fn new(engine: StudioEngine) -> Self {
        Self::from_shared(Arc::new(engine))
    }

    pub fn from_shared(engine: Arc<StudioEngine>) -> Self {
        AppServer {
            router: Router::new()
                .route(PATH_HEALTH, get(health_handler))
                .route(
                    PATH_UPLOADS,
                    post(upload_file)
                        .get(list_uploads)
                        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE)),
                )
                .route(PATH_UPLOAD, get(get_upload))
                .route(PATH_UPLOAD_FINALIZE, post(finalize_upload))
                .route(PATH_MAP_STYLE, get(map_style_handler))
                .with_state(engine.clone()),
            engine,
        }
    }
}
