use crate::catalog::models::{
    Basemap, DataAttribute, Dataset, Extent, Map, Palette, UploadRecord, UploadStatus,
};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Async interface for catalog operations.
///
/// The catalog persists uploads, datasets with their attributes, maps with their
/// layers, basemaps and palettes. Writes are individual statements; callers that
/// update several rows (statistics, map layers) accept partial application on failure.
#[async_trait]
pub trait CatalogManager: Debug + Send + Sync {
    /// Close the catalog connection. This is idempotent and can be called multiple times.
    async fn close(&self) -> Result<()> {
        // Default implementation does nothing - sqlx pools handle cleanup automatically
        Ok(())
    }

    /// Apply any pending schema migrations. Should be idempotent.
    async fn run_migrations(&self) -> Result<()>;

    // Uploads

    async fn create_upload(&self, upload: &UploadRecord) -> Result<()>;
    async fn get_upload(&self, id: &str) -> Result<Option<UploadRecord>>;
    async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<UploadRecord>>;

    /// Persist a new lifecycle status. `error` replaces the stored error message.
    async fn update_upload_status(
        &self,
        id: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<()>;

    /// Replace the validation report stored on the upload.
    async fn update_upload_info(&self, id: &str, info_json: &str) -> Result<()>;

    // Datasets and attributes

    /// Insert the dataset row. Attributes are created separately.
    async fn create_dataset(&self, dataset: &Dataset) -> Result<()>;

    /// Fetch a dataset with its attributes attached in position order.
    async fn get_dataset(&self, id: &str) -> Result<Option<Dataset>>;

    /// Fetch the dataset generated from an upload, if it has been finalized.
    async fn get_dataset_by_upload(&self, upload_id: &str) -> Result<Option<Dataset>>;

    async fn update_dataset_extent(
        &self,
        id: &str,
        extent: Option<&Extent>,
        size_bytes: Option<i64>,
    ) -> Result<()>;

    async fn create_attribute(&self, attribute: &DataAttribute) -> Result<()>;
    async fn list_attributes(&self, dataset_id: &str) -> Result<Vec<DataAttribute>>;

    /// Persist min/max, quantiles and categories of one attribute.
    async fn update_attribute_statistics(&self, attribute: &DataAttribute) -> Result<()>;

    // Maps

    /// Insert the map row followed by each of its layers.
    async fn create_map(&self, map: &Map) -> Result<()>;

    /// Fetch a map with its layers in position order.
    async fn get_map(&self, id: &str) -> Result<Option<Map>>;

    // Basemaps and palettes

    async fn create_basemap(&self, basemap: &Basemap) -> Result<()>;
    async fn get_basemap(&self, id: &str) -> Result<Option<Basemap>>;
    async fn get_default_basemap(&self) -> Result<Option<Basemap>>;

    async fn create_palette(&self, palette: &Palette) -> Result<()>;
    async fn get_palette(&self, id: &str) -> Result<Option<Palette>>;
    async fn get_default_palette(&self) -> Result<Option<Palette>>;
}
