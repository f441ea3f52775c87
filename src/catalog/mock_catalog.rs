//! Mock catalog implementation for testing.
//!
//! Provides an in-memory implementation of `CatalogManager` that can be used
//! in tests to avoid needing a real database.

use super::{
    Basemap, CatalogManager, DataAttribute, Dataset, Extent, Map, Palette, UploadRecord,
    UploadStatus,
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// In-memory catalog that can be configured to fail for testing error handling.
#[derive(Debug, Default)]
pub struct MockCatalog {
    uploads: Mutex<HashMap<String, UploadRecord>>,
    datasets: Mutex<HashMap<String, Dataset>>,
    attributes: Mutex<HashMap<String, DataAttribute>>,
    maps: Mutex<HashMap<String, Map>>,
    basemaps: Mutex<Vec<Basemap>>,
    palettes: Mutex<Vec<Palette>>,
    status_history: Mutex<HashMap<String, Vec<UploadStatus>>>,
    fail_statistics_update: AtomicBool,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure whether attribute statistics updates should fail.
    pub fn set_fail_statistics_update(&self, fail: bool) {
        self.fail_statistics_update.store(fail, Ordering::SeqCst);
    }

    /// Every status written for an upload, in write order.
    pub fn status_history(&self, upload_id: &str) -> Vec<UploadStatus> {
        self.status_history
            .lock()
            .unwrap()
            .get(upload_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn dataset_count(&self) -> usize {
        self.datasets.lock().unwrap().len()
    }

    fn attributes_for(&self, dataset_id: &str) -> Vec<DataAttribute> {
        let mut attributes: Vec<DataAttribute> = self
            .attributes
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.dataset_id == dataset_id)
            .cloned()
            .collect();
        attributes.sort_by_key(|a| a.position);
        attributes
    }
}

#[async_trait]
impl CatalogManager for MockCatalog {
    async fn run_migrations(&self) -> Result<()> {
        Ok(())
    }

    async fn create_upload(&self, upload: &UploadRecord) -> Result<()> {
        self.uploads
            .lock()
            .unwrap()
            .insert(upload.id.clone(), upload.clone());
        Ok(())
    }

    async fn get_upload(&self, id: &str) -> Result<Option<UploadRecord>> {
        Ok(self.uploads.lock().unwrap().get(id).cloned())
    }

    async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<UploadRecord>> {
        let mut uploads: Vec<UploadRecord> = self
            .uploads
            .lock()
            .unwrap()
            .values()
            .filter(|u| status.map_or(true, |s| u.status == s.as_str()))
            .cloned()
            .collect();
        uploads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(uploads)
    }

    async fn update_upload_status(
        &self,
        id: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(id)
            .ok_or_else(|| anyhow!("Upload '{}' not found", id))?;
        upload.status = status.as_str().to_string();
        upload.error = error.map(str::to_string);
        upload.updated_at = Utc::now();
        self.status_history
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push(status);
        Ok(())
    }

    async fn update_upload_info(&self, id: &str, info_json: &str) -> Result<()> {
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads
            .get_mut(id)
            .ok_or_else(|| anyhow!("Upload '{}' not found", id))?;
        upload.info_json = Some(info_json.to_string());
        upload.updated_at = Utc::now();
        Ok(())
    }

    async fn create_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut stored = dataset.clone();
        stored.attributes.clear();
        self.datasets
            .lock()
            .unwrap()
            .insert(dataset.id.clone(), stored);
        Ok(())
    }

    async fn get_dataset(&self, id: &str) -> Result<Option<Dataset>> {
        let dataset = self.datasets.lock().unwrap().get(id).cloned();
        Ok(dataset.map(|mut d| {
            d.attributes = self.attributes_for(id);
            d
        }))
    }

    async fn get_dataset_by_upload(&self, upload_id: &str) -> Result<Option<Dataset>> {
        let dataset = self
            .datasets
            .lock()
            .unwrap()
            .values()
            .filter(|d| d.upload_id.as_deref() == Some(upload_id))
            .min_by_key(|d| d.created_at)
            .cloned();
        Ok(dataset.map(|mut d| {
            d.attributes = self.attributes_for(&d.id);
            d
        }))
    }

    async fn update_dataset_extent(
        &self,
        id: &str,
        extent: Option<&Extent>,
        size_bytes: Option<i64>,
    ) -> Result<()> {
        let mut datasets = self.datasets.lock().unwrap();
        let dataset = datasets
            .get_mut(id)
            .ok_or_else(|| anyhow!("Dataset '{}' not found", id))?;
        dataset.extent = extent.copied();
        dataset.size_bytes = size_bytes;
        Ok(())
    }

    async fn create_attribute(&self, attribute: &DataAttribute) -> Result<()> {
        self.attributes
            .lock()
            .unwrap()
            .insert(attribute.id.clone(), attribute.clone());
        Ok(())
    }

    async fn list_attributes(&self, dataset_id: &str) -> Result<Vec<DataAttribute>> {
        Ok(self.attributes_for(dataset_id))
    }

    async fn update_attribute_statistics(&self, attribute: &DataAttribute) -> Result<()> {
        if self.fail_statistics_update.load(Ordering::SeqCst) {
            return Err(anyhow!("Mock statistics update failure"));
        }
        let mut attributes = self.attributes.lock().unwrap();
        let stored = attributes
            .get_mut(&attribute.id)
            .ok_or_else(|| anyhow!("Attribute '{}' not found", attribute.id))?;
        stored.minimum = attribute.minimum;
        stored.maximum = attribute.maximum;
        stored.quantiles_5 = attribute.quantiles_5.clone();
        stored.quantiles_10 = attribute.quantiles_10.clone();
        stored.categorical = attribute.categorical;
        stored.categories = attribute.categories.clone();
        Ok(())
    }

    async fn create_map(&self, map: &Map) -> Result<()> {
        self.maps.lock().unwrap().insert(map.id.clone(), map.clone());
        Ok(())
    }

    async fn get_map(&self, id: &str) -> Result<Option<Map>> {
        Ok(self.maps.lock().unwrap().get(id).cloned().map(|mut m| {
            m.layers.sort_by_key(|l| l.position);
            m
        }))
    }

    async fn create_basemap(&self, basemap: &Basemap) -> Result<()> {
        self.basemaps.lock().unwrap().push(basemap.clone());
        Ok(())
    }

    async fn get_basemap(&self, id: &str) -> Result<Option<Basemap>> {
        Ok(self
            .basemaps
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == id)
            .cloned())
    }

    async fn get_default_basemap(&self) -> Result<Option<Basemap>> {
        Ok(self
            .basemaps
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.is_default)
            .cloned())
    }

    async fn create_palette(&self, palette: &Palette) -> Result<()> {
        self.palettes.lock().unwrap().push(palette.clone());
        Ok(())
    }

    async fn get_palette(&self, id: &str) -> Result<Option<Palette>> {
        Ok(self
            .palettes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn get_default_palette(&self) -> Result<Option<Palette>> {
        Ok(self
            .palettes
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.is_default)
            .cloned())
    }
}
