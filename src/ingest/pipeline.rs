use crate::catalog::{
    CatalogManager, DataAttribute, Dataset, Map, SourceType, UploadRecord, UploadStatus,
};
use crate::datastore::SpatialStore;
use crate::id::{generate_attribute_id, generate_dataset_id, generate_map_id};
use crate::ingest::report::{parse_info_report, UploadReport};
use crate::ingest::tool::{ConvertOptions, ExternalTool};
use crate::ingest::IngestError;
use crate::stats::compute_dataset_statistics;
use crate::style::{generate_default_data_layer, strip_client_prefix};
use chrono::Utc;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Appended to the upload id to name the ingested table.
pub const TABLE_SUFFIX: &str = "_data";
/// Geometry column the convert tool creates in PostgreSQL.
pub const GEOMETRY_COLUMN: &str = "wkb_geometry";
pub const DEFAULT_TARGET_SRS: &str = "EPSG:4326";
pub const DEFAULT_MINZOOM: f64 = 0.0;
pub const DEFAULT_MAXZOOM: f64 = 22.0;
pub const DEFAULT_CACHE_CONTROL: &str = "max-age=3600";
pub const DEFAULT_MAP_ZOOM: f64 = 3.0;

/// Phrase the info tool prints when no driver can open the file.
const UNSUPPORTED_FORMAT_MARKER: &str = "with the following drivers";
pub const UNSUPPORTED_FORMAT_MESSAGE: &str = "The datasource is not in a supported format.";

const ZIP_CONTENT_TYPES: &[&str] = &["application/zip", "application/x-zip-compressed"];

pub fn table_name(upload_id: &str) -> String {
    format!("{}{}", upload_id, TABLE_SUFFIX)
}

/// Path handed to the tools. Zip archives are read in place through `/vsizip/`.
pub fn datasource_path(upload: &UploadRecord) -> String {
    let is_zip = upload.filename.to_ascii_lowercase().ends_with(".zip")
        || upload
            .content_type
            .as_deref()
            .is_some_and(|ct| ZIP_CONTENT_TYPES.contains(&ct));
    if is_zip {
        format!("/vsizip/{}", upload.path)
    } else {
        upload.path.clone()
    }
}

fn dataset_name(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| filename.to_string())
}

fn expect_status(upload: &UploadRecord, expected: UploadStatus) -> Result<(), IngestError> {
    let actual = upload.status().map_err(IngestError::Catalog)?;
    if actual != expected {
        return Err(IngestError::InvalidState {
            id: upload.id.clone(),
            actual,
            expected,
        });
    }
    Ok(())
}

fn stored_report(upload: &UploadRecord) -> Result<UploadReport, IngestError> {
    let info = upload
        .info_json
        .as_deref()
        .ok_or_else(|| IngestError::NotFound {
            kind: "validation report for upload",
            id: upload.id.clone(),
        })?;
    serde_json::from_str(info).map_err(|e| IngestError::Catalog(e.into()))
}

/// Drives an upload from raw file to dataset and map.
///
/// `process_file` runs validation and ingestion; `complete_upload` runs the
/// finalize, dataset and map steps once the user has reviewed the report. Any
/// failure inside either run marks the upload `error` with the failure message
/// before being returned.
#[derive(Debug, Clone)]
pub struct IngestPipeline {
    catalog: Arc<dyn CatalogManager>,
    store: Arc<dyn SpatialStore>,
    tool: Arc<dyn ExternalTool>,
    target_srs: String,
}

impl IngestPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogManager>,
        store: Arc<dyn SpatialStore>,
        tool: Arc<dyn ExternalTool>,
    ) -> Self {
        Self {
            catalog,
            store,
            tool,
            target_srs: DEFAULT_TARGET_SRS.to_string(),
        }
    }

    pub fn with_target_srs(mut self, target_srs: impl Into<String>) -> Self {
        self.target_srs = target_srs.into();
        self
    }

    /// Validate and ingest an upload in `uploaded` state.
    #[tracing::instrument(name = "process_file", skip(self), fields(mapstudio.upload_id = %upload_id))]
    pub async fn process_file(&self, upload_id: &str) -> Result<UploadReport, IngestError> {
        let mut upload = self.load_upload(upload_id).await?;
        expect_status(&upload, UploadStatus::Uploaded)?;

        let result = async {
            self.advance(&mut upload, UploadStatus::Validating).await?;
            let report = self.validate(&upload).await?;
            self.advance(&mut upload, UploadStatus::Ingesting).await?;
            self.ingest(&upload).await?;
            self.advance(&mut upload, UploadStatus::Done).await?;
            Ok::<_, IngestError>(report)
        }
        .await;

        if let Err(e) = &result {
            self.record_failure(upload_id, e).await;
        } else {
            info!("Upload ingested");
        }
        result
    }

    /// Finalize an ingested upload, then generate its dataset and default map.
    ///
    /// An upload finalizes once. A second call returns
    /// [`IngestError::AlreadyFinalized`] and leaves the upload `done`.
    #[tracing::instrument(name = "complete_upload", skip(self, revised), fields(mapstudio.upload_id = %upload_id))]
    pub async fn complete_upload(
        &self,
        upload_id: &str,
        revised: Option<UploadReport>,
    ) -> Result<(Dataset, Map), IngestError> {
        let upload = self.load_upload(upload_id).await?;
        expect_status(&upload, UploadStatus::Done)?;
        if let Some(existing) = self
            .catalog
            .get_dataset_by_upload(upload_id)
            .await
            .map_err(IngestError::Catalog)?
        {
            // Rejected without touching the upload status.
            return Err(IngestError::AlreadyFinalized {
                id: upload.id,
                dataset_id: existing.id,
            });
        }

        let result = async {
            let revised = match revised {
                Some(report) => report,
                None => stored_report(&upload)?,
            };
            let report = self.finalize_upload(&upload, &revised).await?;
            let dataset = self.generate_dataset(&upload, &report).await?;
            let map = self.generate_map(&upload, &dataset).await?;
            Ok::<_, IngestError>((dataset, map))
        }
        .await;

        match &result {
            Ok((dataset, map)) => info!(
                dataset_id = %dataset.id,
                map_id = %map.id,
                "Upload completed"
            ),
            Err(e) => self.record_failure(upload_id, e).await,
        }
        result
    }

    /// Run the info tool and persist the parsed report as the upload's info.
    #[tracing::instrument(name = "validate_upload", skip(self, upload), fields(mapstudio.upload_id = %upload.id))]
    pub async fn validate(&self, upload: &UploadRecord) -> Result<UploadReport, IngestError> {
        let output = self.tool.inspect(&datasource_path(upload)).await?;
        let text = output.combined();
        if text.contains(UNSUPPORTED_FORMAT_MARKER) {
            return Err(IngestError::Validation(
                UNSUPPORTED_FORMAT_MESSAGE.to_string(),
            ));
        }
        if !output.exited_cleanly() {
            return Err(IngestError::Validation(if text.is_empty() {
                format!("info tool exited with status {:?}", output.exit_code)
            } else {
                text
            }));
        }

        let report = parse_info_report(&output.stdout);
        let info_json = serde_json::to_string(&report).map_err(|e| IngestError::Catalog(e.into()))?;
        self.catalog
            .update_upload_info(&upload.id, &info_json)
            .await
            .map_err(IngestError::Catalog)?;
        info!(
            driver = report.driver.as_deref().unwrap_or("unknown"),
            feature_count = report.feature_count,
            attributes = report.attributes.len(),
            "Upload validated"
        );
        Ok(report)
    }

    /// Load the file into `<upload id>_data`, reprojected to the target SRS.
    #[tracing::instrument(name = "ingest_upload", skip(self, upload), fields(mapstudio.upload_id = %upload.id))]
    pub async fn ingest(&self, upload: &UploadRecord) -> Result<(), IngestError> {
        let options = ConvertOptions {
            connection: self.store.connection_string().to_string(),
            table: table_name(&upload.id),
            target_srs: self.target_srs.clone(),
        };
        let output = self.tool.convert(&datasource_path(upload), &options).await?;

        // The convert tool reports failures on stdout.
        let stdout = output.stdout.trim();
        if output.exited_cleanly() && stdout.is_empty() {
            return Ok(());
        }
        let stderr = output.stderr.trim();
        let message = if !stdout.is_empty() {
            stdout.to_string()
        } else if !stderr.is_empty() {
            stderr.to_string()
        } else {
            format!("convert tool exited with status {:?}", output.exit_code)
        };
        Err(IngestError::Conversion(message))
    }

    /// Apply the revised report to the ingested table: retype changed and integer
    /// columns, drop removed ones. Statements run concurrently and are not
    /// transactional; the first failure is returned after all have finished.
    #[tracing::instrument(name = "finalize_upload", skip(self, upload, revised), fields(mapstudio.upload_id = %upload.id))]
    pub async fn finalize_upload(
        &self,
        upload: &UploadRecord,
        revised: &UploadReport,
    ) -> Result<UploadReport, IngestError> {
        let original = stored_report(upload)?;
        let table = table_name(&upload.id);
        let table = table.as_str();

        let retyped: Vec<_> = revised
            .attributes
            .iter()
            .filter(|a| !a.removed)
            .filter(|a| {
                a.attribute_type == "Integer"
                    || original
                        .attribute(&a.field)
                        .is_some_and(|o| o.attribute_type != a.attribute_type)
            })
            .collect();
        let removed: Vec<_> = revised.attributes.iter().filter(|a| a.removed).collect();

        let alters = join_all(retyped.iter().map(|attribute| async move {
            self.store
                .alter_column_type(table, &attribute.field, attribute.column_type())
                .await
                .map_err(|source| IngestError::SchemaReconciliation {
                    column: attribute.field.clone(),
                    source,
                })
        }));
        let drops = join_all(removed.iter().map(|attribute| async move {
            self.store
                .drop_column(table, &attribute.field)
                .await
                .map_err(|source| IngestError::SchemaReconciliation {
                    column: attribute.field.clone(),
                    source,
                })
        }));
        let (alter_results, drop_results) = futures::join!(alters, drops);

        let mut failures = alter_results
            .into_iter()
            .chain(drop_results)
            .filter_map(Result::err);
        if let Some(first) = failures.next() {
            for other in failures {
                warn!(error = %other, "Additional schema reconciliation failure");
            }
            return Err(first);
        }

        let info_json = serde_json::to_string(revised).map_err(|e| IngestError::Catalog(e.into()))?;
        self.catalog
            .update_upload_info(&upload.id, &info_json)
            .await
            .map_err(IngestError::Catalog)?;
        info!(
            retyped = retyped.len(),
            removed = removed.len(),
            "Ingested table reconciled"
        );
        Ok(revised.clone())
    }

    /// Register the ingested table as a dataset with statistics, extent and size.
    #[tracing::instrument(name = "generate_dataset", skip(self, upload, report), fields(mapstudio.upload_id = %upload.id))]
    pub async fn generate_dataset(
        &self,
        upload: &UploadRecord,
        report: &UploadReport,
    ) -> Result<Dataset, IngestError> {
        let table = table_name(&upload.id);
        let geometry_type = self
            .store
            .geometry_type(&table, GEOMETRY_COLUMN)
            .await
            .map_err(IngestError::Store)?;

        let mut dataset = Dataset {
            id: generate_dataset_id(),
            name: dataset_name(&upload.filename),
            description: None,
            attribution: None,
            source_type: SourceType::Table,
            source: table.clone(),
            geometry_column: GEOMETRY_COLUMN.to_string(),
            geometry_type,
            minzoom: DEFAULT_MINZOOM,
            maxzoom: DEFAULT_MAXZOOM,
            cache_control: Some(DEFAULT_CACHE_CONTROL.to_string()),
            is_private: true,
            extent: None,
            size_bytes: None,
            owner: upload.owner.clone(),
            upload_id: Some(upload.id.clone()),
            created_at: Utc::now(),
            attributes: Vec::new(),
        };
        self.catalog
            .create_dataset(&dataset)
            .await
            .map_err(IngestError::Catalog)?;

        for (position, field) in report.attributes.iter().filter(|a| !a.removed).enumerate() {
            let mut attribute = DataAttribute::new(
                generate_attribute_id(),
                &dataset.id,
                &field.field,
                field.value_type(),
                position as i32,
            );
            attribute.name = Some(field.name.clone());
            self.catalog
                .create_attribute(&attribute)
                .await
                .map_err(IngestError::Catalog)?;
            dataset.attributes.push(attribute);
        }

        compute_dataset_statistics(self.catalog.as_ref(), self.store.as_ref(), &dataset).await?;

        let (extent, size_bytes) = futures::try_join!(
            self.store.extent(&table, GEOMETRY_COLUMN),
            self.store.relation_size(&table),
        )
        .map_err(IngestError::Store)?;
        self.catalog
            .update_dataset_extent(&dataset.id, extent.as_ref(), size_bytes)
            .await
            .map_err(IngestError::Catalog)?;

        self.catalog
            .get_dataset(&dataset.id)
            .await
            .map_err(IngestError::Catalog)?
            .ok_or_else(|| IngestError::NotFound {
                kind: "dataset",
                id: dataset.id.clone(),
            })
    }

    /// Create a map showing `dataset` with one default layer over the default basemap.
    #[tracing::instrument(name = "generate_map", skip(self, upload, dataset), fields(mapstudio.dataset_id = %dataset.id))]
    pub async fn generate_map(
        &self,
        upload: &UploadRecord,
        dataset: &Dataset,
    ) -> Result<Map, IngestError> {
        let basemap = self
            .catalog
            .get_default_basemap()
            .await
            .map_err(IngestError::Catalog)?
            .ok_or(IngestError::NotConfigured("basemap"))?;
        let palette = self
            .catalog
            .get_default_palette()
            .await
            .map_err(IngestError::Catalog)?
            .ok_or(IngestError::NotConfigured("palette"))?;

        let mut layer = generate_default_data_layer(dataset, &palette)?;
        layer.id = strip_client_prefix(&layer.id).to_string();

        // TODO: derive zoom from the extent once product settles on a fit rule.
        let map = Map {
            id: generate_map_id(),
            name: dataset.name.clone(),
            description: dataset.description.clone(),
            center: dataset.extent.map(|extent| extent.center()),
            zoom: Some(DEFAULT_MAP_ZOOM),
            basemap_id: basemap.id,
            layers: vec![layer],
            recipe: Some(format!("upload:{}", upload.id)),
            owner: upload.owner.clone(),
            created_at: Utc::now(),
        };
        self.catalog
            .create_map(&map)
            .await
            .map_err(IngestError::Catalog)?;
        Ok(map)
    }

    async fn load_upload(&self, upload_id: &str) -> Result<UploadRecord, IngestError> {
        self.catalog
            .get_upload(upload_id)
            .await
            .map_err(IngestError::Catalog)?
            .ok_or_else(|| IngestError::upload_not_found(upload_id))
    }

    async fn advance(
        &self,
        upload: &mut UploadRecord,
        next: UploadStatus,
    ) -> Result<(), IngestError> {
        let current = upload.status().map_err(IngestError::Catalog)?;
        if !current.can_transition_to(next) {
            return Err(IngestError::InvalidState {
                id: upload.id.clone(),
                actual: current,
                expected: next,
            });
        }
        self.catalog
            .update_upload_status(&upload.id, next, None)
            .await
            .map_err(IngestError::Catalog)?;
        upload.status = next.as_str().to_string();
        Ok(())
    }

    pub(crate) async fn record_failure(&self, upload_id: &str, err: &IngestError) {
        error!(upload_id, error = %err, "Upload failed");
        if let Err(e) = self
            .catalog
            .update_upload_status(upload_id, UploadStatus::Error, Some(&err.message()))
            .await
        {
            warn!(upload_id, error = %e, "Failed to record upload failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(filename: &str, content_type: Option<&str>) -> UploadRecord {
        UploadRecord {
            id: "upld1".to_string(),
            filename: filename.to_string(),
            content_type: content_type.map(str::to_string),
            size_bytes: 10,
            path: format!("/uploads/upld1/{}", filename),
            status: "uploaded".to_string(),
            info_json: None,
            error: None,
            owner: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_zip_uploads_use_virtual_path() {
        assert_eq!(
            datasource_path(&upload("Parcels.ZIP", None)),
            "/vsizip//uploads/upld1/Parcels.ZIP"
        );
        assert_eq!(
            datasource_path(&upload("bundle", Some("application/x-zip-compressed"))),
            "/vsizip//uploads/upld1/bundle"
        );
        assert_eq!(
            datasource_path(&upload("roads.geojson", Some("application/geo+json"))),
            "/uploads/upld1/roads.geojson"
        );
    }

    #[test]
    fn test_table_and_dataset_names() {
        assert_eq!(table_name("upld1"), "upld1_data");
        assert_eq!(dataset_name("parcels.shp.zip"), "parcels.shp");
        assert_eq!(dataset_name("roads"), "roads");
    }

    #[test]
    fn test_expect_status() {
        let record = upload("a.geojson", None);
        assert!(expect_status(&record, UploadStatus::Uploaded).is_ok());
        assert!(matches!(
            expect_status(&record, UploadStatus::Done),
            Err(IngestError::InvalidState { .. })
        ));
    }
}
