//! Database backend abstraction for the catalog.
//!
//! This module provides a generic database backend that works with any sqlx-compatible
//! database (currently Postgres and SQLite). It abstracts over database-specific differences
//! like parameter binding syntax while providing a unified API for catalog operations.
//!
//! # Architecture
//!
//! The [`CatalogBackend`] struct is parameterized by a database type that implements
//! [`CatalogDatabase`]. This trait extends sqlx's `Database` trait with additional
//! functionality needed for cross-database compatibility.
//!
//! # Example
//!
//! ```ignore
//! use mapstudio::catalog::backend::CatalogBackend;
//! use sqlx::SqlitePool;
//!
//! let pool = SqlitePool::connect("sqlite::memory:").await?;
//! let backend = CatalogBackend::new(pool);
//! let upload = backend.get_upload("upld...").await?;
//! ```

use crate::catalog::models::{
    to_json_column, Basemap, BasemapRow, DataAttribute, DataAttributeRow, Dataset, DatasetRow,
    Extent, Map, MapLayer, MapLayerRow, MapRow, Palette, PaletteRow, UploadRecord, UploadStatus,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{
    query, query_as, ColumnIndex, Database, Decode, Encode, Executor, FromRow, IntoArguments,
    Pool, Postgres, Sqlite, Type,
};
use std::borrow::Cow;

/// Extension trait for sqlx databases that provides catalog-specific functionality.
///
/// This trait handles differences in SQL syntax between database backends,
/// particularly parameter binding syntax (e.g., `$1` for Postgres vs `?` for SQLite).
pub trait CatalogDatabase: Database {
    /// Returns the parameter placeholder for the given 1-based index.
    ///
    /// - Postgres uses `$1`, `$2`, etc.
    /// - SQLite uses `?` for all parameters (index is ignored).
    fn bind_param(index: usize) -> Cow<'static, str>;
}

impl CatalogDatabase for Postgres {
    fn bind_param(index: usize) -> Cow<'static, str> {
        Cow::Owned(format!("${}", index))
    }
}

impl CatalogDatabase for Sqlite {
    fn bind_param(_: usize) -> Cow<'static, str> {
        Cow::Borrowed("?")
    }
}

/// Comma-separated placeholders `start..start + count`.
fn params<DB: CatalogDatabase>(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| DB::bind_param(i).into_owned())
        .collect::<Vec<_>>()
        .join(", ")
}

const UPLOAD_COLUMNS: &str = "id, filename, content_type, size_bytes, path, status, info_json, \
     error, owner, created_at, updated_at";

const DATASET_COLUMNS: &str = "id, name, description, attribution, source_type, source, \
     geometry_column, geometry_type, minzoom, maxzoom, cache_control, is_private, extent_json, \
     size_bytes, owner, upload_id, created_at";

const ATTRIBUTE_COLUMNS: &str = "id, dataset_id, field, sql, attribute_type, name, description, \
     unit, minimum, maximum, quantiles_5, quantiles_10, categorical, categories, position";

const MAP_COLUMNS: &str =
    "id, name, description, center_lng, center_lat, zoom, basemap_id, recipe, owner, created_at";

const LAYER_COLUMNS: &str = "id, dataset_id, layer_type, palette_id, palette_inverted, \
     color_mode, color_attribute, color, size_mode, size_attribute, size, label_attribute, \
     opacity, visible, position";

/// Generic database backend for catalog operations.
///
/// Wraps a sqlx connection pool and provides methods for managing uploads, datasets,
/// maps and style resources in the catalog. Works with any database that implements
/// [`CatalogDatabase`].
pub struct CatalogBackend<DB: CatalogDatabase> {
    pool: Pool<DB>,
}

impl<DB: CatalogDatabase> CatalogBackend<DB> {
    /// Creates a new backend with the given connection pool.
    pub fn new(pool: Pool<DB>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying connection pool.
    pub fn pool(&self) -> &Pool<DB> {
        &self.pool
    }
}

impl<DB> CatalogBackend<DB>
where
    DB: CatalogDatabase,
    UploadRecord: for<'r> FromRow<'r, DB::Row>,
    DatasetRow: for<'r> FromRow<'r, DB::Row>,
    DataAttributeRow: for<'r> FromRow<'r, DB::Row>,
    MapRow: for<'r> FromRow<'r, DB::Row>,
    MapLayerRow: for<'r> FromRow<'r, DB::Row>,
    BasemapRow: for<'r> FromRow<'r, DB::Row>,
    PaletteRow: for<'r> FromRow<'r, DB::Row>,
    for<'q> &'q str: Encode<'q, DB> + Type<DB>,
    for<'q> String: Encode<'q, DB> + Type<DB>,
    for<'q> Option<&'q str>: Encode<'q, DB> + Type<DB>,
    for<'q> Option<String>: Encode<'q, DB> + Type<DB>,
    for<'q> i32: Encode<'q, DB> + Type<DB>,
    for<'q> i64: Encode<'q, DB> + Type<DB>,
    for<'q> Option<i64>: Encode<'q, DB> + Type<DB>,
    for<'q> f64: Encode<'q, DB> + Type<DB>,
    for<'q> Option<f64>: Encode<'q, DB> + Type<DB>,
    for<'q> bool: Encode<'q, DB> + Type<DB>,
    for<'r> bool: Decode<'r, DB>,
    for<'q> DateTime<Utc>: Encode<'q, DB> + Type<DB>,
    for<'q> <DB as Database>::Arguments<'q>: IntoArguments<'q, DB> + Send,
    for<'c> &'c Pool<DB>: Executor<'c, Database = DB>,
    for<'c> &'c mut <DB as Database>::Connection: Executor<'c, Database = DB>,
    usize: ColumnIndex<DB::Row>,
{
    // ---------------------------------------------------------------------
    // Uploads
    // ---------------------------------------------------------------------

    #[tracing::instrument(
        name = "catalog_create_upload",
        skip(self, upload),
        fields(mapstudio.upload_id = %upload.id)
    )]
    pub async fn create_upload(&self, upload: &UploadRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO uploads ({}) VALUES ({})",
            UPLOAD_COLUMNS,
            params::<DB>(1, 11)
        );

        query(&sql)
            .bind(upload.id.as_str())
            .bind(upload.filename.as_str())
            .bind(upload.content_type.as_deref())
            .bind(upload.size_bytes)
            .bind(upload.path.as_str())
            .bind(upload.status.as_str())
            .bind(upload.info_json.as_deref())
            .bind(upload.error.as_deref())
            .bind(upload.owner.as_deref())
            .bind(upload.created_at)
            .bind(upload.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_upload(&self, id: &str) -> Result<Option<UploadRecord>> {
        let sql = format!(
            "SELECT {} FROM uploads WHERE id = {}",
            UPLOAD_COLUMNS,
            DB::bind_param(1)
        );

        query_as::<DB, UploadRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Into::into)
    }

    pub async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<UploadRecord>> {
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM uploads WHERE status = {} ORDER BY created_at DESC",
                    UPLOAD_COLUMNS,
                    DB::bind_param(1)
                );
                query_as::<DB, UploadRecord>(&sql)
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
                    .map_err(Into::into)
            }
            None => {
                let sql = format!(
                    "SELECT {} FROM uploads ORDER BY created_at DESC",
                    UPLOAD_COLUMNS
                );
                query_as::<DB, UploadRecord>(&sql)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(Into::into)
            }
        }
    }

    #[tracing::instrument(
        name = "catalog_update_upload_status",
        skip(self, error),
        fields(mapstudio.upload_id = %id, mapstudio.status = %status)
    )]
    pub async fn update_upload_status(
        &self,
        id: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE uploads SET status = {}, error = {}, updated_at = {} WHERE id = {}",
            DB::bind_param(1),
            DB::bind_param(2),
            DB::bind_param(3),
            DB::bind_param(4)
        );

        query(&sql)
            .bind(status.as_str())
            .bind(error)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn update_upload_info(&self, id: &str, info_json: &str) -> Result<()> {
        let sql = format!(
            "UPDATE uploads SET info_json = {}, updated_at = {} WHERE id = {}",
            DB::bind_param(1),
            DB::bind_param(2),
            DB::bind_param(3)
        );

        query(&sql)
            .bind(info_json)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Datasets and attributes
    // ---------------------------------------------------------------------

    #[tracing::instrument(
        name = "catalog_create_dataset",
        skip(self, dataset),
        fields(mapstudio.dataset_id = %dataset.id)
    )]
    pub async fn create_dataset(&self, dataset: &Dataset) -> Result<()> {
        let sql = format!(
            "INSERT INTO datasets ({}) VALUES ({})",
            DATASET_COLUMNS,
            params::<DB>(1, 17)
        );

        query(&sql)
            .bind(dataset.id.as_str())
            .bind(dataset.name.as_str())
            .bind(dataset.description.as_deref())
            .bind(dataset.attribution.as_deref())
            .bind(dataset.source_type.as_str())
            .bind(dataset.source.as_str())
            .bind(dataset.geometry_column.as_str())
            .bind(dataset.geometry_type.as_deref())
            .bind(dataset.minzoom)
            .bind(dataset.maxzoom)
            .bind(dataset.cache_control.as_deref())
            .bind(dataset.is_private)
            .bind(to_json_column(dataset.extent.as_ref())?)
            .bind(dataset.size_bytes)
            .bind(dataset.owner.as_deref())
            .bind(dataset.upload_id.as_deref())
            .bind(dataset.created_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_dataset(&self, id: &str) -> Result<Option<Dataset>> {
        let sql = format!(
            "SELECT {} FROM datasets WHERE id = {}",
            DATASET_COLUMNS,
            DB::bind_param(1)
        );

        let row = query_as::<DB, DatasetRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut dataset = Dataset::try_from(row)?;
                dataset.attributes = self.list_attributes(id).await?;
                Ok(Some(dataset))
            }
            None => Ok(None),
        }
    }

    pub async fn get_dataset_by_upload(&self, upload_id: &str) -> Result<Option<Dataset>> {
        let sql = format!(
            "SELECT {} FROM datasets WHERE upload_id = {} ORDER BY created_at LIMIT 1",
            DATASET_COLUMNS,
            DB::bind_param(1)
        );

        let row = query_as::<DB, DatasetRow>(&sql)
            .bind(upload_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let mut dataset = Dataset::try_from(row)?;
                dataset.attributes = self.list_attributes(&dataset.id).await?;
                Ok(Some(dataset))
            }
            None => Ok(None),
        }
    }

    pub async fn update_dataset_extent(
        &self,
        id: &str,
        extent: Option<&Extent>,
        size_bytes: Option<i64>,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE datasets SET extent_json = {}, size_bytes = {} WHERE id = {}",
            DB::bind_param(1),
            DB::bind_param(2),
            DB::bind_param(3)
        );

        query(&sql)
            .bind(to_json_column(extent)?)
            .bind(size_bytes)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn create_attribute(&self, attribute: &DataAttribute) -> Result<()> {
        let sql = format!(
            "INSERT INTO data_attributes ({}) VALUES ({})",
            ATTRIBUTE_COLUMNS,
            params::<DB>(1, 15)
        );

        query(&sql)
            .bind(attribute.id.as_str())
            .bind(attribute.dataset_id.as_str())
            .bind(attribute.field.as_str())
            .bind(attribute.sql.as_deref())
            .bind(attribute.attribute_type.as_str())
            .bind(attribute.name.as_deref())
            .bind(attribute.description.as_deref())
            .bind(attribute.unit.as_deref())
            .bind(attribute.minimum)
            .bind(attribute.maximum)
            .bind(to_json_column(attribute.quantiles_5.as_ref())?)
            .bind(to_json_column(attribute.quantiles_10.as_ref())?)
            .bind(attribute.categorical)
            .bind(to_json_column(attribute.categories.as_ref())?)
            .bind(attribute.position)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn list_attributes(&self, dataset_id: &str) -> Result<Vec<DataAttribute>> {
        let sql = format!(
            "SELECT {} FROM data_attributes WHERE dataset_id = {} ORDER BY position",
            ATTRIBUTE_COLUMNS,
            DB::bind_param(1)
        );

        query_as::<DB, DataAttributeRow>(&sql)
            .bind(dataset_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(DataAttribute::try_from)
            .collect()
    }

    #[tracing::instrument(
        name = "catalog_update_attribute_statistics",
        skip(self, attribute),
        fields(mapstudio.attribute_id = %attribute.id, mapstudio.field = %attribute.field)
    )]
    pub async fn update_attribute_statistics(&self, attribute: &DataAttribute) -> Result<()> {
        let sql = format!(
            "UPDATE data_attributes SET minimum = {}, maximum = {}, quantiles_5 = {}, \
             quantiles_10 = {}, categorical = {}, categories = {} WHERE id = {}",
            DB::bind_param(1),
            DB::bind_param(2),
            DB::bind_param(3),
            DB::bind_param(4),
            DB::bind_param(5),
            DB::bind_param(6),
            DB::bind_param(7)
        );

        query(&sql)
            .bind(attribute.minimum)
            .bind(attribute.maximum)
            .bind(to_json_column(attribute.quantiles_5.as_ref())?)
            .bind(to_json_column(attribute.quantiles_10.as_ref())?)
            .bind(attribute.categorical)
            .bind(to_json_column(attribute.categories.as_ref())?)
            .bind(attribute.id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Maps
    // ---------------------------------------------------------------------

    #[tracing::instrument(
        name = "catalog_create_map",
        skip(self, map),
        fields(mapstudio.map_id = %map.id, mapstudio.layer_count = map.layers.len())
    )]
    pub async fn create_map(&self, map: &Map) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let map_sql = format!(
            "INSERT INTO maps ({}) VALUES ({})",
            MAP_COLUMNS,
            params::<DB>(1, 10)
        );
        query(&map_sql)
            .bind(map.id.as_str())
            .bind(map.name.as_str())
            .bind(map.description.as_deref())
            .bind(map.center.map(|c| c[0]))
            .bind(map.center.map(|c| c[1]))
            .bind(map.zoom)
            .bind(map.basemap_id.as_str())
            .bind(map.recipe.as_deref())
            .bind(map.owner.as_deref())
            .bind(map.created_at)
            .execute(&mut *tx)
            .await?;

        let layer_sql = format!(
            "INSERT INTO map_layers (map_id, {}) VALUES ({})",
            LAYER_COLUMNS,
            params::<DB>(1, 16)
        );
        for layer in &map.layers {
            query(&layer_sql)
                .bind(map.id.as_str())
                .bind(layer.id.as_str())
                .bind(layer.dataset_id.as_str())
                .bind(layer.layer_type.as_str())
                .bind(layer.palette_id.as_deref())
                .bind(layer.palette_inverted)
                .bind(layer.color_mode.as_str())
                .bind(layer.color_attribute.as_deref())
                .bind(layer.color.as_str())
                .bind(layer.size_mode.as_str())
                .bind(layer.size_attribute.as_deref())
                .bind(layer.size)
                .bind(layer.label_attribute.as_deref())
                .bind(layer.opacity)
                .bind(layer.visible)
                .bind(layer.position)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_map(&self, id: &str) -> Result<Option<Map>> {
        let sql = format!(
            "SELECT {} FROM maps WHERE id = {}",
            MAP_COLUMNS,
            DB::bind_param(1)
        );

        let Some(row) = query_as::<DB, MapRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let layer_sql = format!(
            "SELECT {} FROM map_layers WHERE map_id = {} ORDER BY position",
            LAYER_COLUMNS,
            DB::bind_param(1)
        );
        let layers = query_as::<DB, MapLayerRow>(&layer_sql)
            .bind(id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(MapLayer::try_from)
            .collect::<Result<Vec<_>>>()?;

        let mut map = Map::from(row);
        map.layers = layers;
        Ok(Some(map))
    }

    // ---------------------------------------------------------------------
    // Basemaps and palettes
    // ---------------------------------------------------------------------

    pub async fn create_basemap(&self, basemap: &Basemap) -> Result<()> {
        let sql = format!(
            "INSERT INTO basemaps (id, name, style_json, is_default) VALUES ({})",
            params::<DB>(1, 4)
        );

        query(&sql)
            .bind(basemap.id.as_str())
            .bind(basemap.name.as_str())
            .bind(serde_json::to_string(&basemap.style)?)
            .bind(basemap.is_default)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_basemap(&self, id: &str) -> Result<Option<Basemap>> {
        let sql = format!(
            "SELECT id, name, style_json, is_default FROM basemaps WHERE id = {}",
            DB::bind_param(1)
        );

        query_as::<DB, BasemapRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Basemap::try_from)
            .transpose()
    }

    pub async fn get_default_basemap(&self) -> Result<Option<Basemap>> {
        let sql = format!(
            "SELECT id, name, style_json, is_default FROM basemaps WHERE is_default = {} \
             ORDER BY id LIMIT 1",
            DB::bind_param(1)
        );

        query_as::<DB, BasemapRow>(&sql)
            .bind(true)
            .fetch_optional(&self.pool)
            .await?
            .map(Basemap::try_from)
            .transpose()
    }

    pub async fn create_palette(&self, palette: &Palette) -> Result<()> {
        let sql = format!(
            "INSERT INTO palettes (id, name, colors_json, is_default) VALUES ({})",
            params::<DB>(1, 4)
        );

        query(&sql)
            .bind(palette.id.as_str())
            .bind(palette.name.as_str())
            .bind(serde_json::to_string(&palette.colors)?)
            .bind(palette.is_default)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_palette(&self, id: &str) -> Result<Option<Palette>> {
        let sql = format!(
            "SELECT id, name, colors_json, is_default FROM palettes WHERE id = {}",
            DB::bind_param(1)
        );

        query_as::<DB, PaletteRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Palette::try_from)
            .transpose()
    }

    pub async fn get_default_palette(&self) -> Result<Option<Palette>> {
        let sql = format!(
            "SELECT id, name, colors_json, is_default FROM palettes WHERE is_default = {} \
             ORDER BY id LIMIT 1",
            DB::bind_param(1)
        );

        query_as::<DB, PaletteRow>(&sql)
            .bind(true)
            .fetch_optional(&self.pool)
            .await?
            .map(Palette::try_from)
            .transpose()
    }
}
