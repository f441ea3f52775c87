use crate::catalog::backend::CatalogBackend;
use crate::catalog::manager::CatalogManager;
use crate::catalog::migrations::{run_migrations, CatalogMigrations};
use crate::catalog::models::{
    Basemap, DataAttribute, Dataset, Extent, Map, Palette, UploadRecord, UploadStatus,
};
use anyhow::Result;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use std::fmt::{self, Debug, Formatter};

const POSTGRES_SCHEMA_V1: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS uploads (
        id TEXT PRIMARY KEY,
        filename TEXT NOT NULL,
        content_type TEXT,
        size_bytes BIGINT NOT NULL,
        path TEXT NOT NULL,
        status TEXT NOT NULL,
        info_json TEXT,
        error TEXT,
        owner TEXT,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS datasets (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        attribution TEXT,
        source_type TEXT NOT NULL,
        source TEXT NOT NULL,
        geometry_column TEXT NOT NULL,
        geometry_type TEXT,
        minzoom DOUBLE PRECISION NOT NULL,
        maxzoom DOUBLE PRECISION NOT NULL,
        cache_control TEXT,
        is_private BOOLEAN NOT NULL DEFAULT TRUE,
        extent_json TEXT,
        size_bytes BIGINT,
        owner TEXT,
        upload_id TEXT REFERENCES uploads(id),
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS data_attributes (
        id TEXT PRIMARY KEY,
        dataset_id TEXT NOT NULL REFERENCES datasets(id) ON DELETE CASCADE,
        field TEXT NOT NULL,
        sql TEXT,
        attribute_type TEXT NOT NULL,
        name TEXT,
        description TEXT,
        unit TEXT,
        minimum DOUBLE PRECISION,
        maximum DOUBLE PRECISION,
        quantiles_5 TEXT,
        quantiles_10 TEXT,
        categorical BOOLEAN NOT NULL DEFAULT FALSE,
        categories TEXT,
        position INTEGER NOT NULL,
        UNIQUE (dataset_id, field)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS basemaps (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        style_json TEXT NOT NULL,
        is_default BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS palettes (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        colors_json TEXT NOT NULL,
        is_default BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS maps (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        center_lng DOUBLE PRECISION,
        center_lat DOUBLE PRECISION,
        zoom DOUBLE PRECISION,
        basemap_id TEXT NOT NULL REFERENCES basemaps(id),
        recipe TEXT,
        owner TEXT,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS map_layers (
        id TEXT PRIMARY KEY,
        map_id TEXT NOT NULL REFERENCES maps(id) ON DELETE CASCADE,
        dataset_id TEXT NOT NULL REFERENCES datasets(id),
        layer_type TEXT NOT NULL,
        palette_id TEXT REFERENCES palettes(id),
        palette_inverted BOOLEAN NOT NULL DEFAULT FALSE,
        color_mode TEXT NOT NULL,
        color_attribute TEXT,
        color TEXT NOT NULL,
        size_mode TEXT NOT NULL,
        size_attribute TEXT,
        size DOUBLE PRECISION NOT NULL,
        label_attribute TEXT,
        opacity DOUBLE PRECISION NOT NULL,
        visible BOOLEAN NOT NULL DEFAULT TRUE,
        position INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_uploads_status ON uploads(status)",
];

pub struct PostgresCatalogManager {
    backend: CatalogBackend<Postgres>,
}

impl Debug for PostgresCatalogManager {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresCatalogManager")
            .field("pool_size", &self.backend.pool().size())
            .finish()
    }
}

struct PostgresMigrationBackend;

impl PostgresCatalogManager {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(connection_string)
            .await?;

        Ok(Self {
            backend: CatalogBackend::new(pool),
        })
    }

    fn initialize_schema(pool: &PgPool) -> BoxFuture<'_, Result<()>> {
        async move {
            for statement in POSTGRES_SCHEMA_V1 {
                sqlx::query(statement).execute(pool).await?;
            }
            Ok(())
        }
        .boxed()
    }
}

#[async_trait]
impl CatalogManager for PostgresCatalogManager {
    async fn close(&self) -> Result<()> {
        self.backend.pool().close().await;
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        run_migrations::<PostgresMigrationBackend>(self.backend.pool()).await
    }

    async fn create_upload(&self, upload: &UploadRecord) -> Result<()> {
        self.backend.create_upload(upload).await
    }

    async fn get_upload(&self, id: &str) -> Result<Option<UploadRecord>> {
        self.backend.get_upload(id).await
    }

    async fn list_uploads(&self, status: Option<UploadStatus>) -> Result<Vec<UploadRecord>> {
        self.backend.list_uploads(status).await
    }

    async fn update_upload_status(
        &self,
        id: &str,
        status: UploadStatus,
        error: Option<&str>,
    ) -> Result<()> {
        self.backend.update_upload_status(id, status, error).await
    }

    async fn update_upload_info(&self, id: &str, info_json: &str) -> Result<()> {
        self.backend.update_upload_info(id, info_json).await
    }

    async fn create_dataset(&self, dataset: &Dataset) -> Result<()> {
        self.backend.create_dataset(dataset).await
    }

    async fn get_dataset(&self, id: &str) -> Result<Option<Dataset>> {
        self.backend.get_dataset(id).await
    }

    async fn get_dataset_by_upload(&self, upload_id: &str) -> Result<Option<Dataset>> {
        self.backend.get_dataset_by_upload(upload_id).await
    }

    async fn update_dataset_extent(
        &self,
        id: &str,
        extent: Option<&Extent>,
        size_bytes: Option<i64>,
    ) -> Result<()> {
        self.backend
            .update_dataset_extent(id, extent, size_bytes)
            .await
    }

    async fn create_attribute(&self, attribute: &DataAttribute) -> Result<()> {
        self.backend.create_attribute(attribute).await
    }

    async fn list_attributes(&self, dataset_id: &str) -> Result<Vec<DataAttribute>> {
        self.backend.list_attributes(dataset_id).await
    }

    async fn update_attribute_statistics(&self, attribute: &DataAttribute) -> Result<()> {
        self.backend.update_attribute_statistics(attribute).await
    }

    async fn create_map(&self, map: &Map) -> Result<()> {
        self.backend.create_map(map).await
    }

    async fn get_map(&self, id: &str) -> Result<Option<Map>> {
        self.backend.get_map(id).await
    }

    async fn create_basemap(&self, basemap: &Basemap) -> Result<()> {
        self.backend.create_basemap(basemap).await
    }

    async fn get_basemap(&self, id: &str) -> Result<Option<Basemap>> {
        self.backend.get_basemap(id).await
    }

    async fn get_default_basemap(&self) -> Result<Option<Basemap>> {
        self.backend.get_default_basemap().await
    }

    async fn create_palette(&self, palette: &Palette) -> Result<()> {
        self.backend.create_palette(palette).await
    }

    async fn get_palette(&self, id: &str) -> Result<Option<Palette>> {
        self.backend.get_palette(id).await
    }

    async fn get_default_palette(&self) -> Result<Option<Palette>> {
        self.backend.get_default_palette().await
    }
}

impl CatalogMigrations for PostgresMigrationBackend {
    type Pool = PgPool;

    fn ensure_migrations_table(pool: &Self::Pool) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query(
                r#"
                CREATE TABLE IF NOT EXISTS schema_migrations (
                    version BIGINT PRIMARY KEY,
                    applied_at TIMESTAMPTZ DEFAULT CURRENT_TIMESTAMP
                )
                "#,
            )
            .execute(pool)
            .await?;
            Ok(())
        }
        .boxed()
    }

    fn current_version(pool: &Self::Pool) -> BoxFuture<'_, Result<i64>> {
        async move {
            sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(pool)
                .await
                .map_err(Into::into)
        }
        .boxed()
    }

    fn record_version(pool: &Self::Pool, version: i64) -> BoxFuture<'_, Result<()>> {
        async move {
            sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
                .bind(version)
                .execute(pool)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn migrate_v1(pool: &Self::Pool) -> BoxFuture<'_, Result<()>> {
        PostgresCatalogManager::initialize_schema(pool)
    }
}
