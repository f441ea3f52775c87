pub mod backend;
mod migrations;
mod mock_catalog;
mod models;
mod postgres_manager;
mod sqlite_manager;

mod manager;

pub use manager::CatalogManager;
pub use mock_catalog::MockCatalog;
pub use models::{
    AttributeType, Basemap, BasemapRow, DataAttribute, DataAttributeRow, Dataset, DatasetRow,
    Extent, LayerType, Map, MapLayer, MapLayerRow, MapRow, PaintMode, Palette, PaletteRow,
    SourceType, UploadRecord, UploadStatus,
};
pub use postgres_manager::PostgresCatalogManager;
pub use sqlite_manager::SqliteCatalogManager;
