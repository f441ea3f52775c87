//! Entity shapes persisted by the catalog.
//!
//! Domain types carry typed fields (enums, vectors, JSON documents). The catalog
//! tables store enums as their string form and nested values as JSON text, so each
//! entity with such fields has a matching `*Row` type that sqlx decodes directly and
//! a `TryFrom` conversion into the domain type.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of an uploaded file. `Error` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploaded,
    Validating,
    Ingesting,
    Done,
    Error,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Validating => "validating",
            Self::Ingesting => "ingesting",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(Self::Uploaded),
            "validating" => Some(Self::Validating),
            "ingesting" => Some(Self::Ingesting),
            "done" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Whether the pipeline may move from `self` to `next`.
    pub fn can_transition_to(&self, next: UploadStatus) -> bool {
        match (self, next) {
            (Self::Error, _) => false,
            (_, Self::Error) => true,
            (Self::Uploaded, Self::Validating)
            | (Self::Validating, Self::Ingesting)
            | (Self::Ingesting, Self::Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-submitted file and its ingestion progress.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UploadRecord {
    pub id: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    /// On-disk location of the uploaded file.
    pub path: String,
    pub status: String,
    /// Validation report as JSON, see [`crate::ingest::UploadReport`].
    pub info_json: Option<String>,
    pub error: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    /// Parsed lifecycle status. Unknown values are reported as an error.
    pub fn status(&self) -> Result<UploadStatus> {
        UploadStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("Upload '{}' has unknown status '{}'", self.id, self.status))
    }
}

/// How a dataset's rows are addressed in the spatial store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Table,
    Sql,
    Tilelive,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::Sql => "sql",
            Self::Tilelive => "tilelive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "table" => Some(Self::Table),
            "sql" => Some(Self::Sql),
            "tilelive" => Some(Self::Tilelive),
            _ => None,
        }
    }

    /// Only relational sources can be queried for attribute statistics.
    pub fn supports_statistics(&self) -> bool {
        matches!(self, Self::Table | Self::Sql)
    }
}

/// Bounding box in the target spatial reference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Midpoint of the box as `[x, y]`.
    pub fn center(&self) -> [f64; 2] {
        [
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        ]
    }
}

/// A queryable geometry table or SQL view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub attribution: Option<String>,
    pub source_type: SourceType,
    /// Table name, SQL text, or tile URL depending on `source_type`.
    pub source: String,
    pub geometry_column: String,
    pub geometry_type: Option<String>,
    pub minzoom: f64,
    pub maxzoom: f64,
    pub cache_control: Option<String>,
    pub is_private: bool,
    pub extent: Option<Extent>,
    pub size_bytes: Option<i64>,
    pub owner: Option<String>,
    pub upload_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Ordered by [`DataAttribute::position`]. Empty unless loaded.
    #[serde(default)]
    pub attributes: Vec<DataAttribute>,
}

impl Dataset {
    pub fn attribute(&self, attribute_id: &str) -> Option<&DataAttribute> {
        self.attributes.iter().find(|a| a.id == attribute_id)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DatasetRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub attribution: Option<String>,
    pub source_type: String,
    pub source: String,
    pub geometry_column: String,
    pub geometry_type: Option<String>,
    pub minzoom: f64,
    pub maxzoom: f64,
    pub cache_control: Option<String>,
    pub is_private: bool,
    pub extent_json: Option<String>,
    pub size_bytes: Option<i64>,
    pub owner: Option<String>,
    pub upload_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DatasetRow> for Dataset {
    type Error = anyhow::Error;

    fn try_from(row: DatasetRow) -> Result<Self> {
        let source_type = SourceType::parse(&row.source_type).ok_or_else(|| {
            anyhow!(
                "Dataset '{}' has unknown source type '{}'",
                row.id,
                row.source_type
            )
        })?;
        Ok(Self {
            source_type,
            extent: parse_json_column(row.extent_json.as_deref(), "extent_json")?,
            id: row.id,
            name: row.name,
            description: row.description,
            attribution: row.attribution,
            source: row.source,
            geometry_column: row.geometry_column,
            geometry_type: row.geometry_type,
            minzoom: row.minzoom,
            maxzoom: row.maxzoom,
            cache_control: row.cache_control,
            is_private: row.is_private,
            size_bytes: row.size_bytes,
            owner: row.owner,
            upload_id: row.upload_id,
            created_at: row.created_at,
            attributes: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Number,
    String,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::String => "string",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            _ => None,
        }
    }
}

/// One column of a dataset plus its statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataAttribute {
    pub id: String,
    pub dataset_id: String,
    pub field: String,
    /// Raw SQL expression used instead of `field` when set.
    pub sql: Option<String>,
    pub attribute_type: AttributeType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    /// 6 ascending boundaries for 5 equal-count buckets.
    pub quantiles_5: Option<Vec<f64>>,
    /// 11 ascending boundaries for 10 equal-count buckets.
    pub quantiles_10: Option<Vec<f64>>,
    pub categorical: bool,
    pub categories: Option<Vec<String>>,
    pub position: i32,
}

impl DataAttribute {
    pub fn new(
        id: impl Into<String>,
        dataset_id: impl Into<String>,
        field: impl Into<String>,
        attribute_type: AttributeType,
        position: i32,
    ) -> Self {
        Self {
            id: id.into(),
            dataset_id: dataset_id.into(),
            field: field.into(),
            sql: None,
            attribute_type,
            name: None,
            description: None,
            unit: None,
            minimum: None,
            maximum: None,
            quantiles_5: None,
            quantiles_10: None,
            categorical: false,
            categories: None,
            position,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DataAttributeRow {
    pub id: String,
    pub dataset_id: String,
    pub field: String,
    pub sql: Option<String>,
    pub attribute_type: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub quantiles_5: Option<String>,
    pub quantiles_10: Option<String>,
    pub categorical: bool,
    pub categories: Option<String>,
    pub position: i32,
}

impl TryFrom<DataAttributeRow> for DataAttribute {
    type Error = anyhow::Error;

    fn try_from(row: DataAttributeRow) -> Result<Self> {
        let attribute_type = AttributeType::parse(&row.attribute_type).ok_or_else(|| {
            anyhow!(
                "Attribute '{}' has unknown type '{}'",
                row.id,
                row.attribute_type
            )
        })?;
        Ok(Self {
            attribute_type,
            quantiles_5: parse_json_column(row.quantiles_5.as_deref(), "quantiles_5")?,
            quantiles_10: parse_json_column(row.quantiles_10.as_deref(), "quantiles_10")?,
            categories: parse_json_column(row.categories.as_deref(), "categories")?,
            id: row.id,
            dataset_id: row.dataset_id,
            field: row.field,
            sql: row.sql,
            name: row.name,
            description: row.description,
            unit: row.unit,
            minimum: row.minimum,
            maximum: row.maximum,
            categorical: row.categorical,
            position: row.position,
        })
    }
}

/// Visual layer type implied by the dataset's geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerType {
    Fill,
    Line,
    Circle,
}

impl LayerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fill => "fill",
            Self::Line => "line",
            Self::Circle => "circle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fill" => Some(Self::Fill),
            "line" => Some(Self::Line),
            "circle" => Some(Self::Circle),
            _ => None,
        }
    }

    /// Map a geometry type name (`MULTIPOLYGON`, `ST_LineString`, `Point`, ...) to a layer type.
    pub fn from_geometry_type(geometry_type: &str) -> Option<Self> {
        let normalized = geometry_type.to_ascii_lowercase();
        let normalized = normalized.trim_start_matches("st_").trim_start_matches("multi");
        if normalized.starts_with("polygon") {
            Some(Self::Fill)
        } else if normalized.starts_with("linestring") {
            Some(Self::Line)
        } else if normalized.starts_with("point") {
            Some(Self::Circle)
        } else {
            None
        }
    }
}

/// Whether a visual channel uses the fixed fallback value or an attribute ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaintMode {
    #[default]
    Fixed,
    Data,
}

impl PaintMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Data => "data",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "data" => Some(Self::Data),
            _ => None,
        }
    }
}

/// Binds one dataset to one visual layer of a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapLayer {
    pub id: String,
    pub dataset_id: String,
    pub layer_type: LayerType,
    pub palette_id: Option<String>,
    pub palette_inverted: bool,
    pub color_mode: PaintMode,
    /// Attribute id driving color.
    pub color_attribute: Option<String>,
    pub color: String,
    pub size_mode: PaintMode,
    /// Attribute id driving circle radius. Points only.
    pub size_attribute: Option<String>,
    pub size: f64,
    /// Attribute id rendered as a label.
    pub label_attribute: Option<String>,
    pub opacity: f64,
    pub visible: bool,
    pub position: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct MapLayerRow {
    pub id: String,
    pub dataset_id: String,
    pub layer_type: String,
    pub palette_id: Option<String>,
    pub palette_inverted: bool,
    pub color_mode: String,
    pub color_attribute: Option<String>,
    pub color: String,
    pub size_mode: String,
    pub size_attribute: Option<String>,
    pub size: f64,
    pub label_attribute: Option<String>,
    pub opacity: f64,
    pub visible: bool,
    pub position: i32,
}

impl TryFrom<MapLayerRow> for MapLayer {
    type Error = anyhow::Error;

    fn try_from(row: MapLayerRow) -> Result<Self> {
        let unknown =
            |what: &str, value: &str| anyhow!("Layer '{}' has unknown {} '{}'", row.id, what, value);
        Ok(Self {
            layer_type: LayerType::parse(&row.layer_type)
                .ok_or_else(|| unknown("layer type", &row.layer_type))?,
            color_mode: PaintMode::parse(&row.color_mode)
                .ok_or_else(|| unknown("color mode", &row.color_mode))?,
            size_mode: PaintMode::parse(&row.size_mode)
                .ok_or_else(|| unknown("size mode", &row.size_mode))?,
            id: row.id,
            dataset_id: row.dataset_id,
            palette_id: row.palette_id,
            palette_inverted: row.palette_inverted,
            color_attribute: row.color_attribute,
            color: row.color,
            size_attribute: row.size_attribute,
            size: row.size,
            label_attribute: row.label_attribute,
            opacity: row.opacity,
            visible: row.visible,
            position: row.position,
        })
    }
}

/// A named visual composition of dataset layers over a basemap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Map {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// `[lng, lat]`.
    pub center: Option<[f64; 2]>,
    pub zoom: Option<f64>,
    pub basemap_id: String,
    /// Ordered topmost first.
    pub layers: Vec<MapLayer>,
    /// Provenance string describing how the map was produced.
    pub recipe: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MapRow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub center_lng: Option<f64>,
    pub center_lat: Option<f64>,
    pub zoom: Option<f64>,
    pub basemap_id: String,
    pub recipe: Option<String>,
    pub owner: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<MapRow> for Map {
    fn from(row: MapRow) -> Self {
        let center = match (row.center_lng, row.center_lat) {
            (Some(lng), Some(lat)) => Some([lng, lat]),
            _ => None,
        };
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            center,
            zoom: row.zoom,
            basemap_id: row.basemap_id,
            layers: Vec::new(),
            recipe: row.recipe,
            owner: row.owner,
            created_at: row.created_at,
        }
    }
}

/// A base style document that generated layers are spliced into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Basemap {
    pub id: String,
    pub name: String,
    pub style: serde_json::Value,
    pub is_default: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct BasemapRow {
    pub id: String,
    pub name: String,
    pub style_json: String,
    pub is_default: bool,
}

impl TryFrom<BasemapRow> for Basemap {
    type Error = anyhow::Error;

    fn try_from(row: BasemapRow) -> Result<Self> {
        let style = serde_json::from_str(&row.style_json)
            .with_context(|| format!("Basemap '{}' has an invalid style document", row.id))?;
        Ok(Self {
            id: row.id,
            name: row.name,
            style,
            is_default: row.is_default,
        })
    }
}

/// An ordered list of color stops used by data-driven color ramps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub id: String,
    pub name: String,
    pub colors: Vec<String>,
    pub is_default: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct PaletteRow {
    pub id: String,
    pub name: String,
    pub colors_json: String,
    pub is_default: bool,
}

impl TryFrom<PaletteRow> for Palette {
    type Error = anyhow::Error;

    fn try_from(row: PaletteRow) -> Result<Self> {
        let colors = serde_json::from_str(&row.colors_json)
            .with_context(|| format!("Palette '{}' has invalid colors", row.id))?;
        Ok(Self {
            id: row.id,
            name: row.name,
            colors,
            is_default: row.is_default,
        })
    }
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    value: Option<&str>,
    column: &str,
) -> Result<Option<T>> {
    value
        .map(|v| {
            serde_json::from_str(v).with_context(|| format!("Invalid JSON in column {}", column))
        })
        .transpose()
}

/// Serialize an optional value into a nullable JSON text column.
pub(crate) fn to_json_column<T: Serialize>(value: Option<&T>) -> Result<Option<String>> {
    value
        .map(|v| serde_json::to_string(v).map_err(Into::into))
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_status_round_trips_through_str() {
        for status in [
            UploadStatus::Uploaded,
            UploadStatus::Validating,
            UploadStatus::Ingesting,
            UploadStatus::Done,
            UploadStatus::Error,
        ] {
            assert_eq!(UploadStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(UploadStatus::parse("pending"), None);
    }

    #[test]
    fn test_error_status_is_absorbing() {
        assert!(!UploadStatus::Error.can_transition_to(UploadStatus::Uploaded));
        assert!(!UploadStatus::Error.can_transition_to(UploadStatus::Error));
        assert!(UploadStatus::Ingesting.can_transition_to(UploadStatus::Error));
    }

    #[test]
    fn test_status_only_moves_forward() {
        assert!(UploadStatus::Uploaded.can_transition_to(UploadStatus::Validating));
        assert!(UploadStatus::Validating.can_transition_to(UploadStatus::Ingesting));
        assert!(UploadStatus::Ingesting.can_transition_to(UploadStatus::Done));
        assert!(!UploadStatus::Done.can_transition_to(UploadStatus::Validating));
        assert!(!UploadStatus::Uploaded.can_transition_to(UploadStatus::Done));
    }

    #[test]
    fn test_layer_type_from_geometry() {
        assert_eq!(LayerType::from_geometry_type("ST_MultiPolygon"), Some(LayerType::Fill));
        assert_eq!(LayerType::from_geometry_type("MULTILINESTRING"), Some(LayerType::Line));
        assert_eq!(LayerType::from_geometry_type("Point"), Some(LayerType::Circle));
        assert_eq!(LayerType::from_geometry_type("GeometryCollection"), None);
    }

    #[test]
    fn test_extent_center() {
        let extent = Extent {
            min_x: -10.0,
            min_y: 0.0,
            max_x: 10.0,
            max_y: 50.0,
        };
        assert_eq!(extent.center(), [0.0, 25.0]);
    }

    #[test]
    fn test_only_relational_sources_support_statistics() {
        assert!(SourceType::Table.supports_statistics());
        assert!(SourceType::Sql.supports_statistics());
        assert!(!SourceType::Tilelive.supports_statistics());
    }

    #[test]
    fn test_attribute_row_decodes_json_columns() {
        let row = DataAttributeRow {
            id: "attr1".to_string(),
            dataset_id: "dset1".to_string(),
            field: "population".to_string(),
            sql: None,
            attribute_type: "number".to_string(),
            name: None,
            description: None,
            unit: None,
            minimum: Some(1.0),
            maximum: Some(10.0),
            quantiles_5: Some("[1.0,3.0,5.0,7.0,9.0,10.0]".to_string()),
            quantiles_10: None,
            categorical: false,
            categories: None,
            position: 0,
        };
        let attribute = DataAttribute::try_from(row).unwrap();
        assert_eq!(attribute.attribute_type, AttributeType::Number);
        assert_eq!(
            attribute.quantiles_5,
            Some(vec![1.0, 3.0, 5.0, 7.0, 9.0, 10.0])
        );
        assert!(attribute.quantiles_10.is_none());
    }
}
