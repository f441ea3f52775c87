//! Data and label layer synthesis, and the default layer for new datasets.

use crate::catalog::{Dataset, LayerType, MapLayer, Palette, PaintMode, SourceType};
use crate::id::generate_layer_id;
use crate::style::ramp::{color_ramp, opacity_ramp, radius_ramp};
use crate::style::StyleError;
use serde_json::{json, Map as JsonMap, Value};

/// Source layer name the tile endpoint uses for every dataset.
pub const SOURCE_LAYER: &str = "features";

/// Prefix the map editor puts on layer ids. Not persisted.
pub const CLIENT_LAYER_PREFIX: &str = "ml-";

pub const DEFAULT_LAYER_COLOR: &str = "#888888";
pub const DEFAULT_LAYER_SIZE: f64 = 5.0;

/// Pixels between a point and its label.
pub const LABEL_MARGIN: f64 = 4.0;

pub fn strip_client_prefix(layer_id: &str) -> &str {
    layer_id
        .strip_prefix(CLIENT_LAYER_PREFIX)
        .unwrap_or(layer_id)
}

/// Vector source for a dataset, with a tile URL relative to the service root.
pub fn dataset_source(dataset: &Dataset) -> Value {
    let mut source = json!({
        "type": "vector",
        "minzoom": dataset.minzoom,
        "maxzoom": dataset.maxzoom,
    });
    if dataset.source_type == SourceType::Tilelive {
        source["url"] = json!(dataset.source);
    } else {
        source["tiles"] = json!([format!(
            "/v1/datasets/{}/tiles/{{z}}/{{x}}/{{y}}.pbf",
            dataset.id
        )]);
    }
    if let Some(extent) = dataset.extent {
        source["bounds"] = json!([extent.min_x, extent.min_y, extent.max_x, extent.max_y]);
    }
    if let Some(attribution) = &dataset.attribution {
        source["attribution"] = json!(attribution);
    }
    source
}

/// Paint object for a data layer.
pub fn layer_paint(
    layer: &MapLayer,
    dataset: &Dataset,
    palette: Option<&Palette>,
) -> Result<JsonMap<String, Value>, StyleError> {
    let prefix = layer.layer_type.as_str();
    let mut paint = JsonMap::new();
    paint.insert(
        format!("{}-color", prefix),
        color_ramp(layer, dataset, palette)?,
    );
    paint.insert(format!("{}-opacity", prefix), opacity_ramp(layer, dataset));
    if layer.layer_type == LayerType::Circle {
        paint.insert("circle-radius".to_string(), radius_ramp(layer, dataset)?);
    }
    Ok(paint)
}

pub fn data_layer(
    layer: &MapLayer,
    dataset: &Dataset,
    palette: Option<&Palette>,
) -> Result<Value, StyleError> {
    Ok(json!({
        "id": layer.id,
        "source": dataset.id,
        "source-layer": SOURCE_LAYER,
        "type": layer.layer_type.as_str(),
        "minzoom": dataset.minzoom,
        "maxzoom": dataset.maxzoom,
        "layout": { "visibility": visibility(layer) },
        "paint": layer_paint(layer, dataset, palette)?,
    }))
}

/// Symbol layer rendering `layer`'s label attribute, built over the basemap's shared
/// label style (`{"layout": {...}, "paint": {...}}`).
pub fn label_layer(
    layer: &MapLayer,
    dataset: &Dataset,
    label_style: &Value,
) -> Result<Option<Value>, StyleError> {
    let Some(attribute_id) = layer.label_attribute.as_deref() else {
        return Ok(None);
    };
    let attribute = dataset
        .attribute(attribute_id)
        .ok_or_else(|| StyleError::AttributeNotFound {
            dataset: dataset.id.clone(),
            attribute: attribute_id.to_string(),
        })?;

    let mut layout = template_section(label_style, "layout")?;
    let mut paint = template_section(label_style, "paint")?;

    let text = match attribute.unit.as_deref().filter(|u| !u.is_empty()) {
        Some(unit) => format!("{{{}}} {}", attribute.field, unit),
        None => format!("{{{}}}", attribute.field),
    };
    layout.insert("text-field".to_string(), json!(text));
    layout.insert("visibility".to_string(), json!(visibility(layer)));

    match layer.layer_type {
        LayerType::Circle => {
            layout.insert("text-anchor".to_string(), json!("top"));
            paint.insert(
                "text-translate".to_string(),
                json!([0, layer.size + LABEL_MARGIN]),
            );
        }
        LayerType::Line => {
            layout.insert("symbol-placement".to_string(), json!("line"));
        }
        LayerType::Fill => {}
    }

    Ok(Some(json!({
        "id": format!("{}-label", layer.id),
        "source": dataset.id,
        "source-layer": SOURCE_LAYER,
        "type": "symbol",
        "minzoom": dataset.minzoom,
        "maxzoom": dataset.maxzoom,
        "layout": layout,
        "paint": paint,
    })))
}

/// A renderable layer for a freshly ingested dataset: fixed gray, fixed size, full
/// opacity, no attribute bindings. The id carries [`CLIENT_LAYER_PREFIX`].
pub fn generate_default_data_layer(
    dataset: &Dataset,
    palette: &Palette,
) -> Result<MapLayer, StyleError> {
    let geometry_type = dataset.geometry_type.as_deref().unwrap_or_default();
    let layer_type = LayerType::from_geometry_type(geometry_type)
        .ok_or_else(|| StyleError::UnsupportedGeometry(geometry_type.to_string()))?;

    Ok(MapLayer {
        id: format!("{}{}", CLIENT_LAYER_PREFIX, generate_layer_id()),
        dataset_id: dataset.id.clone(),
        layer_type,
        palette_id: Some(palette.id.clone()),
        palette_inverted: false,
        color_mode: PaintMode::Fixed,
        color_attribute: None,
        color: DEFAULT_LAYER_COLOR.to_string(),
        size_mode: PaintMode::Fixed,
        size_attribute: None,
        size: DEFAULT_LAYER_SIZE,
        label_attribute: None,
        opacity: 1.0,
        visible: true,
        position: 0,
    })
}

fn visibility(layer: &MapLayer) -> &'static str {
    if layer.visible {
        "visible"
    } else {
        "none"
    }
}

fn template_section(
    label_style: &Value,
    key: &str,
) -> Result<JsonMap<String, Value>, StyleError> {
    match label_style.get(key) {
        None | Some(Value::Null) => Ok(JsonMap::new()),
        Some(Value::Object(section)) => Ok(section.clone()),
        Some(_) => Err(StyleError::InvalidTemplate(format!(
            "label style '{}' must be an object",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeType, DataAttribute};
    use chrono::Utc;

    fn dataset(geometry_type: &str) -> Dataset {
        let name = DataAttribute::new("attr_name", "dset1", "name", AttributeType::String, 0);
        let mut depth = DataAttribute::new("attr_depth", "dset1", "depth", AttributeType::Number, 1);
        depth.unit = Some("m".to_string());
        Dataset {
            id: "dset1".to_string(),
            name: "wells".to_string(),
            description: None,
            attribution: None,
            source_type: SourceType::Table,
            source: "wells_data".to_string(),
            geometry_column: "wkb_geometry".to_string(),
            geometry_type: Some(geometry_type.to_string()),
            minzoom: 0.0,
            maxzoom: 22.0,
            cache_control: None,
            is_private: true,
            extent: None,
            size_bytes: None,
            owner: None,
            upload_id: None,
            created_at: Utc::now(),
            attributes: vec![name, depth],
        }
    }

    fn palette() -> Palette {
        Palette {
            id: "palt1".to_string(),
            name: "greys".to_string(),
            colors: vec!["#eee".to_string(), "#111".to_string()],
            is_default: true,
        }
    }

    fn label_style() -> Value {
        json!({"layout": {"text-size": 12}, "paint": {"text-color": "#333"}})
    }

    #[test]
    fn test_default_layer_shape() {
        let layer = generate_default_data_layer(&dataset("ST_MultiPoint"), &palette()).unwrap();
        assert!(layer.id.starts_with(CLIENT_LAYER_PREFIX));
        assert!(strip_client_prefix(&layer.id).starts_with("layr"));
        assert_eq!(layer.layer_type, LayerType::Circle);
        assert_eq!(layer.color, DEFAULT_LAYER_COLOR);
        assert_eq!(layer.size, DEFAULT_LAYER_SIZE);
        assert_eq!(layer.opacity, 1.0);
        assert!(layer.visible);
        assert!(layer.color_attribute.is_none() && layer.label_attribute.is_none());
    }

    #[test]
    fn test_default_layer_rejects_unknown_geometry() {
        let err = generate_default_data_layer(&dataset("GeometryCollection"), &palette())
            .unwrap_err();
        assert!(matches!(err, StyleError::UnsupportedGeometry(_)));
    }

    #[test]
    fn test_data_layer_object() {
        let mut layer = generate_default_data_layer(&dataset("ST_MultiPolygon"), &palette()).unwrap();
        layer.visible = false;
        let value = data_layer(&layer, &dataset("ST_MultiPolygon"), None).unwrap();
        assert_eq!(value["type"], "fill");
        assert_eq!(value["source"], "dset1");
        assert_eq!(value["source-layer"], SOURCE_LAYER);
        assert_eq!(value["layout"]["visibility"], "none");
        assert_eq!(value["paint"]["fill-color"], DEFAULT_LAYER_COLOR);
        assert!(value["paint"].get("circle-radius").is_none());
    }

    #[test]
    fn test_point_label_is_offset_below_point() {
        let dataset = dataset("ST_MultiPoint");
        let mut layer = generate_default_data_layer(&dataset, &palette()).unwrap();
        layer.label_attribute = Some("attr_depth".to_string());

        let label = label_layer(&layer, &dataset, &label_style()).unwrap().unwrap();
        assert_eq!(label["id"], format!("{}-label", layer.id));
        assert_eq!(label["type"], "symbol");
        assert_eq!(label["layout"]["text-field"], "{depth} m");
        assert_eq!(label["layout"]["text-size"], 12);
        assert_eq!(label["paint"]["text-color"], "#333");
        assert_eq!(label["paint"]["text-translate"], json!([0, 9.0]));
    }

    #[test]
    fn test_line_label_follows_line() {
        let dataset = dataset("ST_MultiLineString");
        let mut layer = generate_default_data_layer(&dataset, &palette()).unwrap();
        layer.label_attribute = Some("attr_name".to_string());

        let label = label_layer(&layer, &dataset, &label_style()).unwrap().unwrap();
        assert_eq!(label["layout"]["text-field"], "{name}");
        assert_eq!(label["layout"]["symbol-placement"], "line");
        assert!(label["paint"].get("text-translate").is_none());
    }

    #[test]
    fn test_tilelive_source_uses_url() {
        let mut dataset = dataset("ST_MultiPoint");
        dataset.source_type = SourceType::Tilelive;
        dataset.source = "https://tiles.example.org/wells.json".to_string();
        let source = dataset_source(&dataset);
        assert_eq!(source["url"], "https://tiles.example.org/wells.json");
        assert!(source.get("tiles").is_none());
    }
}
