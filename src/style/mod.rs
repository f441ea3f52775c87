//! Style generation: compiles a map definition over a basemap template into a
//! complete style document.
//!
//! Generation is pure. The template is shared and immutable; every call returns a
//! new document. Generated layers are spliced in front of anchor layers named in the
//! template's metadata:
//!
//! | metadata key | value |
//! |---|---|
//! | `mapstudio:data-insertion-point` | id of the layer data layers are inserted before |
//! | `mapstudio:label-insertion-point` | id of the layer label layers are inserted before |
//! | `mapstudio:label-style` | `{"layout": {...}, "paint": {...}}` shared by all labels |
//!
//! A missing anchor appends to the end of the layer list.

mod error;
mod layers;
mod ramp;
mod urls;

pub use error::StyleError;
pub use layers::{
    data_layer, dataset_source, generate_default_data_layer, label_layer, layer_paint,
    strip_client_prefix, CLIENT_LAYER_PREFIX, DEFAULT_LAYER_COLOR, DEFAULT_LAYER_SIZE,
    LABEL_MARGIN, SOURCE_LAYER,
};
pub use ramp::{
    color_ramp, opacity_ramp, radius_ramp, radius_steps, MISSING_STATISTICS_COLOR, RADIUS_FLOOR,
};
pub use urls::{expand_source_urls, expand_style_urls, expand_url};

use crate::catalog::{Basemap, Dataset, Map, Palette};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub const DATA_INSERTION_POINT_KEY: &str = "mapstudio:data-insertion-point";
pub const LABEL_INSERTION_POINT_KEY: &str = "mapstudio:label-insertion-point";
pub const LABEL_STYLE_KEY: &str = "mapstudio:label-style";
pub const DESCRIPTION_KEY: &str = "mapstudio:description";

/// An immutable basemap style document.
#[derive(Debug, Clone)]
pub struct StyleTemplate {
    document: Arc<Value>,
}

impl StyleTemplate {
    pub fn new(document: Value) -> Result<Self, StyleError> {
        let Some(root) = document.as_object() else {
            return Err(StyleError::InvalidTemplate(
                "style document must be an object".to_string(),
            ));
        };
        if !matches!(root.get("layers"), None | Some(Value::Array(_))) {
            return Err(StyleError::InvalidTemplate(
                "'layers' must be an array".to_string(),
            ));
        }
        if !matches!(root.get("sources"), None | Some(Value::Object(_))) {
            return Err(StyleError::InvalidTemplate(
                "'sources' must be an object".to_string(),
            ));
        }
        if !matches!(root.get("metadata"), None | Some(Value::Object(_))) {
            return Err(StyleError::InvalidTemplate(
                "'metadata' must be an object".to_string(),
            ));
        }
        Ok(Self {
            document: Arc::new(document),
        })
    }

    pub fn document(&self) -> &Value {
        &self.document
    }

    fn metadata(&self, key: &str) -> Option<&Value> {
        self.document.get("metadata").and_then(|m| m.get(key))
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata(key).and_then(Value::as_str)
    }
}

impl TryFrom<&Basemap> for StyleTemplate {
    type Error = StyleError;

    fn try_from(basemap: &Basemap) -> Result<Self, StyleError> {
        Self::new(basemap.style.clone())
    }
}

/// Everything a map's layers reference, resolved ahead of generation.
#[derive(Debug, Default)]
pub struct StyleInputs {
    /// Datasets keyed by id, with attributes loaded.
    pub datasets: HashMap<String, Dataset>,
    pub palettes: HashMap<String, Palette>,
    /// Public root that relative source URLs are resolved against.
    pub base_url: String,
}

/// Compile `map` over `template`.
///
/// The map's name, center, zoom and description replace the template's only when
/// set. A label style in the template metadata is needed only if some layer has a
/// `label_attribute`; otherwise its absence is fine. When a labelled layer finds
/// none, generation fails with [`StyleError::MissingLabelStyle`].
pub fn generate_map_style(
    map: &Map,
    template: &StyleTemplate,
    inputs: &StyleInputs,
) -> Result<Value, StyleError> {
    let mut style = template.document().clone();
    stamp_map_metadata(&mut style, map)?;

    let dataset_for = |dataset_id: &str| {
        inputs
            .datasets
            .get(dataset_id)
            .ok_or_else(|| StyleError::DatasetNotFound(dataset_id.to_string()))
    };

    let sources = object_entry(&mut style, "sources")?;
    for layer in &map.layers {
        let dataset = dataset_for(&layer.dataset_id)?;
        sources
            .entry(dataset.id.clone())
            .or_insert_with(|| dataset_source(dataset));
    }
    expand_style_urls(&mut style, &inputs.base_url);

    let mut data_layers = Vec::with_capacity(map.layers.len());
    let mut label_layers = Vec::new();
    let label_style = template.metadata(LABEL_STYLE_KEY);
    for layer in &map.layers {
        let dataset = dataset_for(&layer.dataset_id)?;
        let palette = layer
            .palette_id
            .as_ref()
            .and_then(|id| inputs.palettes.get(id));
        data_layers.push(data_layer(layer, dataset, palette)?);

        if layer.label_attribute.is_some() {
            let label_style = label_style.ok_or(StyleError::MissingLabelStyle)?;
            label_layers.extend(label_layer(layer, dataset, label_style)?);
        }
    }

    let layers = array_entry(&mut style, "layers")?;
    let data_anchor = template.metadata_str(DATA_INSERTION_POINT_KEY);
    for layer in data_layers.into_iter().rev() {
        insert_before_anchor(layers, data_anchor, layer);
    }
    let label_anchor = template.metadata_str(LABEL_INSERTION_POINT_KEY);
    for layer in label_layers.into_iter().rev() {
        insert_before_anchor(layers, label_anchor, layer);
    }

    Ok(style)
}

/// Insert `layer` immediately before the layer whose id is `anchor`, or at the end.
pub fn insert_before_anchor(layers: &mut Vec<Value>, anchor: Option<&str>, layer: Value) {
    let position = anchor.and_then(|anchor| {
        layers
            .iter()
            .position(|l| l.get("id").and_then(Value::as_str) == Some(anchor))
    });
    match position {
        Some(index) => layers.insert(index, layer),
        None => layers.push(layer),
    }
}

fn stamp_map_metadata(style: &mut Value, map: &Map) -> Result<(), StyleError> {
    if !map.name.is_empty() {
        style["name"] = json!(map.name);
    }
    if let Some(center) = map.center {
        style["center"] = json!(center);
    }
    if let Some(zoom) = map.zoom {
        style["zoom"] = json!(zoom);
    }
    if let Some(description) = &map.description {
        object_entry(style, "metadata")?.insert(DESCRIPTION_KEY.to_string(), json!(description));
    }
    Ok(())
}

fn object_entry<'a>(
    style: &'a mut Value,
    key: &str,
) -> Result<&'a mut serde_json::Map<String, Value>, StyleError> {
    if style.get(key).is_none() {
        style[key] = json!({});
    }
    style
        .get_mut(key)
        .and_then(Value::as_object_mut)
        .ok_or_else(|| StyleError::InvalidTemplate(format!("'{}' must be an object", key)))
}

fn array_entry<'a>(style: &'a mut Value, key: &str) -> Result<&'a mut Vec<Value>, StyleError> {
    if style.get(key).is_none() {
        style[key] = json!([]);
    }
    style
        .get_mut(key)
        .and_then(Value::as_array_mut)
        .ok_or_else(|| StyleError::InvalidTemplate(format!("'{}' must be an array", key)))
}
