//! Data-driven paint values: color, circle radius and opacity.
//!
//! Ramps are property functions keyed on the attribute's field, with stops taken from
//! the attribute's 5-way quantile boundaries.

use crate::catalog::{DataAttribute, Dataset, MapLayer, Palette, PaintMode};
use crate::style::StyleError;
use serde_json::{json, Value};

/// Smallest radius a data-driven circle ramp starts from.
pub const RADIUS_FLOOR: f64 = 2.0;

/// Paint used when a color attribute has no statistics yet.
pub const MISSING_STATISTICS_COLOR: &str = "black";

const RADIUS_STOPS: usize = 5;

/// Fill, line or circle color.
pub fn color_ramp(
    layer: &MapLayer,
    dataset: &Dataset,
    palette: Option<&Palette>,
) -> Result<Value, StyleError> {
    let Some(attribute_id) = layer.color_attribute.as_deref() else {
        return Ok(json!(layer.color));
    };
    if layer.color_mode == PaintMode::Fixed {
        return Ok(json!(layer.color));
    }

    let attribute = find_attribute(dataset, attribute_id)?;
    let Some(quantiles) = attribute.quantiles_5.as_ref() else {
        return Ok(json!(MISSING_STATISTICS_COLOR));
    };
    let palette = palette.ok_or_else(|| {
        StyleError::PaletteNotFound(layer.palette_id.clone().unwrap_or_default())
    })?;

    let mut colors: Vec<&String> = palette.colors.iter().collect();
    if layer.palette_inverted {
        colors.reverse();
    }
    let stops: Vec<Value> = quantiles
        .iter()
        .zip(colors)
        .map(|(boundary, color)| json!([boundary, color]))
        .collect();
    if stops.is_empty() {
        return Ok(json!(layer.color));
    }

    Ok(json!({
        "property": attribute.field,
        "type": "interval",
        "stops": stops,
        "default": layer.color,
    }))
}

/// Circle radius. Only meaningful for point layers.
pub fn radius_ramp(layer: &MapLayer, dataset: &Dataset) -> Result<Value, StyleError> {
    let Some(attribute_id) = layer.size_attribute.as_deref() else {
        return Ok(json!(layer.size));
    };
    if layer.size_mode == PaintMode::Fixed {
        return Ok(json!(layer.size));
    }

    let attribute = find_attribute(dataset, attribute_id)?;
    let Some(quantiles) = attribute.quantiles_5.as_ref().filter(|q| !q.is_empty()) else {
        return Ok(json!(layer.size));
    };

    let stops: Vec<Value> = radius_steps(layer.size)
        .into_iter()
        .zip(quantiles)
        .map(|(radius, boundary)| json!([boundary, radius]))
        .collect();

    Ok(json!({
        "property": attribute.field,
        "type": "exponential",
        "base": 1,
        "stops": stops,
        "default": layer.size,
    }))
}

/// Five radii evenly spaced from [`RADIUS_FLOOR`] to `size`.
pub fn radius_steps(size: f64) -> Vec<f64> {
    let step = (size - RADIUS_FLOOR) / (RADIUS_STOPS - 1) as f64;
    (0..RADIUS_STOPS)
        .map(|i| RADIUS_FLOOR + step * i as f64)
        .collect()
}

/// Fade in from the dataset's minimum zoom to full opacity half a level later.
pub fn opacity_ramp(layer: &MapLayer, dataset: &Dataset) -> Value {
    json!({
        "stops": [[dataset.minzoom, 0], [dataset.minzoom + 0.5, layer.opacity]]
    })
}

fn find_attribute<'a>(
    dataset: &'a Dataset,
    attribute_id: &str,
) -> Result<&'a DataAttribute, StyleError> {
    dataset
        .attribute(attribute_id)
        .ok_or_else(|| StyleError::AttributeNotFound {
            dataset: dataset.id.clone(),
            attribute: attribute_id.to_string(),
        })
}
