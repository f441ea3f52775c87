use chrono::Utc;
use mapstudio::catalog::{
    AttributeType, DataAttribute, Dataset, LayerType, Map, MapLayer, Palette, PaintMode,
    SourceType,
};
use mapstudio::style::{
    generate_default_data_layer, generate_map_style, StyleError, StyleInputs, StyleTemplate,
    DATA_INSERTION_POINT_KEY, DESCRIPTION_KEY, DEFAULT_LAYER_COLOR, DEFAULT_LAYER_SIZE, LABEL_INSERTION_POINT_KEY,
    LABEL_STYLE_KEY, MISSING_STATISTICS_COLOR,
};
use serde_json::{json, Value};
use std::collections::HashMap;

const BASE_URL: &str = "https://maps.example.org";

fn basemap_template() -> Value {
    json!({
        "version": 8,
        "sources": {
            "streets": {"type": "vector", "url": "/basemaps/streets.json"}
        },
        "layers": [
            {"id": "background", "type": "background"},
            {"id": "roads", "type": "line", "source": "streets"},
            {"id": "place-labels", "type": "symbol", "source": "streets"}
        ],
        "metadata": {
            DATA_INSERTION_POINT_KEY: "roads",
            LABEL_INSERTION_POINT_KEY: "place-labels",
            LABEL_STYLE_KEY: {
                "layout": {"text-size": 12},
                "paint": {"text-color": "#222"}
            }
        }
    })
}

fn parcels() -> Dataset {
    let zoning = DataAttribute::new("attr_zoning", "dset1", "zoning", AttributeType::String, 0);
    let area = DataAttribute::new("attr_area", "dset1", "area", AttributeType::Number, 1);
    Dataset {
        id: "dset1".to_string(),
        name: "parcels".to_string(),
        description: None,
        attribution: None,
        source_type: SourceType::Table,
        source: "parcels_data".to_string(),
        geometry_column: "wkb_geometry".to_string(),
        geometry_type: Some("ST_MultiPolygon".to_string()),
        minzoom: 0.0,
        maxzoom: 22.0,
        cache_control: None,
        is_private: true,
        extent: None,
        size_bytes: None,
        owner: None,
        upload_id: None,
        created_at: Utc::now(),
        attributes: vec![zoning, area],
    }
}

fn blues() -> Palette {
    Palette {
        id: "palt1".to_string(),
        name: "blues".to_string(),
        colors: vec![
            "#eff3ff".to_string(),
            "#bdd7e7".to_string(),
            "#6baed6".to_string(),
            "#3182bd".to_string(),
            "#08519c".to_string(),
        ],
        is_default: true,
    }
}

fn layer(id: &str, dataset_id: &str) -> MapLayer {
    MapLayer {
        id: id.to_string(),
        dataset_id: dataset_id.to_string(),
        layer_type: LayerType::Fill,
        palette_id: Some("palt1".to_string()),
        palette_inverted: false,
        color_mode: PaintMode::Fixed,
        color_attribute: None,
        color: "#336699".to_string(),
        size_mode: PaintMode::Fixed,
        size_attribute: None,
        size: 5.0,
        label_attribute: None,
        opacity: 0.8,
        visible: true,
        position: 0,
    }
}

fn map(layers: Vec<MapLayer>) -> Map {
    Map {
        id: "mapp1".to_string(),
        name: "Parcels".to_string(),
        description: None,
        center: Some([-122.4, 37.8]),
        zoom: Some(3.0),
        basemap_id: "base1".to_string(),
        layers,
        recipe: None,
        owner: None,
        created_at: Utc::now(),
    }
}

fn inputs(datasets: Vec<Dataset>) -> StyleInputs {
    let palette = blues();
    StyleInputs {
        datasets: datasets.into_iter().map(|d| (d.id.clone(), d)).collect(),
        palettes: HashMap::from([(palette.id.clone(), palette)]),
        base_url: BASE_URL.to_string(),
    }
}

fn layer_ids(style: &Value) -> Vec<String> {
    style["layers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["id"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn test_layers_are_inserted_before_anchor_topmost_first() {
    let template = StyleTemplate::new(basemap_template()).unwrap();
    let map = map(vec![
        layer("layrA", "dset1"),
        layer("layrB", "dset1"),
        layer("layrC", "dset1"),
    ]);

    let style = generate_map_style(&map, &template, &inputs(vec![parcels()])).unwrap();

    assert_eq!(
        layer_ids(&style),
        vec!["background", "layrA", "layrB", "layrC", "roads", "place-labels"]
    );
}

#[test]
fn test_labels_are_inserted_before_label_anchor() {
    let template = StyleTemplate::new(basemap_template()).unwrap();
    let mut labelled = layer("layrA", "dset1");
    labelled.label_attribute = Some("attr_zoning".to_string());
    let map = map(vec![labelled, layer("layrB", "dset1")]);

    let style = generate_map_style(&map, &template, &inputs(vec![parcels()])).unwrap();

    assert_eq!(
        layer_ids(&style),
        vec![
            "background",
            "layrA",
            "layrB",
            "roads",
            "layrA-label",
            "place-labels"
        ]
    );
    let label = &style["layers"][4];
    assert_eq!(label["layout"]["text-field"], "{zoning}");
    assert_eq!(label["layout"]["text-size"], 12);
    assert_eq!(label["paint"]["text-color"], "#222");
}

#[test]
fn test_missing_anchor_appends_layers() {
    let mut document = basemap_template();
    document["metadata"][DATA_INSERTION_POINT_KEY] = json!("does-not-exist");
    let template = StyleTemplate::new(document).unwrap();
    let map = map(vec![layer("layrA", "dset1"), layer("layrB", "dset1")]);

    let style = generate_map_style(&map, &template, &inputs(vec![parcels()])).unwrap();

    assert_eq!(
        layer_ids(&style),
        vec!["background", "roads", "place-labels", "layrA", "layrB"]
    );
}

#[test]
fn test_color_attribute_without_statistics_renders_black() {
    let template = StyleTemplate::new(basemap_template()).unwrap();
    let mut fill = layer("layrA", "dset1");
    fill.color_mode = PaintMode::Data;
    fill.color_attribute = Some("attr_area".to_string());

    let style = generate_map_style(&map(vec![fill]), &template, &inputs(vec![parcels()])).unwrap();

    let data = &style["layers"][1];
    assert_eq!(data["type"], "fill");
    assert_eq!(data["paint"]["fill-color"], MISSING_STATISTICS_COLOR);
    assert_eq!(data["paint"]["fill-opacity"]["stops"], json!([[0.0, 0], [0.5, 0.8]]));
}

#[test]
fn test_color_attribute_with_statistics_uses_palette() {
    let template = StyleTemplate::new(basemap_template()).unwrap();
    let mut dataset = parcels();
    dataset.attributes[1].quantiles_5 = Some(vec![1.0, 3.0, 5.0, 7.0, 9.0, 10.0]);
    let mut fill = layer("layrA", "dset1");
    fill.color_mode = PaintMode::Data;
    fill.color_attribute = Some("attr_area".to_string());

    let style = generate_map_style(&map(vec![fill]), &template, &inputs(vec![dataset])).unwrap();

    let color = &style["layers"][1]["paint"]["fill-color"];
    assert_eq!(color["property"], "area");
    assert_eq!(color["type"], "interval");
    assert_eq!(color["stops"][0], json!([1.0, "#eff3ff"]));
    assert_eq!(color["stops"].as_array().unwrap().len(), 5);
}

#[test]
fn test_default_layer_generates_fixed_paint() {
    let template = StyleTemplate::new(basemap_template()).unwrap();
    let mut dataset = parcels();
    dataset.geometry_type = Some("ST_Point".to_string());
    let default_layer = generate_default_data_layer(&dataset, &blues()).unwrap();

    let style = generate_map_style(
        &map(vec![default_layer.clone()]),
        &template,
        &inputs(vec![dataset]),
    )
    .unwrap();

    let data = &style["layers"][1];
    assert_eq!(data["id"], default_layer.id.as_str());
    assert_eq!(data["type"], "circle");
    assert_eq!(data["paint"]["circle-color"], DEFAULT_LAYER_COLOR);
    assert_eq!(data["paint"]["circle-radius"], DEFAULT_LAYER_SIZE);
}

#[test]
fn test_label_without_label_style_fails() {
    let mut document = basemap_template();
    document["metadata"]
        .as_object_mut()
        .unwrap()
        .remove(LABEL_STYLE_KEY);
    let template = StyleTemplate::new(document).unwrap();
    let mut labelled = layer("layrA", "dset1");
    labelled.label_attribute = Some("attr_zoning".to_string());

    let err = generate_map_style(&map(vec![labelled]), &template, &inputs(vec![parcels()]))
        .unwrap_err();
    assert!(matches!(err, StyleError::MissingLabelStyle));

    // Unlabelled maps do not need the label style.
    let style = generate_map_style(
        &map(vec![layer("layrA", "dset1")]),
        &template,
        &inputs(vec![parcels()]),
    );
    assert!(style.is_ok());
}

#[test]
fn test_sources_are_added_and_expanded() {
    let template = StyleTemplate::new(basemap_template()).unwrap();
    let style = generate_map_style(
        &map(vec![layer("layrA", "dset1")]),
        &template,
        &inputs(vec![parcels()]),
    )
    .unwrap();

    assert_eq!(
        style["sources"]["dset1"]["tiles"][0],
        "https://maps.example.org/v1/datasets/dset1/tiles/{z}/{x}/{y}.pbf"
    );
    assert_eq!(
        style["sources"]["streets"]["url"],
        "https://maps.example.org/basemaps/streets.json"
    );
    assert_eq!(style["name"], "Parcels");
    assert_eq!(style["center"], json!([-122.4, 37.8]));
}

#[test]
fn test_unset_map_fields_keep_template_values() {
    let mut document = basemap_template();
    document["name"] = json!("Light");
    document["center"] = json!([0.0, 20.0]);
    document["zoom"] = json!(1.5);
    let template = StyleTemplate::new(document).unwrap();

    let mut untitled = map(vec![layer("layrA", "dset1")]);
    untitled.name = String::new();
    untitled.center = None;
    untitled.zoom = None;
    untitled.description = None;
    let style = generate_map_style(&untitled, &template, &inputs(vec![parcels()])).unwrap();

    assert_eq!(style["name"], "Light");
    assert_eq!(style["center"], json!([0.0, 20.0]));
    assert_eq!(style["zoom"], json!(1.5));
    assert!(style["metadata"].get(DESCRIPTION_KEY).is_none());

    untitled.description = Some("Zoning by parcel".to_string());
    let style = generate_map_style(&untitled, &template, &inputs(vec![parcels()])).unwrap();
    assert_eq!(style["metadata"][DESCRIPTION_KEY], "Zoning by parcel");
}

#[test]
fn test_generation_leaves_template_untouched() {
    let document = basemap_template();
    let template = StyleTemplate::new(document.clone()).unwrap();
    let map = map(vec![layer("layrA", "dset1")]);
    let inputs = inputs(vec![parcels()]);

    let first = generate_map_style(&map, &template, &inputs).unwrap();
    let second = generate_map_style(&map, &template, &inputs).unwrap();

    assert_eq!(template.document(), &document);
    assert_eq!(first, second);
}

#[test]
fn test_unknown_dataset_fails() {
    let template = StyleTemplate::new(basemap_template()).unwrap();
    let err = generate_map_style(
        &map(vec![layer("layrA", "dset_missing")]),
        &template,
        &inputs(vec![parcels()]),
    )
    .unwrap_err();
    assert!(matches!(err, StyleError::DatasetNotFound(id) if id == "dset_missing"));
}
