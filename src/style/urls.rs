//! Source URL expansion against the public base URL.

use serde_json::Value;

/// Resolve `url` against `base_url`. Absolute URLs (anything with a scheme) are
/// returned unchanged.
pub fn expand_url(base_url: &str, url: &str) -> String {
    if url::Url::parse(url).is_ok() {
        return url.to_string();
    }
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        url.trim_start_matches('/')
    )
}

/// Expand the `url`, `tiles` and string `data` entries of one source object.
pub fn expand_source_urls(source: &mut Value, base_url: &str) {
    let Some(source) = source.as_object_mut() else {
        return;
    };
    for key in ["url", "data"] {
        if let Some(Value::String(url)) = source.get_mut(key) {
            *url = expand_url(base_url, url);
        }
    }
    if let Some(Value::Array(tiles)) = source.get_mut("tiles") {
        for tile in tiles.iter_mut() {
            if let Value::String(url) = tile {
                *url = expand_url(base_url, url);
            }
        }
    }
}

/// Expand every source of a style document.
pub fn expand_style_urls(style: &mut Value, base_url: &str) {
    if let Some(Value::Object(sources)) = style.get_mut("sources") {
        for source in sources.values_mut() {
            expand_source_urls(source, base_url);
        }
    }
}
