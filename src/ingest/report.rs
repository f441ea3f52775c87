//! Parsing of the info tool's summary listing.

use crate::catalog::AttributeType;
use serde::{Deserialize, Serialize};

/// What validation learned about an uploaded file. Stored as the upload's `info`
/// and revised by the user before finalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub driver: Option<String>,
    pub geometry_type: Option<String>,
    pub feature_count: Option<i64>,
    /// Name quoted in the spatial reference WKT, e.g. `WGS 84`.
    pub srs: Option<String>,
    pub attributes: Vec<UploadAttribute>,
}

impl UploadReport {
    pub fn attribute(&self, field: &str) -> Option<&UploadAttribute> {
        self.attributes.iter().find(|a| a.field == field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadAttribute {
    /// Storage column name.
    pub field: String,
    /// Field name as it appears in the source file.
    pub original_name: String,
    /// Display name. Editable.
    pub name: String,
    /// Normalized type token (`Integer`, `Real`, `String`, `Date`, ...). Editable.
    #[serde(rename = "type")]
    pub attribute_type: String,
    /// Width and precision as reported, e.g. `24.15`.
    pub precision: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl UploadAttribute {
    pub fn value_type(&self) -> AttributeType {
        match self.attribute_type.as_str() {
            "Integer" | "Real" => AttributeType::Number,
            _ => AttributeType::String,
        }
    }

    fn width(&self) -> Option<u32> {
        self.precision
            .as_deref()
            .and_then(|p| p.split('.').next())
            .and_then(|w| w.parse().ok())
    }

    /// PostgreSQL column type used when reconciling the ingested table.
    pub fn column_type(&self) -> &'static str {
        match self.attribute_type.as_str() {
            "Integer" if self.width().is_some_and(|w| w >= 10) => "bigint",
            "Integer" => "integer",
            "Real" => "double precision",
            "Date" => "date",
            "DateTime" => "timestamp",
            "Time" => "time",
            _ => "text",
        }
    }
}

/// Normalize a type token. 64-bit integers fold into `Integer`.
pub fn normalize_type(token: &str) -> String {
    match token.strip_prefix("Integer64") {
        Some(rest) => format!("Integer{}", rest),
        None => token.to_string(),
    }
}

/// Lowercase a field name and replace the punctuation the convert tool launders.
pub fn sanitize_field_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            '\'' | '-' | '#' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Parse the info tool's summary listing for the first layer of a datasource.
pub fn parse_info_report(output: &str) -> UploadReport {
    let mut report = UploadReport::default();
    let mut lines = output.lines().peekable();
    let mut collecting = false;
    let mut in_layer = false;

    while let Some(line) = lines.next() {
        let trimmed = line.trim();

        if report.driver.is_none() {
            if let Some(driver) = between(trimmed, "using driver `", "'") {
                report.driver = Some(driver.to_string());
                continue;
            }
        }

        if trimmed == "Layer SRS WKT:" {
            while lines.next_if(|l| l.trim().is_empty()).is_some() {}
            if let Some(wkt) = lines.next() {
                report.srs = between(wkt, "\"", "\"").map(str::to_string);
            }
            collecting = true;
            continue;
        }

        let Some((key, value)) = split_key_value(trimmed) else {
            if !report.attributes.is_empty() {
                collecting = false;
            }
            continue;
        };

        match key {
            "Layer name" => {
                if in_layer {
                    break;
                }
                in_layer = true;
            }
            "Geometry" => report.geometry_type = Some(value.to_string()),
            "Feature Count" => {
                report.feature_count = value.parse().ok();
                collecting = true;
            }
            _ if collecting => match parse_attribute(key, value) {
                Some(attribute) => report.attributes.push(attribute),
                None if !report.attributes.is_empty() => collecting = false,
                None => {}
            },
            _ => {}
        }
    }

    report
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.rsplit_once(": ")?;
    let (key, value) = (key.trim(), value.trim());
    (!key.is_empty() && !value.is_empty()).then_some((key, value))
}

/// `<field>: <Type> (<width.precision>)`
fn parse_attribute(name: &str, descriptor: &str) -> Option<UploadAttribute> {
    let (token, rest) = descriptor.split_once('(')?;
    let token = token.trim();
    let precision = rest.strip_suffix(')')?.trim();
    if token.is_empty()
        || !token.chars().all(|c| c.is_ascii_alphanumeric())
        || !precision.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return None;
    }
    Some(UploadAttribute {
        field: sanitize_field_name(name),
        original_name: name.to_string(),
        name: name.to_string(),
        attribute_type: normalize_type(token),
        precision: (!precision.is_empty()).then(|| precision.to_string()),
        removed: false,
    })
}

fn between<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let len = text[start..].find(close)?;
    Some(&text[start..start + len])
}
