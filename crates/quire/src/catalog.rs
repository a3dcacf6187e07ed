use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{IoContext, QuireError, Result};
use crate::types::VariantTable;

pub type CatalogRecord = Map<String, Value>;

pub const IMAGE_FIELD: &str = "imagen";
pub const IMAGE_SMALL_FIELD: &str = "imagenSmall";
pub const IMAGE_FALLBACK_FIELD: &str = "imagenFallback";
pub const IMAGE_FALLBACK_SMALL_FIELD: &str = "imagenFallbackSmall";

pub const REQUIRED_FIELDS: [&str; 8] = [
    "id", "titulo", "idioma", "autor", "estado", "precio", "imagen", "vendido",
];

/// `/fotos/b1.jpg` -> `fotos/b1`
pub fn variant_key(image: &str) -> String {
    let portable = image.replace('\\', "/");
    let trimmed = portable.strip_prefix('/').unwrap_or(&portable);
    match trimmed.rfind('.') {
        Some(dot) if !trimmed[dot..].contains('/') => trimmed[..dot].to_string(),
        _ => trimmed.to_string(),
    }
}

/// Points the record's image fields at its cover variants. A record whose
/// cover has no variants is returned unchanged.
pub fn enhance(mut record: CatalogRecord, variants: &VariantTable) -> CatalogRecord {
    let Some(image) = record.get(IMAGE_FIELD).and_then(Value::as_str) else {
        tracing::warn!(id = %display_id(record.get("id")), "catalog record has no image path");
        return record;
    };

    let Some(variant) = variants.get(&variant_key(image)) else {
        tracing::warn!("No optimized cover found for {image}");
        return record;
    };

    let either = |first: &Option<String>, second: &Option<String>| {
        first.clone().or_else(|| second.clone())
    };

    let derived = [
        (IMAGE_FIELD, either(&variant.webp_large, &variant.webp_small)),
        (IMAGE_SMALL_FIELD, either(&variant.webp_small, &variant.webp_large)),
        (IMAGE_FALLBACK_FIELD, either(&variant.jpeg_large, &variant.jpeg_small)),
        (IMAGE_FALLBACK_SMALL_FIELD, either(&variant.jpeg_small, &variant.jpeg_large)),
    ];
    for (field, value) in derived {
        if let Some(value) = value {
            record.insert(field.to_string(), Value::String(value));
        }
    }
    record
}

pub fn load_catalog(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).io_context("reading catalog", path)?;
    serde_json::from_str(&content).map_err(|error| QuireError::JsonParse {
        path: path.to_path_buf(),
        message: error.to_string(),
    })
}

/// Checks the catalog document and returns its record count.
pub fn validate_catalog(document: &Value, path: &Path) -> Result<usize> {
    let Some(records) = document.as_array() else {
        return Err(QuireError::CatalogNotArray {
            path: path.to_path_buf(),
        });
    };

    let mut seen_ids: HashMap<String, usize> = HashMap::new();
    for (index, record) in records.iter().enumerate() {
        for field in REQUIRED_FIELDS {
            if record.get(field).is_none() {
                return Err(QuireError::MissingField {
                    field: field.to_string(),
                    index,
                });
            }
        }

        let id = &record["id"];
        // Keyed by JSON text so that "1" and 1 stay distinct.
        if let Some(&first_index) = seen_ids.get(&id.to_string()) {
            return Err(QuireError::DuplicateId {
                id: display_id(Some(id)),
                index,
                first_index,
            });
        }
        seen_ids.insert(id.to_string(), index);

        let price = price_text(&record["precio"]);
        if parse_price(&price).is_none() {
            return Err(QuireError::InvalidPrice {
                value: price,
                index,
            });
        }
    }

    Ok(records.len())
}

/// Numeric value of a display price such as `$1.000`: every character other
/// than digits, `.` and `-` is dropped and the leading number is read.
pub fn parse_price(text: &str) -> Option<f64> {
    let stripped: String = text
        .chars()
        .filter(|character| character.is_ascii_digit() || matches!(character, '.' | '-'))
        .collect();
    leading_number(&stripped)
}

fn leading_number(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end += 1;
    }
    let integer_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut digits = end - integer_start;
    if bytes.get(end) == Some(&b'.') {
        let fraction_start = end + 1;
        let mut fraction_end = fraction_start;
        while bytes.get(fraction_end).is_some_and(u8::is_ascii_digit) {
            fraction_end += 1;
        }
        if digits > 0 || fraction_end > fraction_start {
            digits += fraction_end - fraction_start;
            end = fraction_end;
        }
    }
    if digits == 0 {
        return None;
    }
    text[..end].parse().ok()
}

fn price_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn display_id(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "<none>".to_string(),
    }
}

/// Reads the raw catalog, optionally validates it, enhances every record and
/// writes the result pretty-printed with two-space indentation.
pub fn emit_catalog(
    source: &Path,
    destination: &Path,
    variants: &VariantTable,
    validate: bool,
) -> Result<usize> {
    let document = load_catalog(source)?;
    if validate {
        validate_catalog(&document, source)?;
    }

    let Value::Array(records) = document else {
        return Err(QuireError::CatalogNotArray {
            path: source.to_path_buf(),
        });
    };

    let enhanced: Vec<Value> = records
        .into_iter()
        .map(|record| match record {
            Value::Object(record) => Value::Object(enhance(record, variants)),
            other => other,
        })
        .collect();

    let rendered = serde_json::to_string_pretty(&enhanced).map_err(|error| QuireError::JsonParse {
        path: destination.to_path_buf(),
        message: error.to_string(),
    })?;

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).io_context("creating directory", parent)?;
    }
    fs::write(destination, rendered).io_context("writing catalog", destination)?;

    tracing::info!(records = enhanced.len(), path = %destination.display(), "emitted catalog");
    Ok(enhanced.len())
}
