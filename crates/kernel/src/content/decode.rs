//! Decodes reconstructed form fields into a content instance.
//!
//! Form values are strings; the instance's own JSON form says what each
//! field should become. A submitted key is converted to the JSON kind of
//! the current value under that key, merged over the instance, and loaded
//! back. Keys the instance does not have are ignored.

use serde_json::{Map, Number, Value};
use thiserror::Error;
use vivaio_sdk::content::Content;
use vivaio_sdk::types::{FieldSchema, FormFields};

/// Decoding errors. All are the caller's fault.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("field '{field}': expected {expected}, got '{value}'")]
    Convert {
        field: String,
        expected: &'static str,
        value: String,
    },

    #[error("content does not serialize to an object")]
    NotAnObject,

    #[error("failed to serialize content: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("invalid field value: {0}")]
    Load(#[source] serde_json::Error),
}

/// Merge `form` into `content`.
pub fn decode_into(content: &mut dyn Content, form: &FormFields) -> Result<(), DecodeError> {
    let schema = content.field_schema();
    let mut value = content.to_value().map_err(DecodeError::Encode)?;
    let Value::Object(map) = &mut value else {
        return Err(DecodeError::NotAnObject);
    };

    merge_form(map, form, &schema)?;
    content.load_value(value).map_err(DecodeError::Load)
}

/// Convert and overwrite every key of `form` that `map` already has.
///
/// `schema` fills in element kinds the JSON cannot show: the items of an
/// empty list, or the inner type of an unset optional field.
pub fn merge_form(
    map: &mut Map<String, Value>,
    form: &FormFields,
    schema: &[FieldSchema],
) -> Result<(), DecodeError> {
    for (name, values) in form.iter() {
        let Some(template) = map.get(name) else {
            continue;
        };
        let hint = schema
            .iter()
            .find(|f| f.name == *name)
            .map(|f| f.type_name.as_str());
        if let Some(converted) = convert(name, template, hint, values)? {
            map.insert(name.clone(), converted);
        }
    }
    Ok(())
}

/// Convert `values` to the kind of `template`. `None` keeps the current value.
fn convert(
    field: &str,
    template: &Value,
    hint: Option<&str>,
    values: &[String],
) -> Result<Option<Value>, DecodeError> {
    match template {
        Value::Array(items) => {
            let element = items
                .first()
                .cloned()
                .or_else(|| hint.and_then(|h| inner_type(h, "Vec")).and_then(scalar_template))
                .unwrap_or(Value::Null);
            let mut out = Vec::with_capacity(values.len());
            for raw in values {
                if raw.is_empty() && !matches!(element, Value::String(_) | Value::Null) {
                    continue;
                }
                if let Some(v) = convert_one(field, &element, raw)? {
                    out.push(v);
                }
            }
            Ok(Some(Value::Array(out)))
        }
        Value::Null => {
            let Some(raw) = values.first() else {
                return Ok(None);
            };
            if raw.is_empty() {
                return Ok(Some(Value::Null));
            }
            match hint.and_then(|h| inner_type(h, "Option")).and_then(scalar_template) {
                Some(inner) => convert_one(field, &inner, raw),
                None => Ok(Some(Value::String(raw.clone()))),
            }
        }
        _ => match values.first() {
            Some(raw) => convert_one(field, template, raw),
            None => Ok(None),
        },
    }
}

fn convert_one(field: &str, template: &Value, raw: &str) -> Result<Option<Value>, DecodeError> {
    let err = |expected| DecodeError::Convert {
        field: field.to_string(),
        expected,
        value: raw.to_string(),
    };

    match template {
        Value::Number(n) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            if n.is_f64() {
                let f: f64 = trimmed.parse().map_err(|_| err("a number"))?;
                Number::from_f64(f)
                    .map(|n| Some(Value::Number(n)))
                    .ok_or_else(|| err("a finite number"))
            } else {
                trimmed
                    .parse::<i64>()
                    .map(Value::from)
                    .or_else(|_| trimmed.parse::<u64>().map(Value::from))
                    .map(Some)
                    .map_err(|_| err("an integer"))
            }
        }
        Value::Bool(_) => parse_bool(raw)
            .map(|b| Some(Value::Bool(b)))
            .ok_or_else(|| err("a boolean")),
        Value::Object(_) => {
            if raw.trim().is_empty() {
                return Ok(None);
            }
            match serde_json::from_str::<Value>(raw) {
                Ok(v @ Value::Object(_)) => Ok(Some(v)),
                _ => Err(err("a JSON object")),
            }
        }
        Value::Array(_) => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_array)
            .map(Some)
            .ok_or_else(|| err("a JSON array")),
        Value::String(_) | Value::Null => Ok(Some(Value::String(raw.to_string()))),
    }
}

/// `T` out of `Wrapper<T>`.
fn inner_type<'a>(type_name: &'a str, wrapper: &str) -> Option<&'a str> {
    type_name
        .strip_prefix(wrapper)?
        .strip_prefix('<')?
        .strip_suffix('>')
}

/// A JSON value of the kind a scalar Rust type serializes to.
fn scalar_template(type_name: &str) -> Option<Value> {
    match type_name {
        "i8" | "i16" | "i32" | "i64" | "isize" | "u8" | "u16" | "u32" | "u64" | "usize" => {
            Some(Value::from(0))
        }
        "f32" | "f64" => Some(Value::from(0.0)),
        "bool" => Some(Value::Bool(false)),
        "String" => Some(Value::String(String::new())),
        _ => None,
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" | "checked" => Some(true),
        "false" | "off" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}
