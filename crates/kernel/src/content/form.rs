//! Multi-value form field reconstruction.
//!
//! Browsers and API clients send repeated values as index-suffixed keys:
//! `tags.0=a&tags.2=c&tags.1=b`. [`reconstruct`] turns those back into one
//! ordered field, `tags = [a, b, c]`, ordered by index regardless of the
//! order the keys arrived in. [`flatten`] is the inverse.

use std::collections::BTreeMap;

use thiserror::Error;
use vivaio_sdk::types::FormFields;

/// What to do when a field arrives both plain and indexed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CollisionPolicy {
    /// Append the indexed values after the plain value.
    #[default]
    Append,
    /// Refuse the submission.
    Reject,
}

/// Form reconstruction errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("field '{0}' was submitted both plain and indexed")]
    Ambiguous(String),

    #[error("malformed form encoding: {0}")]
    Malformed(String),
}

/// Split `field.N` into `(field, N)`.
///
/// Only keys with exactly one `.` followed by a non-empty, all-digit
/// suffix are indexed; anything else is a plain key.
pub fn split_indexed(key: &str) -> Option<(&str, u64)> {
    let (field, suffix) = key.split_once('.')?;
    if field.is_empty() || suffix.is_empty() || suffix.contains('.') {
        return None;
    }
    if !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok().map(|index| (field, index))
}

/// Rebuild ordered multi-value fields from decoded form pairs.
///
/// Repeated plain keys keep their arrival order. Indexed keys are grouped
/// by field and concatenated in ascending index order; missing indices are
/// skipped. A field that ends up with no values is left out.
pub fn reconstruct<I, K, V>(pairs: I, policy: CollisionPolicy) -> Result<FormFields, FormError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    let mut plain: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut indexed: BTreeMap<String, BTreeMap<u64, Vec<String>>> = BTreeMap::new();

    for (key, value) in pairs {
        let key = key.as_ref();
        match split_indexed(key) {
            Some((field, index)) => indexed
                .entry(field.to_string())
                .or_default()
                .entry(index)
                .or_default()
                .push(value.into()),
            None => plain.entry(key.to_string()).or_default().push(value.into()),
        }
    }

    for (field, by_index) in indexed {
        let values = by_index.into_values().flatten();
        // A blank plain value is an unset field, not a collision.
        let collides = plain
            .get(&field)
            .and_then(|existing| existing.first())
            .is_some_and(|first| !first.is_empty());
        if collides {
            if policy == CollisionPolicy::Reject {
                return Err(FormError::Ambiguous(field));
            }
            plain.entry(field).or_default().extend(values);
        } else {
            plain.insert(field, values.collect());
        }
    }

    Ok(FormFields::from(plain))
}

/// Encode fields back into pairs: single values as `field`, multiple
/// values as `field.0`, `field.1`, ...
pub fn flatten(fields: &FormFields) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (name, values) in fields.iter() {
        if let [single] = values.as_slice() {
            pairs.push((name.clone(), single.clone()));
        } else {
            for (i, value) in values.iter().enumerate() {
                pairs.push((format!("{name}.{i}"), value.clone()));
            }
        }
    }
    pairs
}

/// Decode an `application/x-www-form-urlencoded` body into ordered pairs.
pub fn parse_urlencoded(body: &str) -> Result<Vec<(String, String)>, FormError> {
    body.split('&')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            Ok((decode_component(key)?, decode_component(value)?))
        })
        .collect()
}

fn decode_component(raw: &str) -> Result<String, FormError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .map_err(|_| FormError::Malformed(raw.to_string()))
}
