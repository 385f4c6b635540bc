//! Core types shared by the kernel and extensions.
//!
//! Every content type embeds an [`Item`] (flattened into its JSON form) so
//! that identity keys appear at the top level of persisted records.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publication status of a content record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Public,
    Pending,
    Draft,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Public => "public",
            Status::Pending => "pending",
            Status::Draft => "draft",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity embedded in every content record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Item {
    /// Stable identifier (UUIDv7), assigned on create.
    pub uuid: Uuid,

    /// Numeric id, unique within the content type. Zero until persisted.
    pub id: i64,

    /// Human-readable key, unique across all types.
    pub slug: String,

    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: i64,

    /// Last update time, milliseconds since the Unix epoch.
    pub updated: i64,

    pub status: Status,
}

impl Item {
    /// Field schema of the identity keys, in declaration order.
    pub fn field_schema() -> Vec<FieldSchema> {
        vec![
            FieldSchema::new("uuid", "Uuid"),
            FieldSchema::new("id", "i64"),
            FieldSchema::new("slug", "String"),
            FieldSchema::new("timestamp", "i64"),
            FieldSchema::new("updated", "i64"),
            FieldSchema::new("status", "Status"),
        ]
    }

    /// Whether `key` names one of the identity fields.
    pub fn is_identity_key(key: &str) -> bool {
        matches!(
            key,
            "uuid" | "id" | "slug" | "timestamp" | "updated" | "status"
        )
    }
}

/// Name and declared type of one content field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub type_name: String,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// The record a write operation landed on, available to after-hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTarget {
    pub type_name: String,
    pub id: i64,
}

impl fmt::Display for ContentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}

/// Who is making the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    /// Result of the external authorization check.
    pub authorized: bool,

    /// Peer address, when known.
    pub remote_addr: Option<String>,
}

impl Caller {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authorized() -> Self {
        Self {
            authorized: true,
            remote_addr: None,
        }
    }
}

/// Outcome of a type's visibility predicate for one caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Operation a hook chain is running for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Respond,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Respond => "respond",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Submitted form data after multi-value reconstruction.
///
/// Each field maps to its ordered values. A field is never present with an
/// empty value list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormFields(BTreeMap<String, Vec<String>>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// All values of `name`, in submission order.
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.0.get(name).map(Vec::as_slice)
    }

    /// First value of `name`.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// Replace the values of `name`. An empty list removes the field.
    pub fn set(&mut self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        if values.is_empty() {
            self.0.remove(&name);
        } else {
            self.0.insert(name, values);
        }
    }

    /// Append one value to `name`.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.entry(name.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.0.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

impl From<BTreeMap<String, Vec<String>>> for FormFields {
    fn from(mut map: BTreeMap<String, Vec<String>>) -> Self {
        map.retain(|_, values| !values.is_empty());
        Self(map)
    }
}

impl IntoIterator for FormFields {
    type Item = (String, Vec<String>);
    type IntoIter = std::collections::btree_map::IntoIter<String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn item_defaults_to_public() {
        let item: Item = serde_json::from_str("{}").unwrap();
        assert_eq!(item.status, Status::Public);
        assert_eq!(item.id, 0);
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&Status::Draft).unwrap();
        assert_eq!(json, "\"draft\"");
    }

    #[test]
    fn target_displays_as_store_key() {
        let target = ContentTarget {
            type_name: "Post".into(),
            id: 7,
        };
        assert_eq!(target.to_string(), "Post:7");
    }

    #[test]
    fn form_fields_drop_empty_values() {
        let mut fields = FormFields::new();
        fields.set("tags", vec!["a".into()]);
        fields.set("tags", Vec::new());
        assert!(fields.is_empty());

        let mut map = BTreeMap::new();
        map.insert("empty".to_string(), Vec::new());
        map.insert("title".to_string(), vec!["Hi".to_string()]);
        let fields = FormFields::from(map);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.first("title"), Some("Hi"));
    }

    #[test]
    fn identity_keys_cover_schema() {
        for field in Item::field_schema() {
            assert!(Item::is_identity_key(&field.name));
        }
        assert!(!Item::is_identity_key("title"));
    }
}
