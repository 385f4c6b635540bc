//! Vivaio test utilities.
//!
//! Helpers for integration testing: request body builders for the write
//! endpoints and assertion utilities for API responses.

use uuid::Uuid;

/// Builder for `application/x-www-form-urlencoded` bodies.
#[derive(Debug, Clone, Default)]
pub struct FormBody {
    pairs: Vec<(String, String)>,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `key=value` pair. Repeated keys are kept in order.
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// Add `key.0`, `key.1`, ... for each value.
    pub fn indexed(mut self, key: &str, values: &[&str]) -> Self {
        for (i, value) in values.iter().enumerate() {
            self.pairs.push((format!("{key}.{i}"), value.to_string()));
        }
        self
    }

    pub fn content_type(&self) -> &'static str {
        "application/x-www-form-urlencoded"
    }

    /// Percent-encoded body.
    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Builder for `multipart/form-data` bodies.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    boundary: String,
    parts: Vec<Part>,
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    filename: Option<String>,
    data: Vec<u8>,
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartBody {
    pub fn new() -> Self {
        Self {
            boundary: format!("vivaio-{}", Uuid::now_v7().simple()),
            parts: Vec::new(),
        }
    }

    /// Add a text field.
    pub fn field(mut self, name: &str, value: &str) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: None,
            data: value.as_bytes().to_vec(),
        });
        self
    }

    /// Add a file part.
    pub fn file(mut self, name: &str, filename: &str, data: &[u8]) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: Some(filename.to_string()),
            data: data.to_vec(),
        });
        self
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for part in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match &part.filename {
                Some(filename) => {
                    out.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                            part.name, filename
                        )
                        .as_bytes(),
                    );
                    out.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                }
                None => {
                    out.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", part.name)
                            .as_bytes(),
                    );
                }
            }
            out.extend_from_slice(&part.data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        out
    }
}

/// Assertion helpers for API responses.
pub mod assert {
    use serde_json::Value;

    /// Assert that a JSON value has a specific key.
    pub fn has_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_some(),
            "Expected JSON to have key '{key}', got: {value}"
        );
    }

    /// Assert that a JSON value lacks a specific key.
    pub fn lacks_key(value: &Value, key: &str) {
        assert!(
            value.get(key).is_none(),
            "Expected JSON to lack key '{key}', got: {value}"
        );
    }

    /// The `data` array of a `{"data": [...]}` envelope.
    pub fn data(body: &Value) -> &Vec<Value> {
        match body.get("data").and_then(Value::as_array) {
            Some(data) => data,
            None => panic!("Expected a {{\"data\": [...]}} envelope, got: {body}"),
        }
    }

    /// Assert an error body of the form `{"success": false, "error": ...}`.
    pub fn failure(body: &Value) {
        assert_eq!(
            body.get("success"),
            Some(&Value::Bool(false)),
            "Expected a failure body, got: {body}"
        );
        has_key(body, "error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_body_encodes_in_order() {
        let body = FormBody::new()
            .field("title", "Hello world")
            .indexed("tags", &["a&b", "c"]);
        assert_eq!(body.encode(), "title=Hello%20world&tags.0=a%26b&tags.1=c");
    }

    #[test]
    fn multipart_body_has_parts_and_terminator() {
        let body = MultipartBody::new()
            .field("title", "Hi")
            .file("cover", "cover.png", b"PNG");
        let encoded = String::from_utf8(body.encode()).unwrap_or_default();

        assert!(body.content_type().starts_with("multipart/form-data; boundary=vivaio-"));
        assert!(encoded.contains("name=\"title\"\r\n\r\nHi\r\n"));
        assert!(encoded.contains("filename=\"cover.png\""));
        assert!(encoded.trim_end().ends_with("--"));
    }

    #[test]
    fn assertions() {
        let json = serde_json::json!({"success": false, "error": "nope"});
        assert::failure(&json);
        assert::lacks_key(&json, "data");

        let ok = serde_json::json!({"data": [{"id": 1}]});
        assert_eq!(assert::data(&ok).len(), 1);
    }
}
