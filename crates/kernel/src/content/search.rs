//! Type-scoped search over stored records.
//!
//! A query is split on whitespace into lowercase terms. A record matches
//! when every term is a prefix of some word in its searchable fields.
//! Words are runs of alphanumeric characters; strings, numbers, and arrays
//! of them are searched, anything else is ignored.

use serde_json::Value;

/// A parsed search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    /// Parse `raw`; `None` when it holds no terms.
    pub fn parse(raw: &str) -> Option<Self> {
        let terms: Vec<String> = words(raw).collect();
        (!terms.is_empty()).then_some(Self { terms })
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Whether `record` matches on any of `fields`.
    pub fn matches(&self, record: &Value, fields: &[String]) -> bool {
        let mut text = Vec::new();
        for field in fields {
            if let Some(value) = record.get(field) {
                collect_words(value, &mut text);
            }
        }
        self.terms
            .iter()
            .all(|term| text.iter().any(|word| word.starts_with(term.as_str())))
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn collect_words(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(words(s)),
        Value::Number(n) => out.push(n.to_string()),
        Value::Array(items) => items.iter().for_each(|item| collect_words(item, out)),
        _ => {}
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn blank_queries_have_no_terms() {
        assert!(SearchQuery::parse("").is_none());
        assert!(SearchQuery::parse("  -- ").is_none());
        assert_eq!(
            SearchQuery::parse("Async  RUST").unwrap().terms(),
            ["async", "rust"]
        );
    }

    #[test]
    fn every_term_must_prefix_a_word() {
        let record = json!({"title": "Async Rust in practice", "body": "Tokio runtimes"});
        let searched = fields(&["title", "body"]);

        assert!(SearchQuery::parse("rust tok").unwrap().matches(&record, &searched));
        assert!(SearchQuery::parse("PRACT").unwrap().matches(&record, &searched));
        assert!(!SearchQuery::parse("rust go").unwrap().matches(&record, &searched));
        assert!(!SearchQuery::parse("sync").unwrap().matches(&record, &searched));
    }

    #[test]
    fn only_listed_fields_are_searched() {
        let record = json!({"title": "Hello", "editor_notes": "secret"});
        let query = SearchQuery::parse("secret").unwrap();
        assert!(!query.matches(&record, &fields(&["title"])));
        assert!(query.matches(&record, &fields(&["editor_notes"])));
    }

    #[test]
    fn arrays_and_numbers_are_searched() {
        let record = json!({"tags": ["rust", "web-dev"], "year": 2026, "draft": true});
        let searched = fields(&["tags", "year", "draft"]);
        assert!(SearchQuery::parse("dev 2026").unwrap().matches(&record, &searched));
        assert!(!SearchQuery::parse("true").unwrap().matches(&record, &searched));
    }
}
