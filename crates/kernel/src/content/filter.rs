//! Response filter pipeline.
//!
//! Every record leaving the API passes through these filters, before any
//! response hook sees it:
//! - visibility: drops records the caller may not see
//! - omission: strips fields the type declares response-private

use serde_json::Value;
use vivaio_sdk::content::Content;
use vivaio_sdk::types::{Caller, Visibility};

/// A filter applied to one serialized record.
pub trait RecordFilter: Send + Sync {
    /// Filter name for debugging.
    fn name(&self) -> &str;

    /// Return the record to send, or `None` to drop it. `instance` holds
    /// the same record, decoded.
    fn apply(&self, instance: &dyn Content, caller: &Caller, record: Value) -> Option<Value>;
}

/// Pipeline of record filters applied in sequence.
pub struct FilterPipeline {
    filters: Vec<Box<dyn RecordFilter>>,
}

impl FilterPipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter to the pipeline.
    pub fn add<F: RecordFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Visibility, then field omission.
    pub fn standard() -> Self {
        Self::new().add(VisibilityFilter).add(OmitFilter)
    }

    /// Run every filter; stops at the first one that drops the record.
    pub fn apply(&self, instance: &dyn Content, caller: &Caller, record: Value) -> Option<Value> {
        self.filters
            .iter()
            .try_fold(record, |record, filter| filter.apply(instance, caller, record))
    }
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

/// Drops records whose type says the caller may not see them.
pub struct VisibilityFilter;

impl RecordFilter for VisibilityFilter {
    fn name(&self) -> &str {
        "visibility"
    }

    fn apply(&self, instance: &dyn Content, caller: &Caller, record: Value) -> Option<Value> {
        match instance.visibility(caller) {
            Visibility::Visible => Some(record),
            Visibility::Hidden => None,
        }
    }
}

/// Removes response-private fields.
pub struct OmitFilter;

impl RecordFilter for OmitFilter {
    fn name(&self) -> &str {
        "omit"
    }

    fn apply(&self, instance: &dyn Content, caller: &Caller, mut record: Value) -> Option<Value> {
        if let Value::Object(map) = &mut record {
            for field in instance.omitted_fields(caller) {
                map.remove(&field);
            }
        }
        Some(record)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use vivaio_sdk::prelude::*;

    #[derive(Default, Serialize, Deserialize, Content)]
    struct Memo {
        #[serde(flatten)]
        item: Item,
        title: String,
        #[content(private)]
        secret: String,
    }

    fn memo(status: Status) -> (Memo, Value) {
        let memo = Memo {
            item: Item {
                id: 1,
                status,
                ..Item::default()
            },
            title: "Hi".into(),
            secret: "shh".into(),
        };
        let value = memo.to_value().unwrap();
        (memo, value)
    }

    #[test]
    fn public_record_loses_private_fields() {
        let (memo, value) = memo(Status::Public);
        let out = FilterPipeline::standard()
            .apply(&memo, &Caller::anonymous(), value)
            .unwrap();
        assert_eq!(out["title"], "Hi");
        assert!(out.get("secret").is_none());
    }

    #[test]
    fn draft_dropped_for_anonymous() {
        let (memo, value) = memo(Status::Draft);
        assert!(
            FilterPipeline::standard()
                .apply(&memo, &Caller::anonymous(), value)
                .is_none()
        );
    }

    #[test]
    fn draft_kept_for_authorized() {
        let (memo, value) = memo(Status::Draft);
        let out = FilterPipeline::standard()
            .apply(&memo, &Caller::authorized(), value)
            .unwrap();
        assert_eq!(out["id"], 1);
    }

    #[test]
    fn empty_pipeline_passes_through() {
        let (memo, _) = memo(Status::Draft);
        let record = json!({"anything": true});
        let out = FilterPipeline::new()
            .apply(&memo, &Caller::anonymous(), record.clone())
            .unwrap();
        assert_eq!(out, record);
    }

    #[test]
    fn filter_names() {
        assert_eq!(VisibilityFilter.name(), "visibility");
        assert_eq!(OmitFilter.name(), "omit");
    }
}
