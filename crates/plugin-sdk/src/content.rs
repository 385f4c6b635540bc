//! The content instance contract.

use std::sync::Arc;

use serde_json::Value;

use crate::hooks::Hookable;
use crate::types::{Caller, FieldSchema, Item, Status, Visibility};

/// A content instance.
///
/// Usually implemented with `#[derive(Content)]`. Instances are created
/// blank by a [`Constructor`], filled from a stored record or a form
/// submission, and dropped at the end of the request.
pub trait Content: Send + Sync + 'static {
    /// The embedded identity.
    fn item(&self) -> &Item;

    fn item_mut(&mut self) -> &mut Item;

    /// Serialize the whole instance, identity keys included.
    fn to_value(&self) -> Result<Value, serde_json::Error>;

    /// Replace the instance's state with `value`.
    fn load_value(&mut self, value: Value) -> Result<(), serde_json::Error>;

    /// Field names and declared types, identity fields first.
    fn field_schema(&self) -> Vec<FieldSchema>;

    /// The lifecycle-hook capability.
    ///
    /// Types returning `None` are rejected by every write handler.
    fn hooks(&mut self) -> Option<&mut dyn Hookable> {
        None
    }

    /// Whether `caller` may see this instance at all.
    fn visibility(&self, caller: &Caller) -> Visibility {
        default_visibility(self.item(), caller)
    }

    /// Fields stripped from responses sent to `caller`.
    fn omitted_fields(&self, _caller: &Caller) -> Vec<String> {
        Vec::new()
    }

    /// Fields matched by type-scoped search. A type with none is not
    /// searchable.
    fn search_fields(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Zero-argument factory for blank instances of one type.
pub type Constructor = Arc<dyn Fn() -> Box<dyn Content> + Send + Sync>;

/// Build a [`Constructor`] from a `Default` content type.
pub fn constructor<T: Content + Default>() -> Constructor {
    Arc::new(|| Box::new(T::default()) as Box<dyn Content>)
}

/// Public records are visible to everyone; anything else only to
/// authorized callers.
pub fn default_visibility(item: &Item, caller: &Caller) -> Visibility {
    if item.status == Status::Public || caller.authorized {
        Visibility::Visible
    } else {
        Visibility::Hidden
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn drafts_hidden_from_anonymous_callers() {
        let item = Item {
            status: Status::Draft,
            ..Item::default()
        };
        assert_eq!(
            default_visibility(&item, &Caller::anonymous()),
            Visibility::Hidden
        );
        assert_eq!(
            default_visibility(&item, &Caller::authorized()),
            Visibility::Visible
        );
    }

    #[test]
    fn public_visible_to_everyone() {
        let item = Item::default();
        assert_eq!(
            default_visibility(&item, &Caller::anonymous()),
            Visibility::Visible
        );
    }
}
