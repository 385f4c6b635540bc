//! Events extension for Vivaio.
//!
//! Provides an `Event` content type. Start and end times are submitted as
//! RFC 3339 timestamps and stored normalized to UTC. Title and location are
//! searchable. Cancelled events stay in the store but are only shown to
//! authorized callers.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use vivaio_sdk::prelude::*;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Content)]
#[content(hooks, visibility = event_visibility)]
#[serde(default)]
pub struct Event {
    #[serde(flatten)]
    pub item: Item,
    #[content(search)]
    pub title: String,
    #[content(search)]
    pub location: String,

    /// RFC 3339, UTC.
    pub starts_at: String,

    /// RFC 3339, UTC. Empty for open-ended events.
    pub ends_at: String,

    /// Seats available; `None` means unlimited.
    pub capacity: Option<i64>,

    pub cancelled: bool,
}

fn event_visibility(event: &Event, caller: &Caller) -> Visibility {
    if event.cancelled && !caller.authorized {
        return Visibility::Hidden;
    }
    default_visibility(&event.item, caller)
}

fn parse_time(field: &str, raw: &str) -> Result<DateTime<Utc>, HookError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| HookError::rejected(format!("{field} must be an RFC 3339 timestamp: {e}")))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl Hookable for Event {
    async fn before_save(&mut self, _ctx: &HookContext) -> Result<(), HookError> {
        if self.title.trim().is_empty() {
            return Err(HookError::rejected("an event needs a title"));
        }

        let starts = parse_time("starts_at", &self.starts_at)?;
        self.starts_at = format_time(starts);

        if !self.ends_at.trim().is_empty() {
            let ends = parse_time("ends_at", &self.ends_at)?;
            if ends < starts {
                return Err(HookError::rejected("ends_at is before starts_at"));
            }
            self.ends_at = format_time(ends);
        }

        if self.capacity.is_some_and(|c| c < 0) {
            return Err(HookError::rejected("capacity cannot be negative"));
        }

        if self.item.slug.trim().is_empty() {
            self.item.slug = slugify(&format!("{} {}", starts.format("%Y-%m-%d"), self.title));
        }
        Ok(())
    }
}

#[attach]
pub fn attach(registrar: &mut dyn Registrar) {
    registrar.register_default::<Event>("Event");
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn ctx() -> HookContext {
        HookContext::new(Operation::Create, "Event", Caller::anonymous())
    }

    fn event(starts_at: &str) -> Event {
        Event {
            title: "RustConf".into(),
            starts_at: starts_at.into(),
            ..Event::default()
        }
    }

    #[tokio::test]
    async fn times_are_normalized_to_utc() {
        let mut e = event("2026-09-08T09:00:00-07:00");
        e.ends_at = "2026-09-10T17:00:00-07:00".into();
        e.before_save(&ctx()).await.unwrap();
        assert_eq!(e.starts_at, "2026-09-08T16:00:00Z");
        assert_eq!(e.ends_at, "2026-09-11T00:00:00Z");
        assert_eq!(e.item.slug, "2026-09-08-rustconf");
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let mut bad_time = event("next tuesday");
        assert!(bad_time.before_save(&ctx()).await.is_err());

        let mut backwards = event("2026-09-08T09:00:00Z");
        backwards.ends_at = "2026-09-07T09:00:00Z".into();
        assert!(backwards.before_save(&ctx()).await.is_err());

        let mut negative = event("2026-09-08T09:00:00Z");
        negative.capacity = Some(-1);
        assert!(negative.before_save(&ctx()).await.is_err());
    }

    #[test]
    fn cancelled_events_hidden_from_anonymous_callers() {
        let mut e = event("2026-09-08T09:00:00Z");
        assert_eq!(e.visibility(&Caller::anonymous()), Visibility::Visible);

        e.cancelled = true;
        assert_eq!(e.visibility(&Caller::anonymous()), Visibility::Hidden);
        assert_eq!(e.visibility(&Caller::authorized()), Visibility::Visible);
    }
}
