//! Calendar API types and the normalized event model.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A calendar event as handed to the presentation layer.
///
/// Replaced wholesale on every change; nothing edits one in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Remote identifier, stable across syncs
    pub id: String,
    pub summary: String,
    pub status: EventStatus,
    /// `YYYY-MM-DD` lookup key, whatever the event kind
    pub date: String,
    pub all_day: bool,
    /// Exclusive end date, all-day events only
    pub end_date: Option<String>,
    /// Timed events only; offset as sent by the server
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
}

/// Event status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Confirmed,
    Tentative,
    Cancelled,
}

impl EventStatus {
    /// Unknown or missing values count as confirmed.
    pub fn from_api(status: Option<&str>) -> Self {
        match status {
            Some("tentative") => Self::Tentative,
            Some("cancelled") => Self::Cancelled,
            _ => Self::Confirmed,
        }
    }
}

// API Response Types

/// Google Calendar API event resource, only the fields sync needs.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub id: String,
    pub summary: Option<String>,
    pub status: Option<String>,
    pub start: Option<RawEventTime>,
    pub end: Option<RawEventTime>,
}

/// Either `date` (all-day) or `dateTime` (timed) is set.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEventTime {
    pub date_time: Option<String>,
    pub date: Option<String>,
    pub time_zone: Option<String>,
}

/// API response for event list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventListResponse {
    #[serde(default)]
    pub items: Vec<RawEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Google JSON error body: `{"error": {"code": 410, "message": "..."}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorResponse {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_status_from_api() {
        assert_eq!(EventStatus::from_api(Some("confirmed")), EventStatus::Confirmed);
        assert_eq!(EventStatus::from_api(Some("tentative")), EventStatus::Tentative);
        assert_eq!(EventStatus::from_api(Some("cancelled")), EventStatus::Cancelled);
        assert_eq!(EventStatus::from_api(Some("bogus")), EventStatus::Confirmed);
        assert_eq!(EventStatus::from_api(None), EventStatus::Confirmed);
    }

    #[test]
    fn test_event_list_response() {
        let json = r#"{
            "kind": "calendar#events",
            "items": [
                {"id": "a", "summary": "Standup", "start": {"dateTime": "2026-02-14T10:00:00+02:00"}},
                {"id": "b", "status": "cancelled"}
            ],
            "nextSyncToken": "CPDAlvWDx70CEPDAlvWDx70CGAU="
        }"#;

        let resp: EventListResponse = serde_json::from_str(json).unwrap();

        assert_eq!(resp.items.len(), 2);
        assert!(resp.next_page_token.is_none());
        assert_eq!(resp.next_sync_token.as_deref(), Some("CPDAlvWDx70CEPDAlvWDx70CGAU="));
        assert!(resp.items[1].start.is_none());
    }

    #[test]
    fn test_empty_page_has_no_items() {
        let resp: EventListResponse =
            serde_json::from_str(r#"{"nextPageToken": "p2"}"#).unwrap();
        assert!(resp.items.is_empty());
        assert_eq!(resp.next_page_token.as_deref(), Some("p2"));
    }
}
