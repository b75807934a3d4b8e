//! Google Calendar sync for agenda.
//!
//! Fetches the primary calendar (full or incremental), normalizes events into
//! per-day entries and merges changes into a sorted local list.

pub mod client;
pub mod error;
pub mod merge;
pub mod normalize;
pub mod sync;
pub mod types;

pub use client::{FetchResult, SyncClient, SyncMode, FETCH_TIMEOUT};
pub use error::SyncError;
pub use merge::{compare_events, merge, sort_events};
pub use normalize::{expand_multi_day, group_by_date, normalize, normalize_all};
pub use sync::{CalendarSync, SyncMessage, SYNC_INTERVAL};
pub use types::{CalendarEvent, EventStatus, RawEvent, RawEventTime};
