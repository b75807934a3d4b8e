//! Folding a batch of remote changes into the local event list.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{CalendarEvent, EventStatus};

/// Apply `delta` on top of `existing`.
///
/// Cancelled events are removed, anything else is inserted or replaces the
/// entry with the same id. The result holds at most one entry per id and is
/// sorted with [`compare_events`]. Works on the canonical list, before
/// multi-day expansion.
pub fn merge(existing: &[CalendarEvent], delta: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    let mut by_id: HashMap<String, CalendarEvent> = existing
        .iter()
        .map(|event| (event.id.clone(), event.clone()))
        .collect();

    for event in delta {
        if event.status == EventStatus::Cancelled {
            by_id.remove(&event.id);
        } else {
            by_id.insert(event.id.clone(), event);
        }
    }

    let mut merged: Vec<CalendarEvent> = by_id.into_values().collect();
    sort_events(&mut merged);
    merged
}

pub fn sort_events(events: &mut [CalendarEvent]) {
    events.sort_by(compare_events);
}

/// Day first, then all-day events ahead of timed ones, then start time, then id.
pub fn compare_events(a: &CalendarEvent, b: &CalendarEvent) -> Ordering {
    a.date
        .cmp(&b.date)
        .then_with(|| b.all_day.cmp(&a.all_day))
        .then_with(|| a.start.cmp(&b.start))
        .then_with(|| a.id.cmp(&b.id))
}
