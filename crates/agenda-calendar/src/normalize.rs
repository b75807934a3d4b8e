//! Raw API events into [`CalendarEvent`]s, plus the per-day views.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::types::{CalendarEvent, EventStatus, RawEvent};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Convert one API record.
///
/// All-day events keep their dates verbatim. Timed events keep the offset the
/// server sent and take their lookup date from the local start time. An event
/// with no usable start comes back with an empty `date`.
pub fn normalize(raw: RawEvent) -> CalendarEvent {
    let mut event = CalendarEvent {
        id: raw.id,
        summary: raw.summary.unwrap_or_default(),
        status: EventStatus::from_api(raw.status.as_deref()),
        date: String::new(),
        all_day: false,
        end_date: None,
        start: None,
        end: None,
    };

    let Some(start) = raw.start else {
        return event;
    };

    if let Some(date) = start.date {
        event.all_day = true;
        event.date = date;
        event.end_date = raw.end.and_then(|end| end.date);
    } else if let Some(start) = start.date_time.as_deref().and_then(parse_date_time) {
        event.date = start.format(DATE_FORMAT).to_string();
        event.start = Some(start);
        event.end = raw
            .end
            .and_then(|end| end.date_time)
            .as_deref()
            .and_then(parse_date_time);
    } else {
        tracing::debug!("Event {} has an unreadable start time", event.id);
    }

    event
}

pub fn normalize_all(raw: Vec<RawEvent>) -> Vec<CalendarEvent> {
    raw.into_iter().map(normalize).collect()
}

fn parse_date_time(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s).ok()
}

/// One entry per covered day for multi-day all-day events.
///
/// `end_date` is exclusive, so `2026-03-01..2026-03-04` covers three days.
/// Everything else passes through in order.
pub fn expand_multi_day(events: &[CalendarEvent]) -> Vec<CalendarEvent> {
    let mut expanded = Vec::with_capacity(events.len());

    for event in events {
        match covered_days(event) {
            Some(days) if days.len() > 1 => {
                expanded.extend(days.into_iter().map(|day| CalendarEvent {
                    date: day.format(DATE_FORMAT).to_string(),
                    ..event.clone()
                }));
            }
            _ => expanded.push(event.clone()),
        }
    }

    expanded
}

fn covered_days(event: &CalendarEvent) -> Option<Vec<NaiveDate>> {
    if !event.all_day {
        return None;
    }
    let start = NaiveDate::parse_from_str(&event.date, DATE_FORMAT).ok()?;
    let end = NaiveDate::parse_from_str(event.end_date.as_deref()?, DATE_FORMAT).ok()?;

    Some(start.iter_days().take_while(|day| *day < end).collect())
}

/// Events keyed by `YYYY-MM-DD`, in input order within a day.
///
/// Events without a date are left out.
pub fn group_by_date(events: &[CalendarEvent]) -> BTreeMap<String, Vec<CalendarEvent>> {
    let mut days: BTreeMap<String, Vec<CalendarEvent>> = BTreeMap::new();
    for event in events.iter().filter(|e| !e.date.is_empty()) {
        days.entry(event.date.clone()).or_default().push(event.clone());
    }
    days
}
