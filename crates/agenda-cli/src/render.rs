//! Plain-text agenda: one heading per day, one line per event.

use std::fmt::Write;

use agenda_calendar::{group_by_date, CalendarEvent, EventStatus};

pub fn agenda(events: &[CalendarEvent]) -> String {
    let days = group_by_date(events);
    if days.is_empty() {
        return "No upcoming events.\n".to_string();
    }

    let mut out = String::new();
    for (date, events) in days {
        let _ = writeln!(out, "{}", date);
        for event in events {
            let _ = writeln!(out, "  {:<11}  {}", time_range(&event), title(&event));
        }
    }
    out
}

fn time_range(event: &CalendarEvent) -> String {
    if event.all_day {
        return "all day".to_string();
    }
    match (event.start, event.end) {
        (Some(start), Some(end)) => format!("{}-{}", start.format("%H:%M"), end.format("%H:%M")),
        (Some(start), None) => start.format("%H:%M").to_string(),
        _ => String::new(),
    }
}

fn title(event: &CalendarEvent) -> String {
    let summary = if event.summary.is_empty() {
        "(no title)"
    } else {
        event.summary.as_str()
    };
    match event.status {
        EventStatus::Tentative => format!("{} (tentative)", summary),
        _ => summary.to_string(),
    }
}
