use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A fixed, immovable commitment that subtracts from availability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i32,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Event {
    pub fn new(id: i32, title: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            id,
            title: title.into(),
            start,
            end,
        }
    }

    /// Two events overlap when one starts before the other ends.
    pub fn overlaps(&self, other: &Event) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Merge overlapping or touching events into maximal blocked intervals.
///
/// Events must be merged before they are subtracted from a day window;
/// otherwise two overlapping events would each punch their own hole and
/// resurrect time covered by the other.
pub fn merge_overlapping(events: &[Event]) -> Vec<Event> {
    if events.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<Event> = events.to_vec();
    sorted.sort_by_key(|e| e.start);

    let mut merged: Vec<Event> = Vec::with_capacity(sorted.len());
    for event in sorted {
        match merged.last_mut() {
            Some(last) if event.start <= last.end => {
                if event.end > last.end {
                    last.end = event.end;
                }
            }
            _ => merged.push(event),
        }
    }
    merged
}
