use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A free, placeable `[start, end)` interval in the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeSlot {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start <= end, "slot start must not follow its end");
        Self { start, end }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether `[start, end)` fits entirely inside this slot.
    pub fn contains_interval(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start <= start && end <= self.end
    }
}

/// The ordered set of free slots covering the planning horizon.
///
/// This is the allocator's working capacity pool: slots are mutually
/// non-overlapping and sorted by start, and they shrink, split, and merge
/// back as tasks are placed and evicted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    slots: Vec<TimeSlot>,
}

impl ScheduleWindow {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn from_slots(mut slots: Vec<TimeSlot>) -> Self {
        slots.sort_by_key(|s| s.start);
        Self { slots }
    }

    pub fn slots(&self) -> &[TimeSlot] {
        &self.slots
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn total_minutes(&self) -> i64 {
        self.slots.iter().map(TimeSlot::duration_minutes).sum()
    }

    /// Append a slot known to start after every existing one.
    ///
    /// Used by the slot planner, which emits slots in chronological order.
    /// Zero-length slots are dropped.
    pub fn push_slot(&mut self, slot: TimeSlot) {
        if slot.duration_minutes() <= 0 {
            return;
        }
        debug_assert!(
            self.slots.last().map_or(true, |last| last.end <= slot.start),
            "push_slot requires chronological order"
        );
        self.slots.push(slot);
    }

    /// Insert a freed interval, coalescing with adjacent or overlapping
    /// free slots. This is the eviction path: a bumped task's interval
    /// returns to the pool as one maximal gap.
    pub fn insert_merged(&mut self, slot: TimeSlot) {
        if slot.duration_minutes() <= 0 {
            return;
        }
        let mut merged = slot;
        let mut result: Vec<TimeSlot> = Vec::with_capacity(self.slots.len() + 1);
        let mut placed = false;
        for existing in self.slots.drain(..) {
            if existing.end < merged.start {
                result.push(existing);
            } else if existing.start > merged.end {
                if !placed {
                    result.push(merged);
                    placed = true;
                }
                result.push(existing);
            } else {
                // Touching or overlapping: absorb into the merged gap.
                merged.start = merged.start.min(existing.start);
                merged.end = merged.end.max(existing.end);
            }
        }
        if !placed {
            result.push(merged);
        }
        self.slots = result;
    }

    /// Consume `minutes` from the front of slot `idx`, returning the taken
    /// interval. The remainder (if any) stays in place as a shorter slot.
    pub fn take_from_start(&mut self, idx: usize, minutes: i64) -> TimeSlot {
        let slot = self.slots[idx];
        let take = minutes.min(slot.duration_minutes());
        let split = slot.start + Duration::minutes(take);
        if split >= slot.end {
            self.slots.remove(idx);
        } else {
            self.slots[idx].start = split;
        }
        TimeSlot::new(slot.start, split)
    }

    /// Trim `minutes` off the front of slot `idx` without handing the
    /// interval to anyone. Used for breathers between placements.
    pub fn discard_from_start(&mut self, idx: usize, minutes: i64) {
        let _ = self.take_from_start(idx, minutes);
    }

    pub fn remove(&mut self, idx: usize) -> TimeSlot {
        self.slots.remove(idx)
    }

    /// Free capacity usable before `deadline`, in minutes. A slot that
    /// straddles the deadline counts only the portion ending by it.
    pub fn minutes_within(&self, deadline: Option<NaiveDateTime>) -> i64 {
        self.slots
            .iter()
            .map(|slot| {
                let end = deadline.map_or(slot.end, |due| slot.end.min(due));
                (end - slot.start).num_minutes().max(0)
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 6)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn take_from_start_splits_and_removes() {
        let mut window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(9, 0), at(12, 0))]);
        let taken = window.take_from_start(0, 60);
        assert_eq!(taken, TimeSlot::new(at(9, 0), at(10, 0)));
        assert_eq!(window.slots(), &[TimeSlot::new(at(10, 0), at(12, 0))]);

        let rest = window.take_from_start(0, 120);
        assert_eq!(rest, TimeSlot::new(at(10, 0), at(12, 0)));
        assert!(window.is_empty());
    }

    #[test]
    fn insert_merged_coalesces_neighbours() {
        let mut window = ScheduleWindow::from_slots(vec![
            TimeSlot::new(at(9, 0), at(10, 0)),
            TimeSlot::new(at(11, 0), at(12, 0)),
        ]);
        // Freeing 10:00-11:00 bridges the two gaps into one.
        window.insert_merged(TimeSlot::new(at(10, 0), at(11, 0)));
        assert_eq!(window.slots(), &[TimeSlot::new(at(9, 0), at(12, 0))]);
        assert_eq!(window.total_minutes(), 180);
    }

    #[test]
    fn deadline_capacity_clamps_straddling_slots() {
        let window = ScheduleWindow::from_slots(vec![
            TimeSlot::new(at(9, 0), at(10, 0)),
            TimeSlot::new(at(13, 0), at(17, 0)),
        ]);
        assert_eq!(window.minutes_within(Some(at(12, 0))), 60);
        // The afternoon slot straddles 15:00 and counts only two hours.
        assert_eq!(window.minutes_within(Some(at(15, 0))), 180);
        assert_eq!(window.minutes_within(None), 300);
    }
}
