use super::{PipelineContext, Stage};
use crate::calendar::{ScheduleWindow, TimeSlot};
use crate::event::{Event, merge_overlapping};
use crate::graph::GraphError;
use crate::profile::WorkProfile;
use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Horizon walk cap: five years of calendar days.
const MAX_HORIZON_DAYS: i64 = 5 * 365;

/// Computes the available-time calendar for the run.
///
/// Walks working days forward until their accumulated capacity covers the
/// total workload, then emits the free slots of each day with fixed events
/// subtracted. Today is clipped so the window never starts in the past.
pub struct SlotPlanner;

impl Stage for SlotPlanner {
    fn name(&self) -> &'static str {
        "slot_planner"
    }

    fn run(&self, ctx: &mut PipelineContext) -> Result<(), GraphError> {
        let workload_minutes: i64 = ctx
            .tasks
            .iter()
            .filter(|t| !t.completed)
            .map(|t| t.estimated_minutes)
            .sum();

        if workload_minutes == 0 {
            ctx.trace("no workload; schedule window is empty");
            ctx.window = Some(ScheduleWindow::new());
            return Ok(());
        }

        let (horizon_end, capped) = horizon_end_date(ctx.now, &ctx.profile, workload_minutes);
        if capped {
            ctx.trace(format!(
                "workload exceeds capacity within {MAX_HORIZON_DAYS} days; horizon capped at {horizon_end}"
            ));
        }

        let window = build_window(ctx.now, horizon_end, &ctx.profile, &ctx.events);
        ctx.trace(format!(
            "schedule window: {} slots, {} minutes available through {horizon_end}",
            window.slots().len(),
            window.total_minutes()
        ));
        ctx.window = Some(window);
        Ok(())
    }
}

/// Walk forward one calendar day at a time, accumulating each working
/// day's full window capacity, until it covers the workload or the cap is
/// reached. Returns the horizon end and whether the cap bit.
fn horizon_end_date(
    now: NaiveDateTime,
    profile: &WorkProfile,
    workload_minutes: i64,
) -> (NaiveDate, bool) {
    let mut day = now.date();
    let mut accumulated = 0i64;
    let mut walked = 0i64;

    loop {
        if let Some((work_start, work_end)) = profile.work_window(day) {
            // Today only counts what is left of it.
            let effective_start = if day == now.date() {
                now.max(work_start)
            } else {
                work_start
            };
            accumulated += (work_end - effective_start).num_minutes().max(0);
            if accumulated >= workload_minutes {
                return (day, false);
            }
        }
        walked += 1;
        if walked >= MAX_HORIZON_DAYS {
            return (day, true);
        }
        day += Duration::days(1);
    }
}

/// Free slots for every working day from `now` through `horizon_end`,
/// with merged events subtracted from each day's work window.
fn build_window(
    now: NaiveDateTime,
    horizon_end: NaiveDate,
    profile: &WorkProfile,
    events: &[Event],
) -> ScheduleWindow {
    let mut window = ScheduleWindow::new();
    let mut day = now.date();

    while day <= horizon_end {
        if let Some((work_start, work_end)) = profile.work_window(day) {
            // Today starts at max(now, work start) and is skipped outright
            // once now has passed the work end.
            let day_start = if day == now.date() {
                now.max(work_start)
            } else {
                work_start
            };
            if day_start < work_end {
                for slot in day_slots(day_start, work_end, events) {
                    window.push_slot(slot);
                }
            }
        }
        day += Duration::days(1);
    }
    window
}

/// Subtract the events intersecting `[day_start, day_end)` from it,
/// emitting one slot per remaining gap.
fn day_slots(day_start: NaiveDateTime, day_end: NaiveDateTime, events: &[Event]) -> Vec<TimeSlot> {
    let intersecting: Vec<Event> = events
        .iter()
        .filter(|e| e.start < day_end && e.end > day_start)
        .cloned()
        .collect();
    let merged = merge_overlapping(&intersecting);

    let mut slots = Vec::new();
    let mut cursor = day_start;
    for event in merged {
        let blocked_start = event.start.max(day_start);
        let blocked_end = event.end.min(day_end);
        if blocked_start > cursor {
            slots.push(TimeSlot::new(cursor, blocked_start));
        }
        cursor = cursor.max(blocked_end);
    }
    if cursor < day_end {
        slots.push(TimeSlot::new(cursor, day_end));
    }
    slots
}
