use super::balancer::DayAssignment;
use super::{PipelineContext, Stage};
use crate::graph::GraphError;
use crate::task::ScheduledPart;
use chrono::NaiveDate;

/// Lays each day's bucket out into concrete time-slot offsets.
///
/// Within a day the cognitively heaviest work goes first (complexity
/// descending, importance as tie-break), except that a prerequisite
/// sharing the day always precedes its dependent; fragments consume the
/// day's slots linearly and may span slot boundaries. The balancer is expected
/// to have guaranteed capacity, so any residue is an inconsistency worth
/// a warning, not an error.
pub struct DaySequencer;

impl Stage for DaySequencer {
    fn name(&self) -> &'static str {
        "day_sequencer"
    }

    fn run(&self, ctx: &mut PipelineContext) -> Result<(), GraphError> {
        if ctx.window.is_none() {
            ctx.trace("day sequencer skipped: no schedule window");
            return Ok(());
        }
        let Some(buckets) = ctx.buckets.take() else {
            ctx.trace("day sequencer skipped: no day buckets");
            return Ok(());
        };

        // Clear prior fragments for every task touched by a bucket.
        for bucket in &buckets {
            for assignment in &bucket.assignments {
                if let Some(task) = ctx.tasks.iter_mut().find(|t| t.id == assignment.task_id) {
                    task.clear_schedule();
                }
            }
        }

        let breather = ctx.profile.breather_minutes;
        for bucket in &buckets {
            // Hardest-first within the day.
            let mut entries = bucket.assignments.clone();
            entries.sort_by(|a, b| {
                let ta = ctx.task_by_id(a.task_id);
                let tb = ctx.task_by_id(b.task_id);
                let (ca, ia) = ta.map(|t| (t.complexity, t.importance)).unwrap_or((0.0, 0));
                let (cb, ib) = tb.map(|t| (t.complexity, t.importance)).unwrap_or((0.0, 0));
                cb.partial_cmp(&ca)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| ib.cmp(&ia))
            });

            // A prerequisite sharing the day must be laid out before its
            // dependent; otherwise hardest-first order stands.
            let mut ordered: Vec<DayAssignment> = Vec::with_capacity(entries.len());
            while !entries.is_empty() {
                let pos = entries
                    .iter()
                    .position(|e| {
                        ctx.task_by_id(e.task_id).map_or(true, |t| {
                            t.dependencies
                                .iter()
                                .all(|dep| !entries.iter().any(|o| o.task_id == *dep))
                        })
                    })
                    .unwrap_or(0);
                ordered.push(entries.remove(pos));
            }

            for entry in ordered {
                let placed = lay_out(ctx, bucket.date, entry.task_id, entry.minutes, breather);
                if placed < entry.minutes {
                    ctx.trace(format!(
                        "warning: task {} left {} minutes unplaced on {} (balancer/sequencer inconsistency)",
                        entry.task_id,
                        entry.minutes - placed,
                        bucket.date
                    ));
                }
            }
        }

        ctx.buckets = Some(buckets);
        Ok(())
    }
}

/// Carve up to `minutes` for one task out of the day's slots, appending
/// fragments to the task and consuming the window. Returns minutes placed.
fn lay_out(
    ctx: &mut PipelineContext,
    date: NaiveDate,
    task_id: i32,
    minutes: i64,
    breather: i64,
) -> i64 {
    let window = ctx.window.as_mut().expect("window checked by stage");
    let mut fragments: Vec<ScheduledPart> = Vec::new();
    let mut left = minutes;

    while left > 0 {
        let Some(idx) = window
            .slots()
            .iter()
            .position(|s| s.start.date() == date && s.duration_minutes() > 0)
        else {
            break;
        };
        let take = left.min(window.slots()[idx].duration_minutes());
        let taken = window.take_from_start(idx, take);
        fragments.push(ScheduledPart::new(taken.start, taken.end));
        left -= take;

        // Leave the breather between this task and the next one laid
        // into the same slot.
        if left == 0 && breather > 0 {
            if let Some(next) = window
                .slots()
                .iter()
                .position(|s| s.start == taken.end && s.start.date() == date)
            {
                window.discard_from_start(next, breather);
            }
        }
    }

    let placed = minutes - left;
    if let Some(task) = ctx.tasks.iter_mut().find(|t| t.id == task_id) {
        task.scheduled_parts.extend(fragments);
    }
    placed
}
