use super::{BumpPolicy, PipelineContext, Stage};
use crate::calendar::{ScheduleWindow, TimeSlot};
use crate::graph::GraphError;
use crate::task::{ScheduledPart, Task};
use chrono::{Duration, NaiveDateTime};

/// Best-fit slot scheduler with priority-based displacement.
///
/// Non-divisible tasks are placed first, each into the free slot that
/// wastes the least time; when nothing fits, a strictly lower-importance
/// placed task can be bumped out transactionally and rescheduled
/// elsewhere. Divisible tasks are split greedily across the remaining
/// slots. Under [`BumpPolicy::MultiAppeal`] a final appeal pass lets
/// high-priority divisible tasks request a bundle of bumps to cover a
/// computed shortfall.
pub struct Allocator {
    policy: BumpPolicy,
}

impl Allocator {
    pub fn new(policy: BumpPolicy) -> Self {
        Self { policy }
    }
}

/// A non-divisible task's occupied interval, tracked as bump currency.
#[derive(Debug, Clone, Copy)]
struct Placement {
    task_id: i32,
    interval: TimeSlot,
    importance: i32,
    pinned: bool,
}

impl Stage for Allocator {
    fn name(&self) -> &'static str {
        "allocator"
    }

    fn run(&self, ctx: &mut PipelineContext) -> Result<(), GraphError> {
        let Some(mut window) = ctx.window.take() else {
            ctx.trace("allocator skipped: no schedule window");
            return Ok(());
        };
        let mut tasks = std::mem::take(&mut ctx.tasks);
        for task in tasks.iter_mut().filter(|t| !t.completed) {
            task.clear_schedule();
        }

        let mut placed: Vec<Placement> = Vec::new();
        let breather = ctx.profile.breather_minutes;

        // Non-divisible tasks first, then divisible, both in the order
        // the prioritizer left them.
        let mut order: Vec<usize> = (0..tasks.len())
            .filter(|&i| !tasks[i].completed && !tasks[i].divisible)
            .collect();
        order.extend((0..tasks.len()).filter(|&i| !tasks[i].completed && tasks[i].divisible));

        for idx in order {
            let task = tasks[idx].clone();
            if !dependencies_placed(&task, &tasks) {
                ctx.mark_unscheduled(task.id, "blocked: a dependency is not yet placed");
                continue;
            }
            let earliest = earliest_start(&task, &tasks);

            if !task.divisible {
                if let Some(fragment) =
                    best_fit(&mut window, task.estimated_minutes, task.due, earliest, breather)
                {
                    record_single(&mut tasks[idx], &mut placed, fragment);
                    continue;
                }
                match bump_once(ctx, &mut window, &mut tasks, idx, &mut placed, breather) {
                    BumpOutcome::Placed => {}
                    BumpOutcome::NoCandidate => {
                        ctx.mark_unscheduled(
                            tasks[idx].id,
                            "no free slot fits and no lower-priority task can be bumped",
                        );
                    }
                }
            } else {
                match place_divisible(&mut window, task.estimated_minutes, task.due, earliest) {
                    Some(fragments) => tasks[idx].scheduled_parts = fragments,
                    None => {
                        ctx.mark_unscheduled(
                            tasks[idx].id,
                            "does not fit in the free slots before its due date",
                        );
                    }
                }
            }
        }

        if self.policy == BumpPolicy::MultiAppeal {
            appeal_pass(ctx, &mut window, &mut tasks, &mut placed, breather);
        }

        let scheduled = tasks.iter().filter(|t| t.is_scheduled()).count();
        ctx.trace(format!(
            "allocator placed {scheduled} tasks, {} unscheduled",
            ctx.unscheduled.len()
        ));
        ctx.tasks = tasks;
        ctx.window = Some(window);
        Ok(())
    }
}

/// Every dependency with a corresponding task object must already be
/// placed in this run (completed dependencies count as satisfied).
fn dependencies_placed(task: &Task, tasks: &[Task]) -> bool {
    task.dependencies.iter().all(|dep_id| {
        match tasks.iter().find(|t| t.id == *dep_id) {
            Some(dep) => dep.completed || dep.is_scheduled(),
            None => true,
        }
    })
}

/// No fragment may start before the latest fragment end of any dependency.
fn earliest_start(task: &Task, tasks: &[Task]) -> Option<NaiveDateTime> {
    task.dependencies
        .iter()
        .filter_map(|dep_id| tasks.iter().find(|t| t.id == *dep_id))
        .filter_map(Task::latest_scheduled_end)
        .max()
}

fn record_single(task: &mut Task, placed: &mut Vec<Placement>, fragment: ScheduledPart) {
    placed.push(Placement {
        task_id: task.id,
        interval: TimeSlot::new(fragment.start, fragment.end),
        importance: task.importance,
        pinned: task.pinned,
    });
    task.scheduled_parts = vec![fragment];
}

/// Best-fit placement: among slots that can hold the whole task before
/// its due date, pick the one wasting the least time. Consumes the slot,
/// reinserting any leading gap and trailing remainder (minus a breather).
fn best_fit(
    window: &mut ScheduleWindow,
    minutes: i64,
    due: Option<NaiveDateTime>,
    earliest: Option<NaiveDateTime>,
    breather: i64,
) -> Option<ScheduledPart> {
    let mut best: Option<(usize, i64)> = None;
    for (idx, slot) in window.slots().iter().enumerate() {
        if let Some(due) = due {
            if slot.end > due {
                continue;
            }
        }
        let usable_start = match earliest {
            Some(earliest) => slot.start.max(earliest),
            None => slot.start,
        };
        if usable_start + Duration::minutes(minutes) > slot.end {
            continue;
        }
        let waste = slot.duration_minutes() - minutes;
        if best.map_or(true, |(_, w)| waste < w) {
            best = Some((idx, waste));
        }
    }

    let (idx, _) = best?;
    let slot = window.remove(idx);
    let start = match earliest {
        Some(earliest) => slot.start.max(earliest),
        None => slot.start,
    };
    let end = start + Duration::minutes(minutes);
    if start > slot.start {
        window.insert_merged(TimeSlot::new(slot.start, start));
    }
    let tail_start = (end + Duration::minutes(breather)).min(slot.end);
    if tail_start < slot.end {
        window.insert_merged(TimeSlot::new(tail_start, slot.end));
    }
    Some(ScheduledPart::new(start, end))
}

/// Split a divisible task across the free slots usable before its due
/// date, in start order, consuming each fully or partially. A slot that
/// straddles the due date contributes only the portion ending by it; the
/// rest stays in the pool. Transactional: on shortfall every carved
/// fragment returns to the window.
fn place_divisible(
    window: &mut ScheduleWindow,
    minutes: i64,
    due: Option<NaiveDateTime>,
    earliest: Option<NaiveDateTime>,
) -> Option<Vec<ScheduledPart>> {
    let mut fragments: Vec<ScheduledPart> = Vec::new();
    let mut left = minutes;

    while left > 0 {
        let candidate = window
            .slots()
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                let usable_start = earliest.map_or(slot.start, |e| slot.start.max(e));
                let usable_end = due.map_or(slot.end, |d| slot.end.min(d));
                usable_start < usable_end
            })
            .map(|(idx, _)| idx)
            .next();
        let Some(idx) = candidate else { break };

        let slot = window.remove(idx);
        let start = earliest.map_or(slot.start, |e| slot.start.max(e));
        if start > slot.start {
            window.insert_merged(TimeSlot::new(slot.start, start));
        }
        let usable_end = due.map_or(slot.end, |d| slot.end.min(d));
        let take = left.min((usable_end - start).num_minutes());
        let end = start + Duration::minutes(take);
        if end < slot.end {
            window.insert_merged(TimeSlot::new(end, slot.end));
        }
        fragments.push(ScheduledPart::new(start, end));
        left -= take;
    }

    if left > 0 {
        for fragment in fragments {
            window.insert_merged(TimeSlot::new(fragment.start, fragment.end));
        }
        return None;
    }
    Some(fragments)
}

enum BumpOutcome {
    Placed,
    NoCandidate,
}

/// Single transactional bump: evict the lowest-importance placed task
/// whose interval can hold the newcomer, place the newcomer, then try to
/// re-place the evictee elsewhere. A failed re-placement leaves the
/// evictee unscheduled; that is a net state change, not a rollback.
fn bump_once(
    ctx: &mut PipelineContext,
    window: &mut ScheduleWindow,
    tasks: &mut [Task],
    task_idx: usize,
    placed: &mut Vec<Placement>,
    breather: i64,
) -> BumpOutcome {
    let task = tasks[task_idx].clone();
    let earliest = earliest_start(&task, tasks);

    let victim_idx = placed
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.pinned && p.importance < task.importance)
        .filter(|(_, p)| {
            let usable_start = earliest.map_or(p.interval.start, |e| p.interval.start.max(e));
            let fits = usable_start + Duration::minutes(task.estimated_minutes) <= p.interval.end;
            let respects_due = task
                .due
                .map_or(true, |d| usable_start + Duration::minutes(task.estimated_minutes) <= d);
            fits && respects_due
        })
        .min_by(|(_, a), (_, b)| {
            a.importance
                .cmp(&b.importance)
                .then_with(|| a.interval.start.cmp(&b.interval.start))
        })
        .map(|(idx, _)| idx);

    let Some(victim_idx) = victim_idx else {
        return BumpOutcome::NoCandidate;
    };
    let victim = placed.remove(victim_idx);
    ctx.trace(format!(
        "bump: task {} (importance {}) evicts task {} (importance {})",
        task.id, task.importance, victim.task_id, victim.importance
    ));

    // Carve the newcomer directly out of the freed interval; the victim
    // filter already verified it fits there before the due date. Only the
    // leftovers return to the pool.
    if let Some(evicted) = tasks.iter_mut().find(|t| t.id == victim.task_id) {
        evicted.clear_schedule();
    }
    let start = earliest.map_or(victim.interval.start, |e| victim.interval.start.max(e));
    let end = start + Duration::minutes(task.estimated_minutes);
    if start > victim.interval.start {
        window.insert_merged(TimeSlot::new(victim.interval.start, start));
    }
    let tail_start = (end + Duration::minutes(breather)).min(victim.interval.end);
    if tail_start < victim.interval.end {
        window.insert_merged(TimeSlot::new(tail_start, victim.interval.end));
    }
    record_single(&mut tasks[task_idx], placed, ScheduledPart::new(start, end));

    replace_evicted(ctx, window, tasks, placed, vec![victim], breather);
    BumpOutcome::Placed
}

/// Try to re-place evicted tasks elsewhere, ordered by due date then
/// descending importance. Failures become unscheduled.
fn replace_evicted(
    ctx: &mut PipelineContext,
    window: &mut ScheduleWindow,
    tasks: &mut [Task],
    placed: &mut Vec<Placement>,
    mut evicted: Vec<Placement>,
    breather: i64,
) {
    evicted.sort_by(|a, b| {
        let (da, db) = (
            task_due(tasks, a.task_id),
            task_due(tasks, b.task_id),
        );
        match (da, db) {
            (Some(da), Some(db)) => da.cmp(&db),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| b.importance.cmp(&a.importance))
    });

    for victim in evicted {
        let Some(idx) = tasks.iter().position(|t| t.id == victim.task_id) else {
            continue;
        };
        let task = tasks[idx].clone();
        let earliest = earliest_start(&task, tasks);
        match best_fit(window, task.estimated_minutes, task.due, earliest, breather) {
            Some(fragment) => {
                ctx.trace(format!("task {} rescheduled after bump", task.id));
                record_single(&mut tasks[idx], placed, fragment);
            }
            None => {
                ctx.mark_unscheduled(task.id, "bumped and no remaining slot fits");
            }
        }
    }
}

fn task_due(tasks: &[Task], task_id: i32) -> Option<NaiveDateTime> {
    tasks.iter().find(|t| t.id == task_id).and_then(|t| t.due)
}

/// Last-chance appeal: a still-unscheduled divisible task whose importance
/// clears the floor of the placed set may request a bundle of bumps
/// covering its shortfall. The candidate search is transactional; nothing
/// is evicted unless a sufficient combination exists.
fn appeal_pass(
    ctx: &mut PipelineContext,
    window: &mut ScheduleWindow,
    tasks: &mut Vec<Task>,
    placed: &mut Vec<Placement>,
    breather: i64,
) {
    let Some(min_placed_importance) = placed
        .iter()
        .filter(|p| !p.pinned)
        .map(|p| p.importance)
        .min()
    else {
        return;
    };

    let mut appellants: Vec<i32> = ctx
        .unscheduled
        .iter()
        .map(|u| u.task_id)
        .filter(|id| {
            tasks
                .iter()
                .find(|t| t.id == *id)
                .map_or(false, |t| t.divisible && t.importance >= min_placed_importance)
        })
        .collect();
    appellants.sort_by_key(|id| {
        std::cmp::Reverse(
            tasks
                .iter()
                .find(|t| t.id == *id)
                .map(|t| t.importance)
                .unwrap_or(0),
        )
    });
    appellants.dedup();

    for appellant_id in appellants {
        let Some(idx) = tasks.iter().position(|t| t.id == appellant_id) else {
            continue;
        };
        let task = tasks[idx].clone();
        let earliest = earliest_start(&task, tasks);

        let slack = window.minutes_within(task.due);
        let shortfall = task.estimated_minutes - slack;

        if shortfall <= 0 {
            if let Some(fragments) =
                place_divisible(window, task.estimated_minutes, task.due, earliest)
            {
                tasks[idx].scheduled_parts = fragments;
                clear_unscheduled(ctx, appellant_id);
                ctx.trace(format!("appeal: task {appellant_id} fits without bumps"));
            }
            continue;
        }

        // Greedy aggregation: cheapest victims first, largest intervals
        // breaking ties, until the freed time covers the shortfall.
        let mut candidates: Vec<usize> = placed
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.pinned && p.importance <= task.importance)
            .filter(|(_, p)| task.due.map_or(true, |d| p.interval.end <= d))
            .map(|(i, _)| i)
            .collect();
        candidates.sort_by(|&a, &b| {
            placed[a]
                .importance
                .cmp(&placed[b].importance)
                .then_with(|| {
                    placed[b]
                        .interval
                        .duration_minutes()
                        .cmp(&placed[a].interval.duration_minutes())
                })
        });

        let mut bundle: Vec<usize> = Vec::new();
        let mut freed = 0i64;
        for cand in candidates {
            bundle.push(cand);
            freed += placed[cand].interval.duration_minutes();
            if freed >= shortfall {
                break;
            }
        }
        if freed < shortfall {
            ctx.trace(format!(
                "appeal denied: task {appellant_id} short {shortfall} minutes, only {freed} reclaimable"
            ));
            continue;
        }

        // Commit the bundle as a group.
        bundle.sort_unstable_by(|a, b| b.cmp(a));
        let mut evicted: Vec<Placement> = Vec::new();
        for i in bundle {
            evicted.push(placed.remove(i));
        }
        for victim in &evicted {
            if let Some(t) = tasks.iter_mut().find(|t| t.id == victim.task_id) {
                t.clear_schedule();
            }
            window.insert_merged(victim.interval);
            ctx.trace(format!(
                "appeal: task {appellant_id} evicts task {}",
                victim.task_id
            ));
        }

        match place_divisible(window, task.estimated_minutes, task.due, earliest) {
            Some(fragments) => {
                tasks[idx].scheduled_parts = fragments;
                clear_unscheduled(ctx, appellant_id);
            }
            None => {
                ctx.trace(format!(
                    "appeal: task {appellant_id} still does not fit after evictions"
                ));
            }
        }

        replace_evicted(ctx, window, tasks, placed, evicted, breather);
    }
}

fn clear_unscheduled(ctx: &mut PipelineContext, task_id: i32) {
    ctx.unscheduled.retain(|u| u.task_id != task_id);
}
