use super::{BalanceMode, PipelineContext, Stage};
use crate::calendar::ScheduleWindow;
use crate::graph::GraphError;
use crate::task::Task;
use chrono::NaiveDate;
use std::collections::HashMap;

/// A task's (possibly partial) claim on one day's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAssignment {
    pub task_id: i32,
    pub minutes: i64,
}

/// One calendar day's capacity and the work assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct DayBucket {
    pub date: NaiveDate,
    pub initial_capacity_minutes: i64,
    pub load: f64,
    pub assignments: Vec<DayAssignment>,
}

impl DayBucket {
    fn new(date: NaiveDate, capacity: i64) -> Self {
        Self {
            date,
            initial_capacity_minutes: capacity,
            load: 0.0,
            assignments: Vec::new(),
        }
    }

    pub fn assigned_minutes(&self) -> i64 {
        self.assignments.iter().map(|a| a.minutes).sum()
    }

    pub fn remaining_minutes(&self) -> i64 {
        self.initial_capacity_minutes - self.assigned_minutes()
    }

    /// Load relative to the day's starting capacity; the density strategy
    /// drives this toward uniformity across days.
    pub fn density_ratio(&self) -> f64 {
        if self.initial_capacity_minutes == 0 {
            f64::INFINITY
        } else {
            self.load / self.initial_capacity_minutes as f64
        }
    }
}

/// Build one bucket per calendar day covered by the window.
pub fn buckets_from_window(window: &ScheduleWindow) -> Vec<DayBucket> {
    let mut buckets: Vec<DayBucket> = Vec::new();
    for slot in window.slots() {
        let date = slot.start.date();
        match buckets.last_mut() {
            Some(last) if last.date == date => {
                last.initial_capacity_minutes += slot.duration_minutes();
            }
            _ => buckets.push(DayBucket::new(date, slot.duration_minutes())),
        }
    }
    buckets
}

/// Assigns tasks (or fragments of divisible tasks) to calendar days so
/// that per-day load approximates uniform density without violating
/// deadlines or dependency order. Exact times are not assigned here;
/// that is the sequencer's job.
pub struct LoadBalancer {
    mode: BalanceMode,
    /// Displacement weights for gold panning, supplied externally.
    /// Tasks absent from the map weigh 0.
    weights: HashMap<i32, f64>,
}

impl LoadBalancer {
    pub fn new(mode: BalanceMode) -> Self {
        Self {
            mode,
            weights: HashMap::new(),
        }
    }

    pub fn with_weights(mut self, weights: HashMap<i32, f64>) -> Self {
        self.weights = weights;
        self
    }
}

impl Stage for LoadBalancer {
    fn name(&self) -> &'static str {
        "load_balancer"
    }

    fn run(&self, ctx: &mut PipelineContext) -> Result<(), GraphError> {
        let Some(window) = ctx.window.as_ref() else {
            ctx.trace("load balancer skipped: no schedule window");
            return Ok(());
        };
        let mut buckets = buckets_from_window(window);
        if buckets.is_empty() {
            let ids: Vec<i32> = eligible(&ctx.tasks).iter().map(|t| t.id).collect();
            for id in ids {
                ctx.mark_unscheduled(id, "no available days in the window");
            }
            ctx.buckets = Some(buckets);
            return Ok(());
        }

        match self.mode {
            BalanceMode::Density => balance_by_density(ctx, &mut buckets),
            BalanceMode::GoldPanning => pan_for_gold(ctx, &mut buckets, &self.weights),
        }

        ctx.trace(format!(
            "balanced load across {} days ({} unscheduled)",
            buckets.len(),
            ctx.unscheduled.len()
        ));
        ctx.buckets = Some(buckets);
        Ok(())
    }
}

fn eligible(tasks: &[Task]) -> Vec<&Task> {
    tasks
        .iter()
        .filter(|t| !t.completed && !t.is_scheduled())
        .collect()
}

/// Candidate day indices for a task: every day from `first_day` (the last
/// day any of its dependencies landed on) up to its due date, or the rest
/// of the window when it has none.
fn candidate_days(buckets: &[DayBucket], task: &Task, first_day: usize) -> Vec<usize> {
    let limit = task.due.map(|d| d.date());
    buckets
        .iter()
        .enumerate()
        .filter(|(idx, b)| *idx >= first_day && limit.map_or(true, |l| b.date <= l))
        .map(|(idx, _)| idx)
        .collect()
}

/// Lowest density ratio wins; earlier day breaks ties.
fn lightest_day(buckets: &[DayBucket], candidates: &[usize], min_remaining: i64) -> Option<usize> {
    candidates
        .iter()
        .copied()
        .filter(|&idx| buckets[idx].remaining_minutes() >= min_remaining)
        .min_by(|&a, &b| {
            buckets[a]
                .density_ratio()
                .partial_cmp(&buckets[b].density_ratio())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| buckets[a].date.cmp(&buckets[b].date))
        })
}

fn balance_by_density(ctx: &mut PipelineContext, buckets: &mut [DayBucket]) {
    // Pinned first, then heaviest load, then earliest due date.
    let mut pending: Vec<usize> = (0..ctx.tasks.len())
        .filter(|&i| !ctx.tasks[i].completed && !ctx.tasks[i].is_scheduled())
        .collect();
    pending.sort_by(|&a, &b| {
        let (ta, tb) = (&ctx.tasks[a], &ctx.tasks[b]);
        tb.pinned
            .cmp(&ta.pinned)
            .then_with(|| {
                tb.load()
                    .partial_cmp(&ta.load())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| match (ta.due, tb.due) {
                (Some(da), Some(db)) => da.cmp(&db),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
    });

    // The last day index each balanced task landed on; `None` records a
    // task that could not be placed, which blocks its dependents.
    let mut last_day: HashMap<i32, Option<usize>> = HashMap::new();

    while !pending.is_empty() {
        // A task waits until every dependency still pending here has been
        // resolved; the edit-time cycle check guarantees one is ready.
        let pos = pending
            .iter()
            .position(|&i| {
                ctx.tasks[i]
                    .dependencies
                    .iter()
                    .all(|dep| !pending.iter().any(|&j| ctx.tasks[j].id == *dep))
            })
            .unwrap_or(0);
        let task_idx = pending.remove(pos);
        let task = ctx.tasks[task_idx].clone();

        let mut blocked = false;
        let mut first_day = 0usize;
        for dep in &task.dependencies {
            match last_day.get(dep) {
                Some(Some(day)) => first_day = first_day.max(*day),
                Some(None) => blocked = true,
                None => {}
            }
        }
        if blocked {
            ctx.mark_unscheduled(task.id, "blocked: a dependency could not be balanced");
            last_day.insert(task.id, None);
            continue;
        }

        let required = task.estimated_minutes;
        let candidates = candidate_days(buckets, &task, first_day);

        if let Some(day) = lightest_day(buckets, &candidates, required) {
            buckets[day].load += task.load();
            buckets[day].assignments.push(DayAssignment {
                task_id: task.id,
                minutes: required,
            });
            last_day.insert(task.id, Some(day));
            continue;
        }

        if task.divisible {
            let landed = split_across_days(ctx, buckets, &task, &candidates);
            last_day.insert(task.id, landed);
        } else if task.pinned {
            // Pinned tasks are never forced over capacity; they are
            // reported instead.
            ctx.mark_unscheduled(task.id, "pinned task does not fit on any single day");
            last_day.insert(task.id, None);
        } else {
            ctx.mark_unscheduled(task.id, "no day has enough capacity before its due date");
            last_day.insert(task.id, None);
        }
    }
}

/// Spread a divisible task over the lightest days with remaining capacity.
/// Rolls back entirely on shortfall so a partially placed task never
/// survives the stage. Returns the last day index used on success.
fn split_across_days(
    ctx: &mut PipelineContext,
    buckets: &mut [DayBucket],
    task: &Task,
    candidates: &[usize],
) -> Option<usize> {
    let mut left = task.estimated_minutes;
    let mut placed: Vec<usize> = Vec::new();

    while left > 0 {
        let Some(day) = lightest_day(buckets, candidates, 1) else {
            break;
        };
        let take = left.min(buckets[day].remaining_minutes());
        let share = task.load() * take as f64 / task.estimated_minutes as f64;
        buckets[day].load += share;
        buckets[day].assignments.push(DayAssignment {
            task_id: task.id,
            minutes: take,
        });
        placed.push(day);
        left -= take;
    }

    if left > 0 {
        for day in placed.into_iter().rev() {
            let assignment = buckets[day]
                .assignments
                .pop()
                .expect("rollback of recorded assignment");
            let share = task.load() * assignment.minutes as f64 / task.estimated_minutes as f64;
            buckets[day].load -= share;
        }
        if task.pinned {
            ctx.mark_unscheduled(task.id, "pinned task does not fit in the window");
        } else {
            ctx.mark_unscheduled(
                task.id,
                format!("capacity shortfall of {left} minutes before its due date"),
            );
        }
        return None;
    }
    placed.into_iter().max()
}

/// Gold-panning displacement: dump everything into the first day, then
/// sweep forward shaking the lightest-weight tasks into the next day
/// while a day is over capacity. A displaced prerequisite drags its
/// dependents along so a dependent never sits on an earlier day than
/// anything it waits on. Whatever washes off the last day is unscheduled,
/// dragged dependents included.
fn pan_for_gold(
    ctx: &mut PipelineContext,
    buckets: &mut [DayBucket],
    weights: &HashMap<i32, f64>,
) {
    let infos: Vec<(i32, i64, f64)> = eligible(&ctx.tasks)
        .iter()
        .map(|t| (t.id, t.estimated_minutes, t.load()))
        .collect();
    let in_play: Vec<i32> = infos.iter().map(|(id, _, _)| *id).collect();
    let mut dependents_of: HashMap<i32, Vec<i32>> = HashMap::new();
    for task in eligible(&ctx.tasks) {
        for dep in &task.dependencies {
            if in_play.contains(dep) {
                dependents_of.entry(*dep).or_default().push(task.id);
            }
        }
    }

    // `None` marks a task washed off the horizon.
    let mut day_of: HashMap<i32, Option<usize>> =
        infos.iter().map(|(id, _, _)| (*id, Some(0))).collect();

    for day in 0..buckets.len() {
        loop {
            let assigned: i64 = infos
                .iter()
                .filter(|(id, _, _)| day_of[id] == Some(day))
                .map(|(_, minutes, _)| *minutes)
                .sum();
            if assigned <= buckets[day].initial_capacity_minutes {
                break;
            }
            let lightest = infos
                .iter()
                .filter(|(id, _, _)| day_of[id] == Some(day))
                .min_by(|(a, _, _), (b, _, _)| {
                    let wa = weights.get(a).copied().unwrap_or(0.0);
                    let wb = weights.get(b).copied().unwrap_or(0.0);
                    wa.partial_cmp(&wb).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(id, _, _)| *id);
            let Some(id) = lightest else { break };
            displace(id, day, buckets.len(), &mut day_of, &dependents_of);
        }
    }

    for (id, minutes, load) in &infos {
        if let Some(Some(day)) = day_of.get(id) {
            buckets[*day].assignments.push(DayAssignment {
                task_id: *id,
                minutes: *minutes,
            });
            buckets[*day].load += load;
        }
    }

    let mut washed: Vec<(i32, &'static str)> = Vec::new();
    for (id, _, _) in &infos {
        if day_of[id].is_none() {
            let dep_washed = ctx.task_by_id(*id).map_or(false, |t| {
                t.dependencies
                    .iter()
                    .any(|dep| day_of.get(dep).map_or(false, |d| d.is_none()))
            });
            washed.push((
                *id,
                if dep_washed {
                    "blocked: a dependency was displaced off the horizon"
                } else {
                    "displaced off the end of the planning horizon"
                },
            ));
        }
    }
    for (id, reason) in washed {
        ctx.mark_unscheduled(id, reason);
    }
}

/// Move a task from `from_day` to the next day, pulling any dependent
/// still on `from_day` or earlier forward with it. Past the last day the
/// task washes out, and so must everything that depends on it.
fn displace(
    id: i32,
    from_day: usize,
    day_count: usize,
    day_of: &mut HashMap<i32, Option<usize>>,
    dependents_of: &HashMap<i32, Vec<i32>>,
) {
    let next = from_day + 1;
    if next >= day_count {
        wash_out(id, day_of, dependents_of);
        return;
    }
    day_of.insert(id, Some(next));
    if let Some(deps) = dependents_of.get(&id) {
        for dep_id in deps.clone() {
            let current = day_of.get(&dep_id).copied().flatten();
            if current.map_or(false, |day| day <= from_day) {
                displace(dep_id, from_day, day_count, day_of, dependents_of);
            }
        }
    }
}

fn wash_out(
    id: i32,
    day_of: &mut HashMap<i32, Option<usize>>,
    dependents_of: &HashMap<i32, Vec<i32>>,
) {
    day_of.insert(id, None);
    if let Some(deps) = dependents_of.get(&id) {
        for dep_id in deps.clone() {
            if day_of.get(&dep_id).map_or(false, |d| d.is_some()) {
                wash_out(dep_id, day_of, dependents_of);
            }
        }
    }
}
