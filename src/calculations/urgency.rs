use crate::graph::{DependencyGraph, GraphError};
use crate::task::Task;
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;

/// Decay base of the urgency curve. Urgency rises sharply as slack
/// approaches zero and as remaining duration grows relative to slack.
const DECAY_BASE: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UrgencyResult {
    pub latest_possible_start: Option<NaiveDateTime>,
    pub effective_importance: i32,
    pub urgency_score: f64,
}

/// Backward induction over the dependency DAG.
///
/// For every task this derives a latest possible start date (LPSD) and an
/// exponential urgency score. Dependents are resolved before their
/// predecessors by walking the graph in reverse topological order into an
/// explicit memo table, so a low-importance prerequisite of a high-importance
/// task inherits that task's pressure.
pub struct UrgencyEngine<'a> {
    tasks: &'a [Task],
}

impl<'a> UrgencyEngine<'a> {
    pub fn new(tasks: &'a [Task]) -> Self {
        Self { tasks }
    }

    pub fn execute(&self, now: NaiveDateTime) -> Result<HashMap<i32, UrgencyResult>, GraphError> {
        let graph = DependencyGraph::build(self.tasks);
        let by_id: HashMap<i32, &Task> = self.tasks.iter().map(|t| (t.id, t)).collect();

        // Dependents before predecessors; a cycle here means the edit-time
        // guard was bypassed and the input is not schedulable.
        let mut order = graph.topological_ids()?;
        order.reverse();

        let mut resolved: HashMap<i32, UrgencyResult> = HashMap::with_capacity(order.len());

        for task_id in order {
            let task = by_id[&task_id];
            let remaining_days = if task.completed {
                0.0
            } else {
                task.remaining_work_days()
            };

            // The binding deadline is the tightest of the task's own due
            // date and every dependent's already-resolved LPSD.
            let mut binding: Option<NaiveDateTime> = task.due;
            let mut effective_importance = task.importance;
            for dependent_id in graph.dependents_of(task_id) {
                let dependent = &resolved[&dependent_id];
                if let Some(lpsd) = dependent.latest_possible_start {
                    binding = Some(match binding {
                        Some(current) => current.min(lpsd),
                        None => lpsd,
                    });
                }
                effective_importance = effective_importance.max(dependent.effective_importance);
            }

            let latest_possible_start =
                binding.map(|deadline| deadline - days_to_duration(remaining_days));

            let urgency_score = if task.completed {
                0.0
            } else {
                match latest_possible_start {
                    Some(lpsd) => {
                        let slack_days =
                            ((lpsd - now).num_minutes() as f64 / 1440.0).max(0.0);
                        let exponent = slack_days - task.duration_days() / 2.0;
                        effective_importance as f64 * DECAY_BASE.powf(exponent)
                    }
                    // No deadline pressure anywhere downstream.
                    None => 0.0,
                }
            };

            resolved.insert(
                task_id,
                UrgencyResult {
                    latest_possible_start,
                    effective_importance,
                    urgency_score,
                },
            );
        }

        Ok(resolved)
    }
}

/// Write resolved urgency data back onto the task list.
pub fn apply_urgency(tasks: &mut [Task], results: &HashMap<i32, UrgencyResult>) {
    for task in tasks.iter_mut() {
        if let Some(result) = results.get(&task.id) {
            task.latest_possible_start = result.latest_possible_start;
            task.effective_importance = result.effective_importance;
            task.urgency_score = result.urgency_score;
        }
    }
}

fn days_to_duration(days: f64) -> Duration {
    Duration::minutes((days * 1440.0).round() as i64)
}
