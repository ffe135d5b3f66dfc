use chrono::{NaiveDate, NaiveDateTime, Timelike};
use planner_tool::pipeline::{BalanceMode, BumpPolicy, Placement, RunOptions};
use planner_tool::task::Task;
use planner_tool::{Event, RunOutcome, WorkProfile, run_pipeline};

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn run(tasks: Vec<Task>, events: Vec<Event>, placement: Placement) -> RunOutcome {
    run_pipeline(
        tasks,
        WorkProfile::default(),
        events,
        at(6, 8, 0),
        RunOptions { placement },
    )
    .unwrap()
}

fn assert_no_overlaps(outcome: &RunOutcome) {
    let mut parts: Vec<_> = outcome
        .tasks
        .iter()
        .flat_map(|t| t.scheduled_parts.iter().copied())
        .collect();
    parts.sort_by_key(|p| p.start);
    for pair in parts.windows(2) {
        assert!(pair[0].end <= pair[1].start, "overlap: {pair:?}");
    }
}

fn assert_duration_conserved(outcome: &RunOutcome) {
    for task in &outcome.tasks {
        if task.completed {
            continue;
        }
        let reported = outcome.unscheduled.iter().any(|u| u.task_id == task.id);
        if reported {
            assert!(!task.is_scheduled(), "task {} partially placed", task.id);
        } else {
            assert_eq!(
                task.scheduled_minutes(),
                task.estimated_minutes,
                "task {} lost time",
                task.id
            );
        }
    }
}

fn sample_tasks() -> Vec<Task> {
    let mut report = Task::new(1, "quarterly report", 240);
    report.due = Some(at(8, 17, 0));
    report.importance = 7;
    let mut review = Task::new(2, "design review prep", 120);
    review.complexity = 2.0;
    let mut chores = Task::new(3, "inbox triage", 90);
    chores.divisible = true;
    let mut followup = Task::new(4, "send follow-ups", 30);
    followup.dependencies = vec![1];
    vec![report, review, chores, followup]
}

#[test]
fn priority_run_schedules_everything_in_work_hours() {
    let outcome = run(
        sample_tasks(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    assert!(outcome.unscheduled.is_empty(), "{:?}", outcome.unscheduled);
    assert_no_overlaps(&outcome);
    assert_duration_conserved(&outcome);

    for task in &outcome.tasks {
        for part in &task.scheduled_parts {
            assert!(part.start.hour() >= 9);
            assert!(part.end.hour() <= 17);
        }
    }
}

#[test]
fn balanced_run_schedules_everything_in_work_hours() {
    let outcome = run(
        sample_tasks(),
        Vec::new(),
        Placement::Balanced(BalanceMode::Density),
    );
    assert!(outcome.unscheduled.is_empty(), "{:?}", outcome.unscheduled);
    assert_no_overlaps(&outcome);
    assert_duration_conserved(&outcome);
}

#[test]
fn deadlines_are_respected_or_reported() {
    let outcome = run(
        sample_tasks(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    for task in &outcome.tasks {
        let Some(due) = task.due else { continue };
        for part in &task.scheduled_parts {
            assert!(part.end <= due, "task {} scheduled past its due", task.id);
        }
    }
}

#[test]
fn dependents_follow_their_prerequisites() {
    let outcome = run(
        sample_tasks(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    let report_end = outcome
        .tasks
        .iter()
        .find(|t| t.id == 1)
        .and_then(Task::latest_scheduled_end)
        .unwrap();
    let followup_start = outcome
        .tasks
        .iter()
        .find(|t| t.id == 4)
        .map(|t| t.scheduled_parts[0].start)
        .unwrap();
    assert!(followup_start >= report_end);
}

#[test]
fn balanced_run_keeps_dependents_after_prerequisites() {
    let prereq = Task::new(1, "prereq", 480);
    let mut dependent = Task::new(2, "dependent", 480);
    dependent.complexity = 3.0;
    dependent.dependencies = vec![1];

    let outcome = run(
        vec![prereq, dependent],
        Vec::new(),
        Placement::Balanced(BalanceMode::Density),
    );
    let prereq_end = outcome
        .tasks
        .iter()
        .find(|t| t.id == 1)
        .and_then(Task::latest_scheduled_end)
        .unwrap();
    let dependent_start = outcome
        .tasks
        .iter()
        .find(|t| t.id == 2)
        .map(|t| t.scheduled_parts[0].start)
        .unwrap();
    assert!(dependent_start >= prereq_end);
}

#[test]
fn events_are_never_scheduled_over() {
    let events = vec![
        Event::new(1, "all-hands", at(6, 10, 0), at(6, 12, 0)),
        Event::new(2, "1:1", at(7, 14, 0), at(7, 15, 0)),
    ];
    let outcome = run(
        sample_tasks(),
        events.clone(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    for task in &outcome.tasks {
        for part in &task.scheduled_parts {
            for event in &events {
                assert!(
                    part.end <= event.start || part.start >= event.end,
                    "task {} collides with event {}",
                    task.id,
                    event.id
                );
            }
        }
    }
}

#[test]
fn rerun_from_scratch_is_deterministic() {
    let first = run(
        sample_tasks(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    let second = run(
        sample_tasks(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    assert_eq!(first.tasks, second.tasks);
}

#[test]
fn rescheduling_previous_output_is_stable() {
    let first = run(
        sample_tasks(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    // Feeding the scheduled tasks back in clears and rebuilds fragments.
    let second = run(
        first.tasks.clone(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    assert_eq!(first.tasks, second.tasks);
}

#[test]
fn overload_is_reported_as_data_not_error() {
    // Far more work than the window holds once the due date clips it.
    let mut huge = Task::new(1, "impossible", 960);
    huge.due = Some(at(6, 17, 0));
    let outcome = run(
        vec![huge],
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    assert_eq!(outcome.unscheduled.len(), 1);
    assert!(!outcome.trace.is_empty());
}

#[test]
fn completed_tasks_pass_through_untouched() {
    let mut done = Task::new(1, "done", 120);
    done.completed = true;
    done.scheduled_parts.clear();
    let outcome = run(
        vec![done, Task::new(2, "pending", 60)],
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    let done_task = outcome.tasks.iter().find(|t| t.id == 1).unwrap();
    assert!(!done_task.is_scheduled());
    assert!(outcome.unscheduled.is_empty());
}

#[test]
fn urgency_fields_are_written_back() {
    let outcome = run(
        sample_tasks(),
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    let report = outcome.tasks.iter().find(|t| t.id == 1).unwrap();
    assert!(report.latest_possible_start.is_some());
    assert!(report.urgency_score > 0.0);
}

#[test]
fn prerequisites_inherit_importance_from_dependents() {
    let errand = Task::new(1, "order cables", 30);
    let mut launch = Task::new(2, "launch", 240);
    launch.importance = 9;
    launch.effective_importance = 9;
    launch.due = Some(at(8, 17, 0));
    launch.dependencies = vec![1];

    let outcome = run(
        vec![errand, launch],
        Vec::new(),
        Placement::Priority(BumpPolicy::MultiAppeal),
    );
    let errand = outcome.tasks.iter().find(|t| t.id == 1).unwrap();
    assert_eq!(errand.effective_importance, 9);
}
