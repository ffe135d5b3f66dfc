use chrono::{NaiveDate, NaiveDateTime};
use planner_tool::calendar::{ScheduleWindow, TimeSlot};
use planner_tool::pipeline::{BalanceMode, LoadBalancer, PipelineContext, Stage};
use planner_tool::task::Task;
use planner_tool::{Event, WorkProfile};
use std::collections::HashMap;

fn at(day: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

/// Monday through Wednesday, one 480-minute slot per day.
fn three_day_window() -> ScheduleWindow {
    ScheduleWindow::from_slots(vec![
        TimeSlot::new(at(6, 9), at(6, 17)),
        TimeSlot::new(at(7, 9), at(7, 17)),
        TimeSlot::new(at(8, 9), at(8, 17)),
    ])
}

fn ctx_with(tasks: Vec<Task>, window: ScheduleWindow) -> PipelineContext {
    let mut ctx = PipelineContext::new(
        tasks,
        WorkProfile::default(),
        Vec::<Event>::new(),
        at(6, 8),
    );
    ctx.window = Some(window);
    ctx
}

fn assigned_minutes(ctx: &PipelineContext, task_id: i32) -> i64 {
    ctx.buckets
        .as_ref()
        .unwrap()
        .iter()
        .flat_map(|b| b.assignments.iter())
        .filter(|a| a.task_id == task_id)
        .map(|a| a.minutes)
        .sum()
}

#[test]
fn density_spreads_equal_tasks_across_days() {
    let tasks = vec![
        Task::new(1, "a", 200),
        Task::new(2, "b", 200),
        Task::new(3, "c", 200),
    ];
    let mut ctx = ctx_with(tasks, three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    let buckets = ctx.buckets.as_ref().unwrap();
    assert_eq!(buckets.len(), 3);
    for bucket in buckets {
        assert_eq!(bucket.assignments.len(), 1);
    }
    assert!(ctx.unscheduled.is_empty());
}

#[test]
fn due_dates_restrict_candidate_days() {
    let mut urgent = Task::new(1, "urgent", 400);
    urgent.due = Some(at(6, 17));
    let tasks = vec![urgent, Task::new(2, "later", 400)];
    let mut ctx = ctx_with(tasks, three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    let buckets = ctx.buckets.as_ref().unwrap();
    let monday = &buckets[0];
    assert!(monday.assignments.iter().any(|a| a.task_id == 1));
    assert!(ctx.unscheduled.is_empty());
}

#[test]
fn oversized_task_is_reported_not_forced() {
    let tasks = vec![Task::new(1, "monolith", 600)];
    let mut ctx = ctx_with(tasks, three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    assert_eq!(ctx.unscheduled.len(), 1);
    assert_eq!(ctx.unscheduled[0].task_id, 1);
    assert!(ctx.unscheduled[0].reason.contains("capacity"));
}

#[test]
fn divisible_task_splits_across_days() {
    let mut big = Task::new(1, "course", 600);
    big.divisible = true;
    let mut ctx = ctx_with(vec![big], three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    assert!(ctx.unscheduled.is_empty());
    assert_eq!(assigned_minutes(&ctx, 1), 600);
    let days_used = ctx
        .buckets
        .as_ref()
        .unwrap()
        .iter()
        .filter(|b| !b.assignments.is_empty())
        .count();
    assert!(days_used >= 2);
}

#[test]
fn divisible_shortfall_rolls_back_entirely() {
    let mut big = Task::new(1, "too big", 2000);
    big.divisible = true;
    let mut ctx = ctx_with(vec![big], three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    assert_eq!(ctx.unscheduled.len(), 1);
    assert_eq!(assigned_minutes(&ctx, 1), 0);
    for bucket in ctx.buckets.as_ref().unwrap() {
        assert_eq!(bucket.load, 0.0);
    }
}

#[test]
fn pinned_tasks_claim_a_day_first() {
    let mut pinned = Task::new(1, "pinned", 480);
    pinned.pinned = true;
    let tasks = vec![Task::new(2, "filler", 480), pinned];
    let mut ctx = ctx_with(tasks, three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    assert!(ctx.unscheduled.is_empty());
    assert_eq!(assigned_minutes(&ctx, 1), 480);
}

#[test]
fn density_places_dependents_no_earlier_than_their_prerequisites() {
    // The dependent's heavier load would otherwise claim the first day.
    let prereq = Task::new(1, "prereq", 480);
    let mut dependent = Task::new(2, "dependent", 480);
    dependent.complexity = 3.0;
    dependent.dependencies = vec![1];

    let mut ctx = ctx_with(vec![prereq, dependent], three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    let buckets = ctx.buckets.as_ref().unwrap();
    let day_of = |id: i32| {
        buckets
            .iter()
            .position(|b| b.assignments.iter().any(|a| a.task_id == id))
            .unwrap()
    };
    assert!(ctx.unscheduled.is_empty());
    assert!(day_of(2) >= day_of(1));
}

#[test]
fn density_blocks_dependents_of_unbalanced_tasks() {
    let oversized = Task::new(1, "monolith", 600);
    let mut dependent = Task::new(2, "dependent", 60);
    dependent.dependencies = vec![1];

    let mut ctx = ctx_with(vec![oversized, dependent], three_day_window());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();

    assert!(ctx.unscheduled.iter().any(|u| u.task_id == 1));
    let entry = ctx.unscheduled.iter().find(|u| u.task_id == 2).unwrap();
    assert!(entry.reason.contains("dependency"));
}

#[test]
fn gold_panning_displaces_lightest_weights_forward() {
    let tasks = vec![
        Task::new(1, "keep", 480),
        Task::new(2, "wash out", 480),
        Task::new(3, "also keep", 480),
    ];
    let weights = HashMap::from([(1, 10.0), (2, 1.0), (3, 5.0)]);
    let mut ctx = ctx_with(tasks, three_day_window());
    LoadBalancer::new(BalanceMode::GoldPanning)
        .with_weights(weights)
        .run(&mut ctx)
        .unwrap();

    let buckets = ctx.buckets.as_ref().unwrap();
    // Heaviest nugget settles on day one; the lightest is shaken furthest.
    assert!(buckets[0].assignments.iter().any(|a| a.task_id == 1));
    assert!(buckets[2].assignments.iter().any(|a| a.task_id == 2));
    assert!(ctx.unscheduled.is_empty());
}

#[test]
fn gold_panning_overflow_falls_off_the_horizon() {
    let tasks = vec![
        Task::new(1, "keep", 480),
        Task::new(2, "overflow", 480),
    ];
    let weights = HashMap::from([(1, 10.0), (2, 1.0)]);
    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9), at(6, 17))]);
    let mut ctx = ctx_with(tasks, window);
    LoadBalancer::new(BalanceMode::GoldPanning)
        .with_weights(weights)
        .run(&mut ctx)
        .unwrap();

    assert_eq!(ctx.unscheduled.len(), 1);
    assert_eq!(ctx.unscheduled[0].task_id, 2);
}

#[test]
fn gold_panning_drags_dependents_forward_with_their_prerequisite() {
    let prereq = Task::new(1, "prereq", 240);
    let mut dependent = Task::new(2, "dependent", 240);
    dependent.dependencies = vec![1];
    let blocker = Task::new(3, "blocker", 480);
    // The dependent outweighs the blocker, but it still follows its
    // prerequisite into the next day.
    let weights = HashMap::from([(1, 1.0), (2, 200.0), (3, 100.0)]);

    let mut ctx = ctx_with(vec![prereq, dependent, blocker], three_day_window());
    LoadBalancer::new(BalanceMode::GoldPanning)
        .with_weights(weights)
        .run(&mut ctx)
        .unwrap();

    let buckets = ctx.buckets.as_ref().unwrap();
    assert!(buckets[0].assignments.iter().any(|a| a.task_id == 3));
    assert!(buckets[1].assignments.iter().any(|a| a.task_id == 1));
    assert!(buckets[1].assignments.iter().any(|a| a.task_id == 2));
    assert!(ctx.unscheduled.is_empty());
}

#[test]
fn gold_panning_washes_dependents_out_with_their_prerequisite() {
    let prereq = Task::new(1, "prereq", 480);
    let mut dependent = Task::new(2, "dependent", 480);
    dependent.dependencies = vec![1];
    let keeper = Task::new(3, "keeper", 480);
    let weights = HashMap::from([(1, 1.0), (2, 50.0), (3, 100.0)]);
    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9), at(6, 17))]);

    let mut ctx = ctx_with(vec![prereq, dependent, keeper], window);
    LoadBalancer::new(BalanceMode::GoldPanning)
        .with_weights(weights)
        .run(&mut ctx)
        .unwrap();

    assert!(ctx.unscheduled.iter().any(|u| u.task_id == 1));
    let entry = ctx.unscheduled.iter().find(|u| u.task_id == 2).unwrap();
    assert!(entry.reason.contains("dependency"));
    let buckets = ctx.buckets.as_ref().unwrap();
    assert!(buckets[0].assignments.iter().any(|a| a.task_id == 3));
}

#[test]
fn empty_window_reports_every_task() {
    let tasks = vec![Task::new(1, "a", 60), Task::new(2, "b", 60)];
    let mut ctx = ctx_with(tasks, ScheduleWindow::new());
    LoadBalancer::new(BalanceMode::Density).run(&mut ctx).unwrap();
    assert_eq!(ctx.unscheduled.len(), 2);
}
