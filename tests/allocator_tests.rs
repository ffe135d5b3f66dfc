use chrono::{NaiveDate, NaiveDateTime};
use planner_tool::calendar::{ScheduleWindow, TimeSlot};
use planner_tool::pipeline::{Allocator, BumpPolicy, PipelineContext, Stage};
use planner_tool::task::Task;
use planner_tool::{Event, WorkProfile};

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn run_allocator(
    tasks: Vec<Task>,
    window: ScheduleWindow,
    policy: BumpPolicy,
) -> PipelineContext {
    let mut ctx = PipelineContext::new(
        tasks,
        WorkProfile::default(),
        Vec::<Event>::new(),
        at(6, 8, 0),
    );
    ctx.window = Some(window);
    Allocator::new(policy).run(&mut ctx).unwrap();
    ctx
}

fn task_of(ctx: &PipelineContext, id: i32) -> &Task {
    ctx.task_by_id(id).unwrap()
}

#[test]
fn best_fit_prefers_the_tightest_slot() {
    // A one-hour task with a 90-minute and a 4-hour gap available: the
    // 90-minute gap wastes less.
    let window = ScheduleWindow::from_slots(vec![
        TimeSlot::new(at(6, 9, 0), at(6, 13, 0)),
        TimeSlot::new(at(6, 14, 0), at(6, 15, 30)),
    ]);
    let ctx = run_allocator(
        vec![Task::new(1, "call", 60)],
        window,
        BumpPolicy::Single,
    );

    let parts = &task_of(&ctx, 1).scheduled_parts;
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].start, at(6, 14, 0));
    assert_eq!(parts[0].end, at(6, 15, 0));
}

#[test]
fn due_dates_exclude_late_slots() {
    let window = ScheduleWindow::from_slots(vec![
        TimeSlot::new(at(6, 9, 0), at(6, 17, 0)),
        TimeSlot::new(at(7, 9, 0), at(7, 10, 0)),
    ]);
    let mut task = Task::new(1, "due monday", 60);
    task.due = Some(at(6, 17, 0));
    let ctx = run_allocator(vec![task], window, BumpPolicy::Single);

    // The tighter Tuesday slot ends after the due date and is ineligible.
    assert_eq!(task_of(&ctx, 1).scheduled_parts[0].start, at(6, 9, 0));
}

#[test]
fn higher_priority_task_bumps_a_lower_one() {
    // The low-importance filler claims the whole day first; the urgent
    // task displaces it and the filler cannot be re-placed.
    let mut filler = Task::new(1, "filler", 480);
    filler.importance = 2;
    let mut urgent = Task::new(2, "urgent", 240);
    urgent.importance = 9;
    urgent.due = Some(at(6, 17, 0));

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![filler, urgent], window, BumpPolicy::Single);

    let urgent_parts = &task_of(&ctx, 2).scheduled_parts;
    assert_eq!(urgent_parts.len(), 1);
    assert_eq!(urgent_parts[0].duration_minutes(), 240);
    assert!(!task_of(&ctx, 1).is_scheduled());
    assert!(ctx.unscheduled.iter().any(|u| u.task_id == 1));
}

#[test]
fn bump_carves_the_newcomer_out_of_the_freed_interval() {
    // The filler holds the only interval that can host the urgent task,
    // and that interval runs past the urgent due date. The bump must
    // carve the freed time directly rather than re-filter it by slot end.
    let mut filler = Task::new(1, "filler", 480);
    filler.importance = 2;
    let mut urgent = Task::new(2, "urgent", 240);
    urgent.importance = 9;
    urgent.due = Some(at(6, 13, 0));

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![filler, urgent], window, BumpPolicy::Single);

    let urgent_parts = &task_of(&ctx, 2).scheduled_parts;
    assert_eq!(urgent_parts.len(), 1);
    assert_eq!(urgent_parts[0].start, at(6, 9, 0));
    assert_eq!(urgent_parts[0].end, at(6, 13, 0));
    assert!(!task_of(&ctx, 1).is_scheduled());
    assert!(ctx.unscheduled.iter().any(|u| u.task_id == 1));
    assert!(!ctx.unscheduled.iter().any(|u| u.task_id == 2));
}

#[test]
fn bumped_task_is_rescheduled_when_room_remains() {
    let mut filler = Task::new(1, "filler", 120);
    filler.importance = 2;
    let mut urgent = Task::new(2, "urgent", 120);
    urgent.importance = 9;
    urgent.due = Some(at(6, 11, 0));

    // Filler takes the snug morning slot; urgent needs exactly that slot
    // and filler moves to the afternoon.
    let window = ScheduleWindow::from_slots(vec![
        TimeSlot::new(at(6, 9, 0), at(6, 11, 0)),
        TimeSlot::new(at(6, 13, 0), at(6, 17, 0)),
    ]);
    let ctx = run_allocator(vec![filler, urgent], window, BumpPolicy::Single);

    assert_eq!(task_of(&ctx, 2).scheduled_parts[0].start, at(6, 9, 0));
    let filler_parts = &task_of(&ctx, 1).scheduled_parts;
    assert_eq!(filler_parts.len(), 1);
    assert_eq!(filler_parts[0].start, at(6, 13, 0));
    assert!(ctx.unscheduled.is_empty());
}

#[test]
fn pinned_tasks_are_never_bumped() {
    let mut pinned = Task::new(1, "pinned", 480);
    pinned.importance = 2;
    pinned.pinned = true;
    let mut urgent = Task::new(2, "urgent", 240);
    urgent.importance = 9;

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![pinned, urgent], window, BumpPolicy::Single);

    assert!(task_of(&ctx, 1).is_scheduled());
    assert!(!task_of(&ctx, 2).is_scheduled());
    assert!(ctx.unscheduled.iter().any(|u| u.task_id == 2));
}

#[test]
fn equal_importance_does_not_bump() {
    let mut first = Task::new(1, "first", 480);
    first.importance = 5;
    let mut second = Task::new(2, "second", 480);
    second.importance = 5;

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![first, second], window, BumpPolicy::Single);

    assert!(task_of(&ctx, 1).is_scheduled());
    assert!(!task_of(&ctx, 2).is_scheduled());
}

#[test]
fn dependent_starts_after_its_prerequisite_ends() {
    let prereq = Task::new(1, "prereq", 120);
    let mut dependent = Task::new(2, "dependent", 60);
    dependent.dependencies = vec![1];

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![prereq, dependent], window, BumpPolicy::Single);

    let prereq_end = task_of(&ctx, 1).latest_scheduled_end().unwrap();
    let dependent_start = task_of(&ctx, 2).scheduled_parts[0].start;
    assert!(dependent_start >= prereq_end);
}

#[test]
fn dependent_of_an_unplaced_task_is_blocked() {
    let mut dependent = Task::new(2, "dependent", 60);
    dependent.dependencies = vec![1];
    // Prerequisite listed after its dependent, so it is not yet placed.
    let tasks = vec![dependent, Task::new(1, "prereq", 60)];

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(tasks, window, BumpPolicy::Single);

    assert!(!task_of(&ctx, 2).is_scheduled());
    let entry = ctx.unscheduled.iter().find(|u| u.task_id == 2).unwrap();
    assert!(entry.reason.contains("dependency"));
}

#[test]
fn completed_dependency_counts_as_satisfied() {
    let mut done = Task::new(1, "done", 120);
    done.completed = true;
    let mut dependent = Task::new(2, "dependent", 60);
    dependent.dependencies = vec![1];

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![done, dependent], window, BumpPolicy::Single);

    assert!(task_of(&ctx, 2).is_scheduled());
    assert!(!task_of(&ctx, 1).is_scheduled());
}

#[test]
fn divisible_task_fills_scattered_gaps() {
    let mut course = Task::new(1, "course", 180);
    course.divisible = true;

    let window = ScheduleWindow::from_slots(vec![
        TimeSlot::new(at(6, 9, 0), at(6, 10, 0)),
        TimeSlot::new(at(6, 11, 0), at(6, 12, 0)),
        TimeSlot::new(at(6, 13, 0), at(6, 17, 0)),
    ]);
    let ctx = run_allocator(vec![course], window, BumpPolicy::Single);

    let task = task_of(&ctx, 1);
    assert_eq!(task.scheduled_minutes(), 180);
    assert_eq!(task.scheduled_parts.len(), 3);
}

#[test]
fn divisible_shortfall_restores_the_window() {
    let mut course = Task::new(1, "course", 300);
    course.divisible = true;

    let window = ScheduleWindow::from_slots(vec![
        TimeSlot::new(at(6, 9, 0), at(6, 10, 0)),
        TimeSlot::new(at(6, 11, 0), at(6, 12, 0)),
    ]);
    let ctx = run_allocator(vec![course], window, BumpPolicy::Single);

    assert!(!task_of(&ctx, 1).is_scheduled());
    // Transactional: both gaps survive untouched.
    assert_eq!(ctx.window.as_ref().unwrap().total_minutes(), 120);
}

#[test]
fn appeal_commits_a_bundle_of_bumps() {
    let mut low = Task::new(1, "low", 300);
    low.importance = 3;
    let mut lower = Task::new(2, "lower", 180);
    lower.importance = 2;
    let mut vip = Task::new(3, "vip", 480);
    vip.importance = 8;
    vip.divisible = true;

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![low, lower, vip], window, BumpPolicy::MultiAppeal);

    let vip_task = task_of(&ctx, 3);
    assert_eq!(vip_task.scheduled_minutes(), 480);
    assert!(!task_of(&ctx, 1).is_scheduled());
    assert!(!task_of(&ctx, 2).is_scheduled());
    assert!(!ctx.unscheduled.iter().any(|u| u.task_id == 3));
}

#[test]
fn appeal_succeeds_when_freed_time_merges_past_the_due_date() {
    // Evicting the morning block merges it with free time running past
    // the appellant's deadline; only the portion before the deadline
    // counts, and together with the slack it is enough.
    let mut low = Task::new(1, "low", 180);
    low.importance = 3;
    let mut vip = Task::new(2, "vip", 480);
    vip.importance = 8;
    vip.divisible = true;
    vip.due = Some(at(6, 17, 0));

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 18, 0))]);
    let ctx = run_allocator(vec![low, vip], window, BumpPolicy::MultiAppeal);

    let vip_task = task_of(&ctx, 2);
    assert_eq!(vip_task.scheduled_minutes(), 480);
    assert!(vip_task.scheduled_parts.iter().all(|p| p.end <= at(6, 17, 0)));
    assert!(!task_of(&ctx, 1).is_scheduled());
    assert!(!ctx.unscheduled.iter().any(|u| u.task_id == 2));
}

#[test]
fn insufficient_appeal_evicts_nothing() {
    let mut low = Task::new(1, "low", 300);
    low.importance = 3;
    let mut lower = Task::new(2, "lower", 180);
    lower.importance = 2;
    let mut vip = Task::new(3, "vip", 600);
    vip.importance = 8;
    vip.divisible = true;

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![low, lower, vip], window, BumpPolicy::MultiAppeal);

    // The appeal cannot cover a 600-minute shortfall with 480 reclaimable
    // minutes, so the placed tasks keep their slots.
    assert!(task_of(&ctx, 1).is_scheduled());
    assert!(task_of(&ctx, 2).is_scheduled());
    assert!(ctx.unscheduled.iter().any(|u| u.task_id == 3));
}

#[test]
fn single_policy_skips_the_appeal() {
    let mut low = Task::new(1, "low", 300);
    low.importance = 3;
    let mut lower = Task::new(2, "lower", 180);
    lower.importance = 2;
    let mut vip = Task::new(3, "vip", 480);
    vip.importance = 8;
    vip.divisible = true;

    let window = ScheduleWindow::from_slots(vec![TimeSlot::new(at(6, 9, 0), at(6, 17, 0))]);
    let ctx = run_allocator(vec![low, lower, vip], window, BumpPolicy::Single);

    assert!(!task_of(&ctx, 3).is_scheduled());
    assert!(task_of(&ctx, 1).is_scheduled());
    assert!(task_of(&ctx, 2).is_scheduled());
}
