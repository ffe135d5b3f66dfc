use crate::calculations::{UrgencyEngine, apply_urgency};
use crate::calendar::ScheduleWindow;
use crate::event::Event;
use crate::graph::GraphError;
use crate::profile::WorkProfile;
use crate::task::Task;
use chrono::NaiveDateTime;

pub mod allocator;
pub mod balancer;
pub mod day_sequencer;
pub mod prioritizer;
pub mod slot_planner;

pub use allocator::Allocator;
pub use balancer::{DayBucket, LoadBalancer};
pub use day_sequencer::DaySequencer;
pub use prioritizer::Prioritizer;
pub use slot_planner::SlotPlanner;

/// A task the run could not place, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unscheduled {
    pub task_id: i32,
    pub reason: String,
}

/// Shared state threaded through the pipeline stages.
///
/// One context is created per scheduling run and discarded afterwards;
/// each field is an explicit artifact a stage produces or consumes, so a
/// missing prerequisite is visible as `None` rather than a runtime type
/// probe. The trace log records what every stage did and why.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub now: NaiveDateTime,
    pub profile: WorkProfile,
    pub events: Vec<Event>,
    pub tasks: Vec<Task>,
    pub window: Option<ScheduleWindow>,
    pub buckets: Option<Vec<DayBucket>>,
    pub unscheduled: Vec<Unscheduled>,
    pub trace: Vec<String>,
    pub halted: bool,
}

impl PipelineContext {
    pub fn new(
        tasks: Vec<Task>,
        profile: WorkProfile,
        events: Vec<Event>,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            now,
            profile,
            events,
            tasks,
            window: None,
            buckets: None,
            unscheduled: Vec::new(),
            trace: Vec::new(),
            halted: false,
        }
    }

    pub fn trace(&mut self, message: impl Into<String>) {
        self.trace.push(message.into());
    }

    pub fn mark_unscheduled(&mut self, task_id: i32, reason: impl Into<String>) {
        let reason = reason.into();
        self.trace
            .push(format!("task {task_id} unscheduled: {reason}"));
        self.unscheduled.push(Unscheduled { task_id, reason });
    }

    pub fn task_by_id(&self, task_id: i32) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }
}

/// One pipeline stage. Stages run in strict order, each completing before
/// the next begins; a contract violation (missing artifact) traces and
/// passes the context through rather than failing the run.
pub trait Stage {
    fn name(&self) -> &'static str;
    fn run(&self, ctx: &mut PipelineContext) -> Result<(), GraphError>;
}

/// Which load-balancing strategy distributes work across days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceMode {
    #[default]
    Density,
    GoldPanning,
}

/// Whether the allocator may only bump one task per placement or may also
/// run the last-chance appeal pass that commits bundles of bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BumpPolicy {
    Single,
    #[default]
    MultiAppeal,
}

/// Placement back-end, selected once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Spread load across days (balancer + day sequencer).
    Balanced(BalanceMode),
    /// Best-fit slots with priority displacement (bump allocator).
    Priority(BumpPolicy),
}

impl Default for Placement {
    fn default() -> Self {
        Placement::Priority(BumpPolicy::MultiAppeal)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub placement: Placement,
}

/// Result of one scheduling run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub tasks: Vec<Task>,
    pub unscheduled: Vec<Unscheduled>,
    pub trace: Vec<String>,
}

struct UrgencyStage;

impl Stage for UrgencyStage {
    fn name(&self) -> &'static str {
        "urgency"
    }

    fn run(&self, ctx: &mut PipelineContext) -> Result<(), GraphError> {
        let results = UrgencyEngine::new(&ctx.tasks).execute(ctx.now)?;
        apply_urgency(&mut ctx.tasks, &results);
        ctx.trace(format!("urgency resolved for {} tasks", results.len()));
        Ok(())
    }
}

pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn from_options(options: RunOptions) -> Self {
        let mut stages: Vec<Box<dyn Stage>> = vec![
            Box::new(SlotPlanner),
            Box::new(UrgencyStage),
            Box::new(Prioritizer),
        ];
        match options.placement {
            Placement::Balanced(mode) => {
                stages.push(Box::new(LoadBalancer::new(mode)));
                stages.push(Box::new(DaySequencer));
            }
            Placement::Priority(policy) => {
                stages.push(Box::new(Allocator::new(policy)));
            }
        }
        Self { stages }
    }

    pub fn with_stages(stages: Vec<Box<dyn Stage>>) -> Self {
        Self { stages }
    }

    pub fn execute(&self, ctx: &mut PipelineContext) -> Result<(), GraphError> {
        for stage in &self.stages {
            if ctx.halted {
                ctx.trace(format!("pipeline halted before stage '{}'", stage.name()));
                break;
            }
            ctx.trace(format!("stage '{}' started", stage.name()));
            stage.run(ctx)?;
        }
        Ok(())
    }
}

/// The one call surface the rest of the application depends on: schedule
/// `tasks` against `profile` and `events` as of `now`.
pub fn run_pipeline(
    tasks: Vec<Task>,
    profile: WorkProfile,
    events: Vec<Event>,
    now: NaiveDateTime,
    options: RunOptions,
) -> Result<RunOutcome, GraphError> {
    let mut ctx = PipelineContext::new(tasks, profile, events, now);
    let pipeline = Pipeline::from_options(options);
    pipeline.execute(&mut ctx)?;
    Ok(RunOutcome {
        tasks: ctx.tasks,
        unscheduled: ctx.unscheduled,
        trace: ctx.trace,
    })
}
