use crate::clock::Clock;
use crate::event::Event;
use crate::graph::{DependencyGraph, GraphError};
use crate::pipeline::{RunOptions, RunOutcome, run_pipeline};
use crate::profile::WorkProfile;
use crate::task::Task;
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug)]
pub enum BoardError {
    Graph(GraphError),
    DataFrame(PolarsError),
    UnknownTask(i32),
    InvalidValue(String),
}

impl fmt::Display for BoardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardError::Graph(err) => write!(f, "dependency graph error: {err}"),
            BoardError::DataFrame(err) => write!(f, "task table error: {err}"),
            BoardError::UnknownTask(id) => write!(f, "no task with id {id}"),
            BoardError::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
        }
    }
}

impl std::error::Error for BoardError {}

impl From<GraphError> for BoardError {
    fn from(value: GraphError) -> Self {
        Self::Graph(value)
    }
}

impl From<PolarsError> for BoardError {
    fn from(value: PolarsError) -> Self {
        Self::DataFrame(value)
    }
}

pub type BoardResult<T> = Result<T, BoardError>;

/// A named grouping of tasks; purely organizational, invisible to the
/// scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskList {
    pub id: i32,
    pub name: String,
    pub task_ids: Vec<i32>,
}

/// Counters for stable ids; persisted so ids never recycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdCounters {
    pub next_task_id: i32,
    pub next_event_id: i32,
    pub next_list_id: i32,
}

impl Default for IdCounters {
    fn default() -> Self {
        Self {
            next_task_id: 1,
            next_event_id: 1,
            next_list_id: 1,
        }
    }
}

/// The calling service around the scheduling pipeline.
///
/// Owns task identity, titles, lists, events, and the work profile in a
/// DataFrame-backed table; each `plan` run hands the pipeline fresh copies
/// and writes the resulting fragments and urgency data back.
pub struct TaskBoard {
    df: DataFrame,
    profile: WorkProfile,
    events: Vec<Event>,
    lists: Vec<TaskList>,
    clock: Clock,
    counters: IdCounters,
}

impl Default for TaskBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBoard {
    pub fn new() -> Self {
        Self {
            df: DataFrame::empty_with_schema(&Self::default_schema()),
            profile: WorkProfile::default(),
            events: Vec::new(),
            lists: Vec::new(),
            clock: Clock::new(),
            counters: IdCounters::default(),
        }
    }

    pub fn from_parts(
        profile: WorkProfile,
        lists: Vec<TaskList>,
        events: Vec<Event>,
        tasks: Vec<Task>,
        counters: IdCounters,
    ) -> BoardResult<Self> {
        let mut board = Self::new();
        board.profile = profile;
        board.lists = lists;
        board.events = events;
        board.counters = counters;
        board.replace_tasks(tasks)?;
        Ok(board)
    }

    fn default_schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("id".into(), DataType::Int32),
            Field::new("display_id".into(), DataType::Int32),
            Field::new("title".into(), DataType::String),
            Field::new("notes".into(), DataType::String),
            Field::new("importance".into(), DataType::Int32),
            Field::new("effective_importance".into(), DataType::Int32),
            Field::new("complexity".into(), DataType::Float64),
            Field::new("estimated_minutes".into(), DataType::Int64),
            Field::new(
                "due".into(),
                DataType::Datetime(TimeUnit::Milliseconds, None),
            ),
            Field::new("progress".into(), DataType::Float64),
            Field::new(
                "dependencies".into(),
                DataType::List(Box::new(DataType::Int32)),
            ),
            Field::new("pinned".into(), DataType::Boolean),
            Field::new("divisible".into(), DataType::Boolean),
            Field::new("completed".into(), DataType::Boolean),
            Field::new(
                "part_starts".into(),
                DataType::List(Box::new(DataType::Int64)),
            ),
            Field::new(
                "part_ends".into(),
                DataType::List(Box::new(DataType::Int64)),
            ),
            Field::new(
                "latest_possible_start".into(),
                DataType::Datetime(TimeUnit::Milliseconds, None),
            ),
            Field::new("urgency_score".into(), DataType::Float64),
        ])
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn profile(&self) -> &WorkProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: WorkProfile) {
        self.profile = profile;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn lists(&self) -> &[TaskList] {
        &self.lists
    }

    pub fn counters(&self) -> IdCounters {
        self.counters
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    pub fn tasks(&self) -> BoardResult<Vec<Task>> {
        let mut tasks = Vec::with_capacity(self.df.height());
        for row_idx in 0..self.df.height() {
            tasks.push(Task::from_dataframe_row(&self.df, row_idx)?);
        }
        Ok(tasks)
    }

    pub fn task(&self, task_id: i32) -> BoardResult<Task> {
        self.tasks()?
            .into_iter()
            .find(|t| t.id == task_id)
            .ok_or(BoardError::UnknownTask(task_id))
    }

    /// Rebuild the task table from a full task list, preserving order.
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) -> BoardResult<()> {
        let mut df = DataFrame::empty_with_schema(&Self::default_schema());
        for task in &tasks {
            df = df.vstack(&task.to_dataframe_row()?)?;
        }
        self.df = df;
        Ok(())
    }

    fn with_task<F: FnOnce(&mut Task)>(&mut self, task_id: i32, edit: F) -> BoardResult<()> {
        let mut tasks = self.tasks()?;
        let task = tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or(BoardError::UnknownTask(task_id))?;
        edit(task);
        self.replace_tasks(tasks)
    }

    pub fn add_task(&mut self, title: &str, estimated_minutes: i64) -> BoardResult<i32> {
        if estimated_minutes <= 0 {
            return Err(BoardError::InvalidValue(format!(
                "estimated duration must be positive, got {estimated_minutes}"
            )));
        }
        let id = self.counters.next_task_id;
        self.counters.next_task_id += 1;
        let mut task = Task::new(id, title, estimated_minutes);
        task.display_id = self.df.height() as i32 + 1;
        self.df = self.df.vstack(&task.to_dataframe_row()?)?;
        Ok(id)
    }

    pub fn upsert_task_record(&mut self, task: Task) -> BoardResult<()> {
        let mut tasks = self.tasks()?;
        match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => *existing = task,
            None => {
                if task.id >= self.counters.next_task_id {
                    self.counters.next_task_id = task.id + 1;
                }
                tasks.push(task);
            }
        }
        self.replace_tasks(tasks)
    }

    pub fn remove_task(&mut self, task_id: i32) -> BoardResult<()> {
        let mut tasks = self.tasks()?;
        let before = tasks.len();
        tasks.retain(|t| t.id != task_id);
        if tasks.len() == before {
            return Err(BoardError::UnknownTask(task_id));
        }
        for task in tasks.iter_mut() {
            task.dependencies.retain(|d| *d != task_id);
        }
        for list in self.lists.iter_mut() {
            list.task_ids.retain(|t| *t != task_id);
        }
        self.replace_tasks(tasks)
    }

    /// Replace a task's dependency set, rejecting edits that would close
    /// a cycle. The table is untouched on rejection.
    pub fn set_dependencies(&mut self, task_id: i32, deps: Vec<i32>) -> BoardResult<()> {
        let tasks = self.tasks()?;
        if !tasks.iter().any(|t| t.id == task_id) {
            return Err(BoardError::UnknownTask(task_id));
        }
        let graph = DependencyGraph::build(&tasks);
        graph.would_create_cycle(task_id, &deps)?;
        self.with_task(task_id, |t| t.dependencies = deps)
    }

    pub fn set_title(&mut self, task_id: i32, title: &str) -> BoardResult<()> {
        let title = title.to_string();
        self.with_task(task_id, |t| t.title = title)
    }

    pub fn set_notes(&mut self, task_id: i32, notes: Option<String>) -> BoardResult<()> {
        self.with_task(task_id, |t| t.notes = notes)
    }

    pub fn set_importance(&mut self, task_id: i32, importance: i32) -> BoardResult<()> {
        if !(1..=10).contains(&importance) {
            return Err(BoardError::InvalidValue(format!(
                "importance must be 1-10, got {importance}"
            )));
        }
        self.with_task(task_id, |t| {
            t.importance = importance;
            t.effective_importance = importance;
        })
    }

    pub fn set_complexity(&mut self, task_id: i32, complexity: f64) -> BoardResult<()> {
        if !complexity.is_finite() || complexity <= 0.0 {
            return Err(BoardError::InvalidValue(format!(
                "complexity must be positive, got {complexity}"
            )));
        }
        self.with_task(task_id, |t| t.complexity = complexity)
    }

    pub fn set_estimated_minutes(&mut self, task_id: i32, minutes: i64) -> BoardResult<()> {
        if minutes <= 0 {
            return Err(BoardError::InvalidValue(format!(
                "estimated duration must be positive, got {minutes}"
            )));
        }
        self.with_task(task_id, |t| t.estimated_minutes = minutes)
    }

    pub fn set_due(&mut self, task_id: i32, due: Option<NaiveDateTime>) -> BoardResult<()> {
        self.with_task(task_id, |t| t.due = due)
    }

    pub fn set_progress(&mut self, task_id: i32, progress: f64) -> BoardResult<()> {
        if !progress.is_finite() || !(0.0..=1.0).contains(&progress) {
            return Err(BoardError::InvalidValue(format!(
                "progress must be within 0..=1, got {progress}"
            )));
        }
        self.with_task(task_id, |t| {
            t.progress = progress;
            if progress >= 1.0 {
                t.completed = true;
            }
        })
    }

    pub fn set_pinned(&mut self, task_id: i32, pinned: bool) -> BoardResult<()> {
        self.with_task(task_id, |t| t.pinned = pinned)
    }

    pub fn set_divisible(&mut self, task_id: i32, divisible: bool) -> BoardResult<()> {
        self.with_task(task_id, |t| t.divisible = divisible)
    }

    pub fn complete_task(&mut self, task_id: i32) -> BoardResult<()> {
        self.with_task(task_id, |t| {
            t.completed = true;
            t.progress = 1.0;
            t.urgency_score = 0.0;
            t.clear_schedule();
        })
    }

    /// Renumber display ids 1..n in stable-id order. Stable ids never
    /// change.
    pub fn reindex_display_ids(&mut self) -> BoardResult<()> {
        let mut tasks = self.tasks()?;
        tasks.sort_by_key(|t| t.id);
        for (pos, task) in tasks.iter_mut().enumerate() {
            task.display_id = pos as i32 + 1;
        }
        self.replace_tasks(tasks)
    }

    pub fn add_event(
        &mut self,
        title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> BoardResult<i32> {
        if end <= start {
            return Err(BoardError::InvalidValue(
                "event end must follow its start".into(),
            ));
        }
        let id = self.counters.next_event_id;
        self.counters.next_event_id += 1;
        self.events.push(Event::new(id, title, start, end));
        Ok(id)
    }

    pub fn remove_event(&mut self, event_id: i32) -> BoardResult<()> {
        let before = self.events.len();
        self.events.retain(|e| e.id != event_id);
        if self.events.len() == before {
            return Err(BoardError::InvalidValue(format!(
                "no event with id {event_id}"
            )));
        }
        Ok(())
    }

    pub fn add_list(&mut self, name: &str) -> i32 {
        let id = self.counters.next_list_id;
        self.counters.next_list_id += 1;
        self.lists.push(TaskList {
            id,
            name: name.to_string(),
            task_ids: Vec::new(),
        });
        id
    }

    pub fn rename_list(&mut self, list_id: i32, name: &str) -> BoardResult<()> {
        let list = self
            .lists
            .iter_mut()
            .find(|l| l.id == list_id)
            .ok_or_else(|| BoardError::InvalidValue(format!("no list with id {list_id}")))?;
        list.name = name.to_string();
        Ok(())
    }

    pub fn remove_list(&mut self, list_id: i32) -> BoardResult<()> {
        let before = self.lists.len();
        self.lists.retain(|l| l.id != list_id);
        if self.lists.len() == before {
            return Err(BoardError::InvalidValue(format!(
                "no list with id {list_id}"
            )));
        }
        Ok(())
    }

    pub fn assign_to_list(&mut self, task_id: i32, list_id: i32) -> BoardResult<()> {
        if !self.tasks()?.iter().any(|t| t.id == task_id) {
            return Err(BoardError::UnknownTask(task_id));
        }
        let list = self
            .lists
            .iter_mut()
            .find(|l| l.id == list_id)
            .ok_or_else(|| BoardError::InvalidValue(format!("no list with id {list_id}")))?;
        if !list.task_ids.contains(&task_id) {
            list.task_ids.push(task_id);
        }
        Ok(())
    }

    /// Run the scheduling pipeline against the current table and persist
    /// the resulting fragments and urgency data back into it.
    pub fn plan(&mut self, options: RunOptions) -> BoardResult<RunOutcome> {
        let tasks = self.tasks()?;
        let outcome = run_pipeline(
            tasks,
            self.profile.clone(),
            self.events.clone(),
            self.clock.now(),
            options,
        )?;
        self.replace_tasks(outcome.tasks.clone())?;
        Ok(outcome)
    }
}
