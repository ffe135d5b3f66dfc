use super::{PersistenceError, PersistenceResult};
use crate::board::{IdCounters, TaskList};
use crate::{Event, Task, TaskBoard, WorkProfile};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Serialize, Deserialize)]
struct BoardSnapshot {
    profile: WorkProfile,
    lists: Vec<TaskList>,
    events: Vec<Event>,
    tasks: Vec<Task>,
    id_counters: IdCounters,
}

impl BoardSnapshot {
    fn from_board(board: &TaskBoard) -> PersistenceResult<Self> {
        let tasks = board.tasks()?;
        super::validate_tasks(&tasks)?;
        Ok(Self {
            profile: board.profile().clone(),
            lists: board.lists().to_vec(),
            events: board.events().to_vec(),
            tasks,
            id_counters: board.counters(),
        })
    }

    fn into_board(self) -> PersistenceResult<TaskBoard> {
        super::validate_tasks(&self.tasks)?;
        let board = TaskBoard::from_parts(
            self.profile,
            self.lists,
            self.events,
            self.tasks,
            self.id_counters,
        )?;
        Ok(board)
    }
}

pub fn save_board_to_json<P: AsRef<Path>>(board: &TaskBoard, path: P) -> PersistenceResult<()> {
    let snapshot = BoardSnapshot::from_board(board)?;
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, &snapshot)?;
    Ok(())
}

pub fn load_board_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<TaskBoard> {
    let file = File::open(path)?;
    let snapshot: BoardSnapshot = serde_json::from_reader(file)?;
    snapshot.into_board()
}

#[derive(Serialize, Deserialize)]
struct TaskCsvRecord {
    id: i32,
    display_id: i32,
    title: String,
    notes: String,
    importance: i32,
    complexity: f64,
    estimated_minutes: i64,
    due: String,
    progress: f64,
    dependencies: String,
    pinned: bool,
    divisible: bool,
    completed: bool,
    scheduled_parts: String,
    latest_possible_start: String,
    urgency_score: f64,
}

impl From<&Task> for TaskCsvRecord {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            display_id: task.display_id,
            title: task.title.clone(),
            notes: task.notes.clone().unwrap_or_default(),
            importance: task.importance,
            complexity: task.complexity,
            estimated_minutes: task.estimated_minutes,
            due: format_datetime(task.due),
            progress: task.progress,
            dependencies: join_i32(&task.dependencies),
            pinned: task.pinned,
            divisible: task.divisible,
            completed: task.completed,
            scheduled_parts: join_parts(task),
            latest_possible_start: format_datetime(task.latest_possible_start),
            urgency_score: task.urgency_score,
        }
    }
}

impl TaskCsvRecord {
    fn into_task(self) -> PersistenceResult<Task> {
        let mut task = Task::new(self.id, self.title, self.estimated_minutes);
        task.display_id = self.display_id;
        task.notes = parse_string_option(self.notes);
        task.importance = self.importance;
        task.effective_importance = self.importance;
        task.complexity = self.complexity;
        task.due = parse_datetime(&self.due)?;
        task.progress = self.progress;
        task.dependencies = split_i32(&self.dependencies)?;
        task.pinned = self.pinned;
        task.divisible = self.divisible;
        task.completed = self.completed;
        task.scheduled_parts = split_parts(&self.scheduled_parts)?;
        task.latest_possible_start = parse_datetime(&self.latest_possible_start)?;
        task.urgency_score = self.urgency_score;
        Ok(task)
    }
}

pub fn export_tasks_to_csv<P: AsRef<Path>>(board: &TaskBoard, path: P) -> PersistenceResult<()> {
    super::validate_board(board)?;
    let file = File::create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    for task in board.tasks()? {
        writer.serialize(TaskCsvRecord::from(&task))?;
    }
    writer.flush()?;
    Ok(())
}

/// Read tasks from CSV into a fresh board. Profile, lists and events are
/// not part of the CSV surface; callers layer those on afterwards.
pub fn import_tasks_from_csv<P: AsRef<Path>>(path: P) -> PersistenceResult<TaskBoard> {
    let file = File::open(path)?;
    let mut reader = csv::Reader::from_reader(file);
    let mut tasks = Vec::new();
    for record in reader.deserialize::<TaskCsvRecord>() {
        let record = record?;
        tasks.push(record.into_task()?);
    }

    if tasks.is_empty() {
        return Err(PersistenceError::InvalidData(
            "CSV file contained no tasks".into(),
        ));
    }

    super::validate_tasks(&tasks)?;

    let max_id = tasks.iter().map(|t| t.id).max().unwrap_or(0);
    let counters = IdCounters {
        next_task_id: max_id + 1,
        ..IdCounters::default()
    };
    let board = TaskBoard::from_parts(
        WorkProfile::default(),
        Vec::new(),
        Vec::new(),
        tasks,
        counters,
    )?;
    Ok(board)
}

fn format_datetime(value: Option<NaiveDateTime>) -> String {
    value
        .map(|v| v.format(DATETIME_FORMAT).to_string())
        .unwrap_or_default()
}

fn parse_datetime(input: &str) -> PersistenceResult<Option<NaiveDateTime>> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    NaiveDateTime::parse_from_str(input.trim(), DATETIME_FORMAT)
        .map(Some)
        .map_err(|e| PersistenceError::InvalidData(format!("invalid datetime '{input}': {e}")))
}

fn join_i32(values: &[i32]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn split_i32(input: &str) -> PersistenceResult<Vec<i32>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    input
        .split(',')
        .map(|part| {
            part.trim().parse::<i32>().map_err(|e| {
                PersistenceError::InvalidData(format!("invalid integer '{part}': {e}"))
            })
        })
        .collect()
}

/// Fragments serialize as `start/end` pairs joined by semicolons.
fn join_parts(task: &Task) -> String {
    task.scheduled_parts
        .iter()
        .map(|p| {
            format!(
                "{}/{}",
                p.start.format(DATETIME_FORMAT),
                p.end.format(DATETIME_FORMAT)
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn split_parts(input: &str) -> PersistenceResult<Vec<crate::task::ScheduledPart>> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }
    input
        .split(';')
        .map(|pair| {
            let (start, end) = pair.split_once('/').ok_or_else(|| {
                PersistenceError::InvalidData(format!("invalid schedule fragment '{pair}'"))
            })?;
            let start = parse_datetime(start)?.ok_or_else(|| {
                PersistenceError::InvalidData(format!("invalid schedule fragment '{pair}'"))
            })?;
            let end = parse_datetime(end)?.ok_or_else(|| {
                PersistenceError::InvalidData(format!("invalid schedule fragment '{pair}'"))
            })?;
            Ok(crate::task::ScheduledPart::new(start, end))
        })
        .collect()
}

fn parse_string_option(value: String) -> Option<String> {
    if value.trim().is_empty() { None } else { Some(value) }
}
