use crate::{Task, TaskBoard};
use crate::board::BoardError;
use polars::prelude::PolarsError;
use serde_json::Error as SerdeJsonError;
use std::collections::HashSet;
use std::fmt;
use std::io;

#[derive(Debug)]
pub enum PersistenceError {
    Serialization(SerdeJsonError),
    DataFrame(PolarsError),
    Io(io::Error),
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::Error),
    Csv(csv::Error),
    Board(BoardError),
    InvalidData(String),
    NotFound,
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::Serialization(err) => write!(f, "serialization error: {err}"),
            PersistenceError::DataFrame(err) => write!(f, "dataframe conversion error: {err}"),
            PersistenceError::Io(err) => write!(f, "io error: {err}"),
            #[cfg(feature = "sqlite")]
            PersistenceError::Sqlite(err) => write!(f, "sqlite error: {err}"),
            PersistenceError::Csv(err) => write!(f, "csv error: {err}"),
            PersistenceError::Board(err) => write!(f, "board error: {err}"),
            PersistenceError::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            PersistenceError::NotFound => write!(f, "no board stored"),
        }
    }
}

impl std::error::Error for PersistenceError {}

impl From<SerdeJsonError> for PersistenceError {
    fn from(value: SerdeJsonError) -> Self {
        Self::Serialization(value)
    }
}

impl From<PolarsError> for PersistenceError {
    fn from(value: PolarsError) -> Self {
        Self::DataFrame(value)
    }
}

impl From<io::Error> for PersistenceError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for PersistenceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<csv::Error> for PersistenceError {
    fn from(value: csv::Error) -> Self {
        Self::Csv(value)
    }
}

impl From<BoardError> for PersistenceError {
    fn from(value: BoardError) -> Self {
        Self::Board(value)
    }
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

pub trait PlannerStore {
    fn save_board(&self, board: &TaskBoard) -> PersistenceResult<()>;
    fn load_board(&self) -> PersistenceResult<Option<TaskBoard>>;
}

const EPSILON: f64 = 1e-6;

pub fn validate_tasks(tasks: &[Task]) -> PersistenceResult<()> {
    let mut seen_ids = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen_ids.insert(task.id) {
            return Err(PersistenceError::InvalidData(format!(
                "duplicate task id {}",
                task.id
            )));
        }
        if task.estimated_minutes <= 0 {
            return Err(PersistenceError::InvalidData(format!(
                "task {} has non-positive duration {} minutes",
                task.id, task.estimated_minutes
            )));
        }
        if !(1..=10).contains(&task.importance) {
            return Err(PersistenceError::InvalidData(format!(
                "task {} has importance {} outside 1-10",
                task.id, task.importance
            )));
        }
        if !task.complexity.is_finite() || task.complexity <= 0.0 {
            return Err(PersistenceError::InvalidData(format!(
                "task {} has invalid complexity {}",
                task.id, task.complexity
            )));
        }
        if !task.progress.is_finite()
            || task.progress < -EPSILON
            || task.progress > 1.0 + EPSILON
        {
            return Err(PersistenceError::InvalidData(format!(
                "task {} has invalid progress {} (must be between 0 and 1)",
                task.id, task.progress
            )));
        }
        if task.dependencies.contains(&task.id) {
            return Err(PersistenceError::InvalidData(format!(
                "task {} depends on itself",
                task.id
            )));
        }
        for pair in task.scheduled_parts.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(PersistenceError::InvalidData(format!(
                    "task {} has out-of-order or overlapping schedule fragments",
                    task.id
                )));
            }
        }
        for part in &task.scheduled_parts {
            if part.end <= part.start {
                return Err(PersistenceError::InvalidData(format!(
                    "task {} has an empty or inverted schedule fragment",
                    task.id
                )));
            }
        }
    }
    Ok(())
}

pub fn validate_board(board: &TaskBoard) -> PersistenceResult<()> {
    let tasks = board.tasks()?;
    validate_tasks(&tasks)
}

#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod file;

pub use file::{
    export_tasks_to_csv, import_tasks_from_csv, load_board_from_json, save_board_to_json,
};
