use super::{PersistenceResult, PlannerStore};
use crate::board::{IdCounters, TaskList};
use crate::{Event, Task, TaskBoard, WorkProfile};
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

pub struct SqliteTaskStore {
    connection: Mutex<Connection>,
}

impl SqliteTaskStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS board_settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                profile_json TEXT NOT NULL,
                counters_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS lists (
                id INTEGER PRIMARY KEY,
                list_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY,
                event_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY,
                task_json TEXT NOT NULL
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn save_settings(
        &self,
        tx: &rusqlite::Transaction,
        board: &TaskBoard,
    ) -> PersistenceResult<()> {
        let profile_json = serde_json::to_string(board.profile())?;
        let counters_json = serde_json::to_string(&board.counters())?;
        tx.execute("DELETE FROM board_settings", [])?;
        tx.execute(
            "INSERT INTO board_settings (id, profile_json, counters_json) VALUES (1, ?1, ?2)",
            params![profile_json, counters_json],
        )?;
        Ok(())
    }

    fn save_lists(&self, tx: &rusqlite::Transaction, board: &TaskBoard) -> PersistenceResult<()> {
        tx.execute("DELETE FROM lists", [])?;
        let mut stmt = tx.prepare("INSERT INTO lists (id, list_json) VALUES (?1, ?2)")?;
        for list in board.lists() {
            let json = serde_json::to_string(list)?;
            stmt.execute(params![list.id, json])?;
        }
        Ok(())
    }

    fn save_events(&self, tx: &rusqlite::Transaction, board: &TaskBoard) -> PersistenceResult<()> {
        tx.execute("DELETE FROM events", [])?;
        let mut stmt = tx.prepare("INSERT INTO events (id, event_json) VALUES (?1, ?2)")?;
        for event in board.events() {
            let json = serde_json::to_string(event)?;
            stmt.execute(params![event.id, json])?;
        }
        Ok(())
    }

    fn save_tasks(&self, tx: &rusqlite::Transaction, board: &TaskBoard) -> PersistenceResult<()> {
        tx.execute("DELETE FROM tasks", [])?;
        let mut stmt = tx.prepare("INSERT INTO tasks (id, task_json) VALUES (?1, ?2)")?;
        for task in board.tasks()? {
            let json = serde_json::to_string(&task)?;
            stmt.execute(params![task.id, json])?;
        }
        Ok(())
    }
}

impl PlannerStore for SqliteTaskStore {
    fn save_board(&self, board: &TaskBoard) -> PersistenceResult<()> {
        super::validate_board(board)?;
        let mut conn = self.connection.lock().expect("sqlite mutex poisoned");
        let tx = conn.transaction()?;
        self.save_settings(&tx, board)?;
        self.save_lists(&tx, board)?;
        self.save_events(&tx, board)?;
        self.save_tasks(&tx, board)?;
        tx.commit()?;
        Ok(())
    }

    fn load_board(&self) -> PersistenceResult<Option<TaskBoard>> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");

        let mut stmt =
            conn.prepare("SELECT profile_json, counters_json FROM board_settings WHERE id = 1")?;
        let settings: Option<(String, String)> = stmt
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((profile_json, counters_json)) = settings else {
            return Ok(None);
        };

        let profile: WorkProfile = serde_json::from_str(&profile_json)?;
        let counters: IdCounters = serde_json::from_str(&counters_json)?;

        let mut stmt = conn.prepare("SELECT list_json FROM lists ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut lists: Vec<TaskList> = Vec::new();
        for json in rows {
            lists.push(serde_json::from_str(&json?)?);
        }

        let mut stmt = conn.prepare("SELECT event_json FROM events ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut events: Vec<Event> = Vec::new();
        for json in rows {
            events.push(serde_json::from_str(&json?)?);
        }

        let mut stmt = conn.prepare("SELECT task_json FROM tasks ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut tasks: Vec<Task> = Vec::new();
        for json in rows {
            tasks.push(serde_json::from_str(&json?)?);
        }

        super::validate_tasks(&tasks)?;

        let board = TaskBoard::from_parts(profile, lists, events, tasks, counters)?;
        Ok(Some(board))
    }
}
