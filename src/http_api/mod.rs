use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::NaiveDateTime;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::board::{BoardError, TaskBoard};
use crate::pipeline::{BalanceMode, BumpPolicy, Placement, RunOptions, Unscheduled};
use crate::{Event, Task, WorkProfile};

#[derive(Clone)]
pub struct AppState {
    board: Arc<RwLock<TaskBoard>>,
}

impl AppState {
    pub fn new(board: TaskBoard) -> Self {
        Self {
            board: Arc::new(RwLock::new(board)),
        }
    }

    pub fn with_shared(board: Arc<RwLock<TaskBoard>>) -> Self {
        Self { board }
    }

    fn board(&self) -> Arc<RwLock<TaskBoard>> {
        self.board.clone()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

#[derive(Debug)]
enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(String),
    Internal(String),
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    fn invalid(message: impl Into<String>) -> Self {
        ApiError::Invalid(message.into())
    }

    fn internal(message: impl Into<String>) -> Self {
        ApiError::Internal(message.into())
    }
}

impl From<BoardError> for ApiError {
    fn from(value: BoardError) -> Self {
        match value {
            BoardError::Graph(err) => ApiError::Conflict(err.to_string()),
            BoardError::UnknownTask(id) => ApiError::NotFound(format!("task {id} not found")),
            BoardError::InvalidValue(msg) => ApiError::Invalid(msg),
            BoardError::DataFrame(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                let body = Json(ErrorBody {
                    error: "not_found",
                    message,
                });
                (StatusCode::NOT_FOUND, body).into_response()
            }
            ApiError::Conflict(message) => {
                let body = Json(ErrorBody {
                    error: "conflict",
                    message,
                });
                (StatusCode::CONFLICT, body).into_response()
            }
            ApiError::Invalid(message) => {
                let body = Json(ErrorBody {
                    error: "invalid_request",
                    message,
                });
                (StatusCode::BAD_REQUEST, body).into_response()
            }
            ApiError::Internal(message) => {
                let body = Json(ErrorBody {
                    error: "internal_error",
                    message,
                });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/profile", get(get_profile).put(update_profile))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/tasks/:id/dependencies", put(set_dependencies))
        .route("/tasks/:id/complete", post(complete_task))
        .route("/events", get(list_events).post(create_event))
        .route("/events/:id", delete(delete_event))
        .route("/plan", post(plan))
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, board: TaskBoard) -> std::io::Result<()> {
    let state = AppState::new(board);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn get_profile(State(state): State<AppState>) -> Json<WorkProfile> {
    let board = state.board();
    let profile = {
        let guard = board.read();
        guard.profile().clone()
    };
    Json(profile)
}

async fn update_profile(
    State(state): State<AppState>,
    Json(profile): Json<WorkProfile>,
) -> Result<Json<WorkProfile>, ApiError> {
    if profile.day_end <= profile.day_start {
        return Err(ApiError::invalid("day end must follow day start"));
    }
    let board = state.board();
    let current = {
        let mut guard = board.write();
        guard.set_profile(profile);
        guard.profile().clone()
    };
    Ok(Json(current))
}

async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<Task>>, ApiError> {
    let board = state.board();
    let tasks = {
        let guard = board.read();
        guard.tasks()?
    };
    Ok(Json(tasks))
}

async fn get_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> Result<Json<Task>, ApiError> {
    let board = state.board();
    let task = {
        let guard = board.read();
        guard.task(task_id)?
    };
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
struct CreateTaskPayload {
    title: String,
    estimated_minutes: i64,
    #[serde(default)]
    importance: Option<i32>,
    #[serde(default)]
    complexity: Option<f64>,
    #[serde(default)]
    due: Option<NaiveDateTime>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    pinned: bool,
    #[serde(default)]
    divisible: bool,
}

async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<CreateTaskPayload>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let board = state.board();
    let created = {
        let mut guard = board.write();
        let id = guard.add_task(&payload.title, payload.estimated_minutes)?;
        if let Some(importance) = payload.importance {
            guard.set_importance(id, importance)?;
        }
        if let Some(complexity) = payload.complexity {
            guard.set_complexity(id, complexity)?;
        }
        guard.set_due(id, payload.due)?;
        guard.set_notes(id, payload.notes)?;
        guard.set_pinned(id, payload.pinned)?;
        guard.set_divisible(id, payload.divisible)?;
        guard.task(id)?
    };
    Ok((StatusCode::CREATED, Json(created)))
}

async fn update_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
    Json(task): Json<Task>,
) -> Result<Json<Task>, ApiError> {
    if task.id != task_id {
        return Err(ApiError::invalid(
            "task id in payload does not match path parameter",
        ));
    }
    let board = state.board();
    let updated = {
        let mut guard = board.write();
        guard.task(task_id)?;
        guard.upsert_task_record(task)?;
        guard.task(task_id)?
    };
    Ok(Json(updated))
}

async fn delete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let board = state.board();
    {
        let mut guard = board.write();
        guard.remove_task(task_id)?;
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct DependenciesPayload {
    dependencies: Vec<i32>,
}

/// Replaces a task's dependency set. Edits that would close a cycle come
/// back as 409 with the offending task named.
async fn set_dependencies(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
    Json(payload): Json<DependenciesPayload>,
) -> Result<Json<Task>, ApiError> {
    let board = state.board();
    let updated = {
        let mut guard = board.write();
        guard.set_dependencies(task_id, payload.dependencies)?;
        guard.task(task_id)?
    };
    Ok(Json(updated))
}

async fn complete_task(
    State(state): State<AppState>,
    Path(task_id): Path<i32>,
) -> Result<Json<Task>, ApiError> {
    let board = state.board();
    let updated = {
        let mut guard = board.write();
        guard.complete_task(task_id)?;
        guard.task(task_id)?
    };
    Ok(Json(updated))
}

async fn list_events(State(state): State<AppState>) -> Json<Vec<Event>> {
    let board = state.board();
    let events = {
        let guard = board.read();
        guard.events().to_vec()
    };
    Json(events)
}

#[derive(Debug, Deserialize)]
struct CreateEventPayload {
    title: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
}

async fn create_event(
    State(state): State<AppState>,
    Json(payload): Json<CreateEventPayload>,
) -> Result<(StatusCode, Json<Event>), ApiError> {
    let board = state.board();
    let created = {
        let mut guard = board.write();
        let id = guard.add_event(&payload.title, payload.start, payload.end)?;
        guard
            .events()
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .ok_or_else(|| ApiError::internal("event not found after creation"))?
    };
    Ok((StatusCode::CREATED, Json(created)))
}

async fn delete_event(
    State(state): State<AppState>,
    Path(event_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    let board = state.board();
    let result = {
        let mut guard = board.write();
        guard.remove_event(event_id)
    };
    match result {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(_) => Err(ApiError::not_found(format!("event {event_id} not found"))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct PlanPayload {
    #[serde(default)]
    strategy: Option<String>,
}

#[derive(Debug, Serialize)]
struct PlanSummary {
    tasks: Vec<Task>,
    unscheduled: Vec<UnscheduledBody>,
    trace: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UnscheduledBody {
    task_id: i32,
    reason: String,
}

impl From<Unscheduled> for UnscheduledBody {
    fn from(value: Unscheduled) -> Self {
        Self {
            task_id: value.task_id,
            reason: value.reason,
        }
    }
}

fn parse_strategy(input: Option<&str>) -> Result<Placement, ApiError> {
    match input.map(str::trim) {
        None | Some("") => Ok(Placement::default()),
        Some("priority") => Ok(Placement::Priority(BumpPolicy::MultiAppeal)),
        Some("priority_single") => Ok(Placement::Priority(BumpPolicy::Single)),
        Some("balanced") => Ok(Placement::Balanced(BalanceMode::Density)),
        Some("gold_panning") => Ok(Placement::Balanced(BalanceMode::GoldPanning)),
        Some(other) => Err(ApiError::invalid(format!("unknown strategy '{other}'"))),
    }
}

async fn plan(
    State(state): State<AppState>,
    payload: Option<Json<PlanPayload>>,
) -> Result<Json<PlanSummary>, ApiError> {
    let payload = payload.map(|Json(p)| p).unwrap_or_default();
    let placement = parse_strategy(payload.strategy.as_deref())?;
    let board = state.board();
    let outcome = {
        let mut guard = board.write();
        guard.plan(RunOptions { placement })?
    };
    Ok(Json(PlanSummary {
        tasks: outcome.tasks,
        unscheduled: outcome.unscheduled.into_iter().map(Into::into).collect(),
        trace: outcome.trace,
    }))
}
