use std::collections::HashSet;

use axum::{
    extract::{Path, State},
    response::Json,
    Extension,
};
use axum_extra::extract::Query;
use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::handlers::extract::JsonBody;
use crate::handlers::scope;
use crate::middleware::Caller;
use crate::models::{
    present, DeleteTaskQuery, DownloadForm, NewTask, Task, TaskListQuery, User, DEFAULT_TASK_STATUS,
};
use crate::services::pikpak::ALL_PHASES;
use crate::state::AppState;

pub async fn add_download(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    JsonBody(form): JsonBody<DownloadForm>,
) -> AppResult<Json<Value>> {
    let url = present(form.url).ok_or_else(|| AppError::BadRequest("Magnet URL required".into()))?;
    let name = present(form.name);
    let parent_id = scope::resolve_parent(&caller, present(form.parent_id)).await?;

    let result = caller
        .client
        .offline_download(&url, parent_id.as_deref(), name.as_deref())
        .await?;

    if let Some(user) = &caller.user {
        record_task(&state, user, &result, name).await?;
    }

    let task_id = result
        .pointer("/task/id")
        .and_then(Value::as_str)
        .unwrap_or("<unknown>");
    tracing::info!("Submitted offline download {}", task_id);
    Ok(Json(json!({
        "success": true,
        "task": result,
    })))
}

// Keeps the local Task row that ties the upstream task to its owner.
async fn record_task(
    state: &AppState,
    user: &User,
    result: &Value,
    name: Option<String>,
) -> AppResult<()> {
    let task = result.get("task").unwrap_or(&Value::Null);
    let pikpak_task_id = task
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal("Upstream response missing task id".into()))?;
    let name = task
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(name);
    let status = task
        .get("phase")
        .and_then(Value::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_TASK_STATUS)
        .to_string();

    let user_id = user.id;
    let record = state
        .database()?
        .run(move |db| {
            db.create_task(&NewTask {
                user_id,
                pikpak_task_id: &pikpak_task_id,
                name: name.as_deref(),
                status: &status,
            })
        })
        .await?;
    tracing::debug!("Recorded task {} for user {}", record.pikpak_task_id, user.username);
    Ok(())
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<TaskListQuery>,
) -> AppResult<Json<Value>> {
    let Some(user) = &caller.user else {
        let phase = (!query.phase.is_empty()).then_some(query.phase.as_slice());
        return Ok(Json(caller.client.offline_list(phase).await?));
    };

    let user_id = user.id;
    let tasks = state
        .database()?
        .run(move |db| db.list_tasks_for_user(user_id))
        .await?;
    if tasks.is_empty() {
        return Ok(Json(json!({ "tasks": [], "next_page_token": "" })));
    }

    // The local table is the caller's task list, so every phase is fetched
    // unless specific ones were asked for.
    let phases: Vec<String> = if query.phase.is_empty() {
        ALL_PHASES.iter().map(|p| p.to_string()).collect()
    } else {
        query.phase
    };
    let mut listing = caller.client.offline_list(Some(&phases)).await?;

    let owned: HashSet<&str> = tasks.iter().map(|t| t.pikpak_task_id.as_str()).collect();
    retain_owned_tasks(&mut listing, &owned);

    tracing::debug!("Listed tasks for user {}", user.username);
    Ok(Json(listing))
}

/// Filters an upstream task listing down to `owned` ids, keeping its shape.
fn retain_owned_tasks(listing: &mut Value, owned: &HashSet<&str>) {
    let mut upstream = match listing.get_mut("tasks").map(Value::take) {
        Some(Value::Array(tasks)) => tasks,
        _ => Vec::new(),
    };
    upstream.retain(|task| {
        task.get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| owned.contains(id))
    });

    match listing.as_object_mut() {
        Some(object) => {
            object.insert("tasks".into(), Value::Array(upstream));
        }
        None => *listing = json!({ "tasks": upstream, "next_page_token": "" }),
    }
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(task_id): Path<String>,
    Query(query): Query<DeleteTaskQuery>,
) -> AppResult<Json<Value>> {
    let record = match &caller.user {
        Some(user) => Some(owned_task(&state, user, &task_id).await?),
        None => None,
    };

    let delete_files = query.delete_files();
    caller
        .client
        .delete_tasks(std::slice::from_ref(&task_id), delete_files)
        .await?;

    if let Some(record) = record {
        state
            .database()?
            .run(move |db| db.delete_task(record.id))
            .await?;
    }

    tracing::info!("Deleted task {} (delete_files={})", task_id, delete_files);
    Ok(Json(json!({ "success": true })))
}

// The caller's local record of `task_id`, or 404 when they never submitted it.
async fn owned_task(state: &AppState, user: &User, task_id: &str) -> AppResult<Task> {
    let user_id = user.id;
    let task_id = task_id.to_string();
    state
        .database()?
        .run(move |db| db.find_task_for_user(user_id, &task_id))
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".into()))
}

pub async fn retry_task(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(task_id): Path<String>,
) -> AppResult<Json<Value>> {
    if let Some(user) = &caller.user {
        owned_task(&state, user, &task_id).await?;
    }

    let result = caller.client.offline_task_retry(&task_id).await?;

    tracing::info!("Retried task {}", task_id);
    Ok(Json(json!({
        "success": true,
        "task": result,
    })))
}
