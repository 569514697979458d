use axum::{extract::State, response::Json, Extension};
use bcrypt::{hash, verify};
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::config::Mode;
use crate::errors::{AppError, AppResult};
use crate::handlers::extract::JsonBody;
use crate::middleware::{Caller, CLIENT_TOKEN_KEY, USER_ID_KEY};
use crate::models::{present, LoginForm, NewUser, RegisterForm};
use crate::state::AppState;

// bcrypt at production cost takes long enough to stall a runtime worker.
async fn hash_blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> bcrypt::BcryptResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Password task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

fn credentials(username: Option<String>, password: Option<String>) -> AppResult<(String, String)> {
    match (present(username), present(password)) {
        (Some(username), Some(password)) => Ok((username, password)),
        _ => Err(AppError::BadRequest("Username and password required".into())),
    }
}

pub async fn handle_login(
    State(state): State<AppState>,
    session: Session,
    JsonBody(form): JsonBody<LoginForm>,
) -> AppResult<Json<Value>> {
    let (username, password) = credentials(form.username, form.password)?;

    match state.mode() {
        Mode::Session => login_upstream(&state, &session, &username, &password).await,
        Mode::MultiTenant => login_local(&state, &session, &username, &password).await,
    }
}

async fn login_upstream(
    state: &AppState,
    session: &Session,
    username: &str,
    password: &str,
) -> AppResult<Json<Value>> {
    let client = state.factory.login(username, password).await.map_err(|e| {
        tracing::warn!("PikPak login failed: {}", e);
        AppError::Auth(e.to_string())
    })?;

    // A second login from the same browser replaces the earlier binding.
    if let Some(previous) = session.get::<String>(CLIENT_TOKEN_KEY).await? {
        state.clients.remove(&previous).await;
    }

    let user_info = client.user_info();
    let token = state.clients.insert(client).await;
    session.cycle_id().await?;
    session.insert(CLIENT_TOKEN_KEY, token).await?;

    tracing::info!("User {} logged in", user_info.user_id);
    Ok(Json(json!({
        "success": true,
        "user": {
            "username": user_info.username,
            "user_id": user_info.user_id,
        }
    })))
}

async fn login_local(
    state: &AppState,
    session: &Session,
    username: &str,
    password: &str,
) -> AppResult<Json<Value>> {
    let invalid = || AppError::Auth("Invalid username or password".into());

    let name = username.to_string();
    let user = state
        .database()?
        .run(move |db| db.find_user_by_username(&name))
        .await?
        .ok_or_else(|| {
            tracing::info!("Login attempt for unknown user: {}", username);
            invalid()
        })?;

    let password = password.to_string();
    let password_hash = user.password_hash.clone();
    let valid = hash_blocking(move || verify(password, &password_hash)).await?;
    if !valid {
        tracing::info!("Invalid password for user: {}", username);
        return Err(invalid());
    }

    session.cycle_id().await?;
    session.insert(USER_ID_KEY, user.id).await?;

    tracing::info!("User {} logged in", user.username);
    Ok(Json(json!({
        "success": true,
        "user": {
            "username": user.username,
            "user_id": user.id,
        }
    })))
}

pub async fn handle_register(
    State(state): State<AppState>,
    JsonBody(form): JsonBody<RegisterForm>,
) -> AppResult<Json<Value>> {
    // Local accounts only exist in multi-tenant mode.
    if state.mode() != Mode::MultiTenant {
        return Err(AppError::NotFound("Not found".into()));
    }
    let (username, password) = credentials(form.username, form.password)?;
    let db = state.database()?.clone();

    let name = username.clone();
    if db.run(move |db| db.find_user_by_username(&name)).await?.is_some() {
        return Err(AppError::BadRequest("Username already exists".into()));
    }

    // Provision the user's folder first so a failed upstream call leaves no row.
    let client = state.shared.get().await?;
    let folder = client
        .create_folder(&username, state.config.pikpak.root_folder())
        .await?;
    let folder_id = folder
        .pointer("/file/id")
        .or_else(|| folder.get("id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal("Upstream response missing folder id".into()))?;

    let cost = state.config.auth.bcrypt_cost;
    let password_hash = hash_blocking(move || hash(password.as_bytes(), cost)).await?;

    let user = db
        .run(move |db| {
            db.create_user(&NewUser {
                username: &username,
                password_hash: &password_hash,
                pikpak_folder_id: Some(&folder_id),
            })
        })
        .await?;

    tracing::info!(
        "Registered user {} with folder {}",
        user.username,
        user.pikpak_folder_id.as_deref().unwrap_or_default()
    );
    Ok(Json(json!({
        "success": true,
        "user": {
            "id": user.id,
            "username": user.username,
        }
    })))
}

pub async fn handle_logout(State(state): State<AppState>, session: Session) -> AppResult<Json<Value>> {
    if let Some(token) = session.get::<String>(CLIENT_TOKEN_KEY).await? {
        state.clients.remove(&token).await;
    }
    session.flush().await?;

    Ok(Json(json!({ "success": true })))
}

pub async fn current_user(Extension(caller): Extension<Caller>) -> Json<Value> {
    match &caller.user {
        Some(user) => Json(json!({
            "username": user.username,
            "user_id": user.id,
            "folder_id": user.pikpak_folder_id,
        })),
        None => {
            let info = caller.client.user_info();
            Json(json!({
                "username": info.username,
                "user_id": info.user_id,
            }))
        }
    }
}
