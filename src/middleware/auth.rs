use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_sessions::Session;

use crate::config::Mode;
use crate::errors::{AppError, AppResult};
use crate::models::User;
use crate::services::PikPakApi;
use crate::state::AppState;

/// Session key holding the upstream-client token (session mode).
pub const CLIENT_TOKEN_KEY: &str = "session_id";
/// Session key holding the local user id (multi-tenant mode).
pub const USER_ID_KEY: &str = "user_id";

const PUBLIC_PATHS: [&str; 3] = ["/api/login", "/api/logout", "/api/register"];

/// The authenticated caller, attached to every protected request.
#[derive(Clone)]
pub struct Caller {
    pub client: Arc<dyn PikPakApi>,
    /// Present in multi-tenant mode.
    pub user: Option<User>,
}

impl Caller {
    pub fn folder_id(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.pikpak_folder_id.as_deref())
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    session: Session,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path();
    if !path.starts_with("/api/") || PUBLIC_PATHS.contains(&path) {
        return next.run(req).await;
    }

    match resolve_caller(&state, &session).await {
        Ok(caller) => {
            req.extensions_mut().insert(caller);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    }
}

// Session and user checks come first so an anonymous request never reaches
// the upstream client.
async fn resolve_caller(state: &AppState, session: &Session) -> AppResult<Caller> {
    match state.mode() {
        Mode::Session => {
            let token = session
                .get::<String>(CLIENT_TOKEN_KEY)
                .await?
                .ok_or_else(|| AppError::Auth("Not authenticated".into()))?;
            let client = state
                .clients
                .get(&token)
                .await
                .ok_or_else(|| AppError::Auth("Not authenticated".into()))?;
            Ok(Caller { client, user: None })
        }
        Mode::MultiTenant => {
            let user_id = session
                .get::<i64>(USER_ID_KEY)
                .await?
                .ok_or_else(|| AppError::Auth("Not authenticated".into()))?;
            let user = state
                .database()?
                .run(move |db| db.find_user_by_id(user_id))
                .await?
                .ok_or_else(|| AppError::Auth("Not authenticated".into()))?;
            let client = state.shared.get().await?;
            Ok(Caller {
                client,
                user: Some(user),
            })
        }
    }
}
