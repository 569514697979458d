pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tower_sessions::cookie::{Key, SameSite};
use tower_sessions::{Expiry, SessionManagerLayer};

pub use crate::state::AppState;

const SESSION_COOKIE: &str = "session";
const KEY_CONTEXT: &str = "pikpak-torrent-web session cookie signing";

/// Stretches the configured secret to the 64 bytes a signing key needs.
fn signing_key(secret: &str) -> Key {
    let mut bytes = [0u8; 64];
    blake3::Hasher::new_derive_key(KEY_CONTEXT)
        .update(secret.as_bytes())
        .finalize_xof()
        .fill(&mut bytes);
    Key::from(&bytes)
}

/// The full HTTP surface: JSON API under `/api`, static files everywhere else.
pub fn build_router(state: AppState) -> Router {
    let session = &state.config.session;
    let session_layer = SessionManagerLayer::new(state.sessions.clone())
        .with_signed(signing_key(&session.secret_key))
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_name(SESSION_COOKIE)
        .with_expiry(Expiry::OnInactivity(time::Duration::seconds(
            i64::try_from(session.idle_timeout_secs).unwrap_or(i64::MAX),
        )));

    let api = Router::new()
        // Auth routes
        .route("/api/register", post(handlers::handle_register))
        .route("/api/login", post(handlers::handle_login))
        .route("/api/logout", post(handlers::handle_logout))
        .route("/api/user", get(handlers::current_user))
        // Task routes
        .route("/api/download", post(handlers::add_download))
        .route("/api/tasks", get(handlers::list_tasks))
        .route("/api/tasks/:task_id", delete(handlers::delete_task))
        .route("/api/tasks/:task_id/retry", post(handlers::retry_task))
        // File routes
        .route("/api/files", get(handlers::list_files))
        .route("/api/files/trash", post(handlers::trash_files))
        .route("/api/files/:file_id", get(handlers::file_info))
        .route("/api/files/:file_id/url", get(handlers::download_url))
        .route("/api/proxy/download/:file_id", get(handlers::proxy_download))
        .route("/api/quota", get(handlers::quota));

    api.fallback_service(ServeDir::new(&state.config.server.static_dir))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signing_key_is_stable_per_secret() {
        let a = signing_key("first secret");
        let b = signing_key("first secret");
        let c = signing_key("second secret");
        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }
}
