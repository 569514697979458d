// Per-user isolation for multi-tenant mode. A caller without a local user
// (session mode) owns their whole PikPak account and passes every check.
use serde_json::Value;

use crate::errors::{AppError, AppResult};
use crate::middleware::Caller;

// Deepest folder nesting followed when checking that a file sits inside the
// caller's folder.
const MAX_FOLDER_DEPTH: usize = 32;

fn file_not_found() -> AppError {
    AppError::NotFound("File not found".into())
}

/// Succeeds when `file_id` is the caller's folder or lies beneath it.
pub async fn ensure_file_visible(caller: &Caller, file_id: &str) -> AppResult<()> {
    if caller.user.is_none() {
        return Ok(());
    }
    let folder_id = caller.folder_id().ok_or_else(file_not_found)?;

    let mut current = file_id.to_string();
    for _ in 0..MAX_FOLDER_DEPTH {
        if current == folder_id {
            return Ok(());
        }
        let info = caller.client.offline_file_info(&current).await?;
        match info
            .get("parent_id")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
        {
            Some(parent) => current = parent.to_string(),
            None => break,
        }
    }

    tracing::warn!("File {} is outside the caller's folder", file_id);
    Err(file_not_found())
}

/// Like [`ensure_file_visible`], but the caller's own folder is excluded so
/// it can never be trashed out from under them.
pub async fn ensure_file_removable(caller: &Caller, file_id: &str) -> AppResult<()> {
    if caller.folder_id() == Some(file_id) {
        tracing::warn!("Refusing to remove the caller's root folder {}", file_id);
        return Err(file_not_found());
    }
    ensure_file_visible(caller, file_id).await
}

/// The folder a listing or download should target.
///
/// Without a local user the requested parent is used as-is. With one, the
/// requested parent must be visible, and absence means the user's folder.
pub async fn resolve_parent(caller: &Caller, requested: Option<String>) -> AppResult<Option<String>> {
    if caller.user.is_none() {
        return Ok(requested);
    }
    match requested {
        Some(parent_id) => {
            ensure_file_visible(caller, &parent_id).await?;
            Ok(Some(parent_id))
        }
        None => caller
            .folder_id()
            .map(|id| Some(id.to_string()))
            .ok_or_else(file_not_found),
    }
}
