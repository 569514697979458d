use axum::{
    extract::Path,
    response::Json,
    Extension,
};
use axum_extra::extract::Query;
use serde_json::{json, Value};

use crate::errors::{AppError, AppResult};
use crate::handlers::extract::JsonBody;
use crate::handlers::scope;
use crate::middleware::Caller;
use crate::models::{present, FileListQuery, TrashForm};

pub async fn list_files(
    Extension(caller): Extension<Caller>,
    Query(query): Query<FileListQuery>,
) -> AppResult<Json<Value>> {
    let parent_id = scope::resolve_parent(&caller, present(query.parent_id)).await?;
    let page_token = present(query.page_token);

    tracing::debug!("Listing files under {:?}", parent_id);
    let result = caller
        .client
        .file_list(parent_id.as_deref(), page_token.as_deref())
        .await?;
    Ok(Json(result))
}

pub async fn file_info(
    Extension(caller): Extension<Caller>,
    Path(file_id): Path<String>,
) -> AppResult<Json<Value>> {
    scope::ensure_file_visible(&caller, &file_id).await?;
    Ok(Json(caller.client.offline_file_info(&file_id).await?))
}

pub async fn download_url(
    Extension(caller): Extension<Caller>,
    Path(file_id): Path<String>,
) -> AppResult<Json<Value>> {
    scope::ensure_file_visible(&caller, &file_id).await?;
    Ok(Json(caller.client.get_download_url(&file_id).await?))
}

pub async fn trash_files(
    Extension(caller): Extension<Caller>,
    JsonBody(form): JsonBody<TrashForm>,
) -> AppResult<Json<Value>> {
    if form.ids.is_empty() {
        return Err(AppError::BadRequest("File IDs required".into()));
    }
    for id in &form.ids {
        scope::ensure_file_removable(&caller, id).await?;
    }

    let result = caller.client.delete_to_trash(&form.ids).await?;

    tracing::info!("Moved {} file(s) to trash", form.ids.len());
    Ok(Json(json!({
        "success": true,
        "result": result,
    })))
}

pub async fn quota(Extension(caller): Extension<Caller>) -> AppResult<Json<Value>> {
    Ok(Json(caller.client.get_quota_info().await?))
}
