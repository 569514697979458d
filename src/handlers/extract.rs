use axum::extract::FromRequest;

use crate::errors::AppError;

/// `Json` whose rejections (bad syntax, wrong content type) become 400s.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct JsonBody<T>(pub T);
