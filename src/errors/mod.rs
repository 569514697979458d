// Error types for each layer and the HTTP-facing AppError they collapse into.
use thiserror::Error;

pub mod response;
pub mod store;
pub mod upstream;

pub use store::{StoreError, StoreResult};
pub use upstream::{UpstreamError, UpstreamResult};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    // Upstream messages reach the caller verbatim.
    #[error("{0}")]
    Upstream(#[from] UpstreamError),

    #[error("{0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;
