use thiserror::Error;

/// Failures talking to the PikPak auth/drive APIs.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{0}")]
    Http(#[from] reqwest::Error),

    /// A non-success reply; the message is PikPak's own description.
    #[error("{message}")]
    Api { status: u16, message: String },

    #[error("Invalid upstream response: {0}")]
    Decode(String),

    #[error("{0}")]
    Auth(String),
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;
