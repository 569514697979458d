mod auth;

pub use auth::{require_auth, Caller, CLIENT_TOKEN_KEY, USER_ID_KEY};
