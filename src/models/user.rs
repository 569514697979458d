use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A local account (multi-tenant mode). Each user owns one PikPak folder.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub pikpak_folder_id: Option<String>, // provisioned at registration
    pub created_at: DateTime<Utc>,
}

pub struct NewUser<'a> {
    pub username: &'a str,
    pub password_hash: &'a str,
    pub pikpak_folder_id: Option<&'a str>,
}
