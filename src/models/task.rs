use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_TASK_STATUS: &str = "pending";

/// Local record tying a user to an upstream offline-download task.
///
/// `status` is the phase reported when the task was submitted; live status is
/// always read from upstream when tasks are listed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Task {
    pub id: i64,
    pub user_id: i64,
    pub pikpak_task_id: String,
    pub name: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

pub struct NewTask<'a> {
    pub user_id: i64,
    pub pikpak_task_id: &'a str,
    pub name: Option<&'a str>,
    pub status: &'a str,
}
