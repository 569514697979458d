use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::{StoreError, StoreResult};
use crate::models::{NewTask, NewUser, Task, User};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    username         TEXT    NOT NULL UNIQUE,
    password_hash    TEXT    NOT NULL,
    pikpak_folder_id TEXT,
    created_at       TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id        INTEGER NOT NULL REFERENCES users(id),
    pikpak_task_id TEXT    NOT NULL,
    name           TEXT,
    status         TEXT    NOT NULL DEFAULT 'pending',
    created_at     TEXT    NOT NULL
);
"#;

const USER_COLUMNS: &str = "id, username, password_hash, pikpak_folder_id, created_at";
const TASK_COLUMNS: &str = "id, user_id, pikpak_task_id, name, status, created_at";

/// SQLite-backed user and task tables. Cloning shares the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database file and its schema.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        tracing::info!("Opening database at {}", path.display());
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against this database on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Database) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn create_user(&self, user: &NewUser<'_>) -> StoreResult<User> {
        let conn = self.conn()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO users (username, password_hash, pikpak_folder_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user.username,
                user.password_hash,
                user.pikpak_folder_id,
                created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::DuplicateUsername
            }
            other => StoreError::Sqlite(other),
        })?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: user.username.to_string(),
            password_hash: user.password_hash.to_string(),
            pikpak_folder_id: user.pikpak_folder_id.map(str::to_string),
            created_at,
        })
    }

    pub fn find_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1"),
                params![username],
                row_to_user,
            )
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    pub fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()?;
        raw.map(RawUser::into_user).transpose()
    }

    pub fn create_task(&self, task: &NewTask<'_>) -> StoreResult<Task> {
        let conn = self.conn()?;
        let created_at = Utc::now();
        conn.execute(
            "INSERT INTO tasks (user_id, pikpak_task_id, name, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                task.user_id,
                task.pikpak_task_id,
                task.name,
                task.status,
                created_at.to_rfc3339(),
            ],
        )?;

        Ok(Task {
            id: conn.last_insert_rowid(),
            user_id: task.user_id,
            pikpak_task_id: task.pikpak_task_id.to_string(),
            name: task.name.map(str::to_string),
            status: task.status.to_string(),
            created_at,
        })
    }

    /// Newest first.
    pub fn list_tasks_for_user(&self, user_id: i64) -> StoreResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ))?;
        let rows = stmt.query_map(params![user_id], row_to_task)?;
        rows.map(|row| row.map_err(StoreError::from).and_then(RawTask::into_task))
            .collect()
    }

    pub fn find_task_for_user(
        &self,
        user_id: i64,
        pikpak_task_id: &str,
    ) -> StoreResult<Option<Task>> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = ?1 AND pikpak_task_id = ?2"
                ),
                params![user_id, pikpak_task_id],
                row_to_task,
            )
            .optional()?;
        raw.map(RawTask::into_task).transpose()
    }

    pub fn delete_task(&self, id: i64) -> StoreResult<bool> {
        let affected = self
            .conn()?
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }
}

// Rows are read with the timestamp still as text so the closure passed to
// rusqlite stays infallible beyond column access.
struct RawUser {
    id: i64,
    username: String,
    password_hash: String,
    pikpak_folder_id: Option<String>,
    created_at: String,
}

impl RawUser {
    fn into_user(self) -> StoreResult<User> {
        Ok(User {
            id: self.id,
            username: self.username,
            password_hash: self.password_hash,
            pikpak_folder_id: self.pikpak_folder_id,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct RawTask {
    id: i64,
    user_id: i64,
    pikpak_task_id: String,
    name: Option<String>,
    status: String,
    created_at: String,
}

impl RawTask {
    fn into_task(self) -> StoreResult<Task> {
        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            pikpak_task_id: self.pikpak_task_id,
            name: self.name,
            status: self.status,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
    Ok(RawUser {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        pikpak_folder_id: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTask> {
    Ok(RawTask {
        id: row.get(0)?,
        user_id: row.get(1)?,
        pikpak_task_id: row.get(2)?,
        name: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
