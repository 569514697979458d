use serde::Deserialize;

// Fields are optional so that absence yields a 400 from the handler rather
// than a deserialisation rejection.

#[derive(Debug, Deserialize, Default)]
pub struct LoginForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RegisterForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DownloadForm {
    pub url: Option<String>,
    pub parent_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TrashForm {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TaskListQuery {
    #[serde(default)]
    pub phase: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct DeleteTaskQuery {
    pub delete_files: Option<String>,
}

impl DeleteTaskQuery {
    pub fn delete_files(&self) -> bool {
        self.delete_files
            .as_deref()
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct FileListQuery {
    pub parent_id: Option<String>,
    pub page_token: Option<String>,
}

/// Treats empty or whitespace-only strings as missing.
pub fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
