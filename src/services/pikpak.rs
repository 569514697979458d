//! PikPak auth/drive API client.
//!
//! Handlers only see the [`PikPakApi`] and [`ClientFactory`] traits; the
//! concrete [`PikPakClient`] speaks HTTP through `reqwest`. Drive responses are
//! returned as raw JSON so they can be relayed to the browser unchanged.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::config::PikPakConfig;
use crate::errors::{UpstreamError, UpstreamResult};

/// Phases listed when the caller does not ask for specific ones.
pub const DEFAULT_PHASES: [&str; 2] = ["PHASE_TYPE_RUNNING", "PHASE_TYPE_ERROR"];

pub const ALL_PHASES: [&str; 4] = [
    "PHASE_TYPE_PENDING",
    "PHASE_TYPE_RUNNING",
    "PHASE_TYPE_ERROR",
    "PHASE_TYPE_COMPLETE",
];

// Renew the access token this long before PikPak would reject it.
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct UserInfo {
    pub username: String,
    pub user_id: String,
}

/// Operations the HTTP layer performs against an authenticated account.
#[async_trait]
pub trait PikPakApi: Send + Sync {
    /// Account identity captured at login; no network call.
    fn user_info(&self) -> UserInfo;

    async fn offline_download(
        &self,
        file_url: &str,
        parent_id: Option<&str>,
        name: Option<&str>,
    ) -> UpstreamResult<Value>;

    /// `None` lists running and failed tasks.
    async fn offline_list(&self, phase: Option<&[String]>) -> UpstreamResult<Value>;

    async fn delete_tasks(&self, task_ids: &[String], delete_files: bool) -> UpstreamResult<()>;

    async fn offline_task_retry(&self, task_id: &str) -> UpstreamResult<Value>;

    async fn file_list(
        &self,
        parent_id: Option<&str>,
        next_page_token: Option<&str>,
    ) -> UpstreamResult<Value>;

    async fn offline_file_info(&self, file_id: &str) -> UpstreamResult<Value>;

    async fn get_download_url(&self, file_id: &str) -> UpstreamResult<Value>;

    async fn delete_to_trash(&self, ids: &[String]) -> UpstreamResult<Value>;

    async fn get_quota_info(&self) -> UpstreamResult<Value>;

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> UpstreamResult<Value>;
}

/// Produces authenticated clients from account credentials.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> UpstreamResult<Arc<dyn PikPakApi>>;
}

#[derive(Debug, Clone)]
struct Endpoints {
    auth_base_url: String,
    drive_base_url: String,
    client_id: String,
    client_secret: String,
}

impl Endpoints {
    fn auth(&self, path: &str) -> String {
        format!("{}{}", self.auth_base_url.trim_end_matches('/'), path)
    }

    fn drive(&self, path: &str) -> String {
        format!("{}{}", self.drive_base_url.trim_end_matches('/'), path)
    }
}

/// [`ClientFactory`] backed by the real PikPak service.
pub struct PikPakConnector {
    http: reqwest::Client,
    endpoints: Arc<Endpoints>,
}

impl PikPakConnector {
    pub fn new(config: &PikPakConfig) -> UpstreamResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            endpoints: Arc::new(Endpoints {
                auth_base_url: config.auth_base_url.clone(),
                drive_base_url: config.drive_base_url.clone(),
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.clone(),
            }),
        })
    }
}

#[async_trait]
impl ClientFactory for PikPakConnector {
    async fn login(&self, username: &str, password: &str) -> UpstreamResult<Arc<dyn PikPakApi>> {
        let client =
            PikPakClient::login(self.http.clone(), self.endpoints.clone(), username, password)
                .await?;
        Ok(Arc::new(client))
    }
}

#[derive(Debug, Clone)]
struct Token {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    fn from_grant(grant: TokenGrant, now: DateTime<Utc>) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at: now + chrono::Duration::seconds(grant.expires_in),
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now + chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS) >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: i64,
    #[serde(default)]
    sub: String,
}

#[derive(Debug, Deserialize)]
struct CaptchaInit {
    #[serde(default)]
    captcha_token: Option<String>,
}

/// An authenticated PikPak account.
pub struct PikPakClient {
    http: reqwest::Client,
    endpoints: Arc<Endpoints>,
    username: String,
    user_id: String,
    device_id: String,
    captcha_token: String,
    token: RwLock<Token>,
}

impl PikPakClient {
    async fn login(
        http: reqwest::Client,
        endpoints: Arc<Endpoints>,
        username: &str,
        password: &str,
    ) -> UpstreamResult<Self> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(UpstreamError::Auth("Username and password required".into()));
        }

        let device_id = uuid::Uuid::new_v4().simple().to_string();
        let signin_url = endpoints.auth("/v1/auth/signin");

        let meta = if username.contains('@') {
            json!({ "email": username })
        } else {
            json!({ "username": username })
        };
        let captcha = http
            .post(endpoints.auth("/v1/shield/captcha/init"))
            .header("x-device-id", &device_id)
            .json(&json!({
                "client_id": endpoints.client_id,
                "action": format!("POST:{}", signin_url),
                "device_id": device_id,
                "meta": meta,
            }))
            .send()
            .await?;
        let captcha: CaptchaInit = decode_as(captcha).await?;
        let captcha_token = captcha.captcha_token.unwrap_or_default();

        let signin = http
            .post(&signin_url)
            .header("x-device-id", &device_id)
            .json(&json!({
                "client_id": endpoints.client_id,
                "client_secret": endpoints.client_secret,
                "username": username,
                "password": password,
                "captcha_token": captcha_token,
            }))
            .send()
            .await?;
        let grant: TokenGrant = decode_as(signin).await?;
        let user_id = grant.sub.clone();

        tracing::info!("Signed in to PikPak as user {}", user_id);

        Ok(Self {
            http,
            endpoints,
            username: username.to_string(),
            user_id,
            device_id,
            captcha_token,
            token: RwLock::new(Token::from_grant(grant, Utc::now())),
        })
    }

    async fn access_token(&self) -> UpstreamResult<String> {
        {
            let token = self.token.read().await;
            if !token.is_expired(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut token = self.token.write().await;
        // Another request may have renewed it while we waited for the lock.
        if token.is_expired(Utc::now()) {
            tracing::debug!("Refreshing PikPak access token for user {}", self.user_id);
            let response = self
                .http
                .post(self.endpoints.auth("/v1/auth/token"))
                .header("x-device-id", &self.device_id)
                .json(&json!({
                    "client_id": self.endpoints.client_id,
                    "refresh_token": token.refresh_token,
                    "grant_type": "refresh_token",
                }))
                .send()
                .await?;
            let grant: TokenGrant = decode_as(response).await?;
            *token = Token::from_grant(grant, Utc::now());
        }
        Ok(token.access_token.clone())
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> UpstreamResult<Value> {
        let access_token = self.access_token().await?;
        let mut request = self
            .http
            .request(method, self.endpoints.drive(path))
            .bearer_auth(access_token)
            .header("x-device-id", &self.device_id)
            .query(query);
        if !self.captcha_token.is_empty() {
            request = request.header("x-captcha-token", &self.captcha_token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        decode(request.send().await?).await
    }
}

#[async_trait]
impl PikPakApi for PikPakClient {
    fn user_info(&self) -> UserInfo {
        UserInfo {
            username: self.username.clone(),
            user_id: self.user_id.clone(),
        }
    }

    async fn offline_download(
        &self,
        file_url: &str,
        parent_id: Option<&str>,
        name: Option<&str>,
    ) -> UpstreamResult<Value> {
        let folder_type = if parent_id.is_some() { "" } else { "DOWNLOAD" };
        let mut body = json!({
            "kind": "drive#file",
            "upload_type": "UPLOAD_TYPE_URL",
            "url": { "url": file_url },
            "folder_type": folder_type,
        });
        if let Some(parent_id) = parent_id {
            body["parent_id"] = json!(parent_id);
        }
        if let Some(name) = name {
            body["name"] = json!(name);
        }
        self.call(Method::POST, "/drive/v1/files", &[], Some(body)).await
    }

    async fn offline_list(&self, phase: Option<&[String]>) -> UpstreamResult<Value> {
        let phases = match phase {
            Some(phases) if !phases.is_empty() => phases.join(","),
            _ => DEFAULT_PHASES.join(","),
        };
        let filters = json!({ "phase": { "in": phases } }).to_string();
        let query = [
            ("type", "offline".to_string()),
            ("thumbnail_size", "SIZE_SMALL".to_string()),
            ("limit", "10000".to_string()),
            ("next_page_token", String::new()),
            ("filters", filters),
            ("with", "reference_resource".to_string()),
        ];
        self.call(Method::GET, "/drive/v1/tasks", &query, None).await
    }

    async fn delete_tasks(&self, task_ids: &[String], delete_files: bool) -> UpstreamResult<()> {
        let mut query: Vec<(&str, String)> =
            task_ids.iter().map(|id| ("task_ids", id.clone())).collect();
        query.push(("delete_files", delete_files.to_string()));
        self.call(Method::DELETE, "/drive/v1/tasks", &query, None)
            .await
            .map(|_| ())
    }

    async fn offline_task_retry(&self, task_id: &str) -> UpstreamResult<Value> {
        let body = json!({ "type": "offline", "create_type": "RETRY", "id": task_id });
        self.call(Method::POST, "/drive/v1/task", &[], Some(body)).await
    }

    async fn file_list(
        &self,
        parent_id: Option<&str>,
        next_page_token: Option<&str>,
    ) -> UpstreamResult<Value> {
        let filters = json!({
            "trashed": { "eq": false },
            "phase": { "eq": "PHASE_TYPE_COMPLETE" },
        })
        .to_string();
        let mut query = vec![
            ("thumbnail_size", "SIZE_MEDIUM".to_string()),
            ("limit", "100".to_string()),
            ("with_audit", "true".to_string()),
            ("filters", filters),
        ];
        if let Some(parent_id) = parent_id {
            query.push(("parent_id", parent_id.to_string()));
        }
        if let Some(token) = next_page_token {
            query.push(("next_page_token", token.to_string()));
        }
        self.call(Method::GET, "/drive/v1/files", &query, None).await
    }

    async fn offline_file_info(&self, file_id: &str) -> UpstreamResult<Value> {
        let path = format!("/drive/v1/files/{}", urlencoding::encode(file_id));
        let query = [("thumbnail_size", "SIZE_LARGE".to_string())];
        self.call(Method::GET, &path, &query, None).await
    }

    async fn get_download_url(&self, file_id: &str) -> UpstreamResult<Value> {
        let path = format!("/drive/v1/files/{}", urlencoding::encode(file_id));
        let query = [
            ("_magic", "2021".to_string()),
            ("usage", "FETCH".to_string()),
            ("thumbnail_size", "SIZE_LARGE".to_string()),
        ];
        self.call(Method::GET, &path, &query, None).await
    }

    async fn delete_to_trash(&self, ids: &[String]) -> UpstreamResult<Value> {
        let body = json!({ "ids": ids });
        self.call(Method::POST, "/drive/v1/files:batchTrash", &[], Some(body))
            .await
    }

    async fn get_quota_info(&self) -> UpstreamResult<Value> {
        self.call(Method::GET, "/drive/v1/about", &[], None).await
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> UpstreamResult<Value> {
        let mut body = json!({ "kind": "drive#folder", "name": name });
        if let Some(parent_id) = parent_id {
            body["parent_id"] = json!(parent_id);
        }
        self.call(Method::POST, "/drive/v1/files", &[], Some(body)).await
    }
}

async fn decode(response: reqwest::Response) -> UpstreamResult<Value> {
    let status = response.status();
    let body = response.text().await?;
    interpret(status, &body)
}

async fn decode_as<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> UpstreamResult<T> {
    let value = decode(response).await?;
    serde_json::from_value(value).map_err(|e| UpstreamError::Decode(e.to_string()))
}

/// Turns a PikPak reply into JSON, or an error carrying PikPak's message.
///
/// PikPak sometimes answers 200 with an `error` field, so both the status and
/// the payload are checked.
fn interpret(status: StatusCode, body: &str) -> UpstreamResult<Value> {
    let value = serde_json::from_str::<Value>(body).ok();
    let reported = value.as_ref().and_then(error_message);

    if !status.is_success() || reported.is_some() {
        let message = reported.unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("PikPak request failed with status {}", status)
            } else {
                truncate(body)
            }
        });
        return Err(UpstreamError::Api {
            status: status.as_u16(),
            message,
        });
    }

    match value {
        Some(value) => Ok(value),
        None if body.trim().is_empty() => Ok(Value::Null),
        None => Err(UpstreamError::Decode(truncate(body))),
    }
}

fn error_message(value: &Value) -> Option<String> {
    value.get("error").and_then(Value::as_str).filter(|e| !e.is_empty())?;
    ["error_description", "error"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .map(str::to_string)
}

fn truncate(s: &str) -> String {
    const LIMIT: usize = 240;
    match s.char_indices().nth(LIMIT) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_expiry_includes_margin() {
        let now = Utc::now();
        let token = Token {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: now + chrono::Duration::seconds(TOKEN_EXPIRY_MARGIN_SECS + 30),
        };
        assert!(!token.is_expired(now));
        assert!(token.is_expired(now + chrono::Duration::seconds(31)));
    }

    #[test]
    fn success_body_is_passed_through() {
        let value = interpret(StatusCode::OK, r#"{"files":[],"next_page_token":""}"#).unwrap();
        assert_eq!(value["next_page_token"], "");
    }

    #[test]
    fn empty_success_body_is_null() {
        assert_eq!(interpret(StatusCode::OK, "").unwrap(), Value::Null);
    }

    #[test]
    fn error_description_is_preferred() {
        let body = r#"{"error":"invalid_grant","error_code":4002,"error_description":"Password is incorrect"}"#;
        match interpret(StatusCode::BAD_REQUEST, body) {
            Err(UpstreamError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Password is incorrect");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn error_field_on_ok_status_is_an_error() {
        let body = r#"{"error":"captcha_invalid","error_description":""}"#;
        match interpret(StatusCode::OK, body) {
            Err(UpstreamError::Api { message, .. }) => assert_eq!(message, "captcha_invalid"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn non_json_failure_keeps_body_text() {
        match interpret(StatusCode::BAD_GATEWAY, "upstream unavailable") {
            Err(UpstreamError::Api { message, .. }) => assert_eq!(message, "upstream unavailable"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let long = "下".repeat(300);
        let cut = truncate(&long);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 243);
    }
}
