#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use pikpak_web::config::{Config, Mode};
use pikpak_web::errors::{UpstreamError, UpstreamResult};
use pikpak_web::services::{ClientFactory, Database, PikPakApi, UserInfo};
use pikpak_web::{build_router, AppState};

pub const USERNAME: &str = "u";
pub const PASSWORD: &str = "p";
pub const SERVICE_USERNAME: &str = "svc";
pub const SERVICE_PASSWORD: &str = "svc-pass";

/// In-memory stand-in for a PikPak account. Counts every API call so tests
/// can assert that rejected requests never reached upstream.
#[derive(Default)]
pub struct FakePikPak {
    pub calls: AtomicUsize,
    pub deletes: AtomicUsize,
    pub retries: AtomicUsize,
    pub trashes: AtomicUsize,
    pub url_lookups: AtomicUsize,
    tasks: Mutex<Vec<Value>>,
    files: Mutex<HashMap<String, Value>>,
    download_urls: Mutex<HashMap<String, Value>>,
}

impl FakePikPak {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn add_file(&self, id: &str, parent_id: &str, extra: Value) {
        let mut file = json!({ "id": id, "parent_id": parent_id, "kind": "drive#file" });
        if let (Some(file), Value::Object(extra)) = (file.as_object_mut(), extra) {
            file.extend(extra);
        }
        self.files.lock().unwrap().insert(id.to_string(), file);
    }

    pub fn set_download_url(&self, file_id: &str, response: Value) {
        self.download_urls
            .lock()
            .unwrap()
            .insert(file_id.to_string(), response);
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn not_found(what: &str) -> UpstreamError {
        UpstreamError::Api {
            status: 404,
            message: format!("{} not found", what),
        }
    }
}

#[async_trait]
impl PikPakApi for FakePikPak {
    fn user_info(&self) -> UserInfo {
        UserInfo {
            username: USERNAME.to_string(),
            user_id: "upstream-user-1".to_string(),
        }
    }

    async fn offline_download(
        &self,
        file_url: &str,
        parent_id: Option<&str>,
        name: Option<&str>,
    ) -> UpstreamResult<Value> {
        self.touch();
        let mut tasks = self.tasks.lock().unwrap();
        let task = json!({
            "id": format!("task-{}", tasks.len() + 1),
            "name": name.unwrap_or(file_url),
            "phase": "PHASE_TYPE_RUNNING",
            "parent_id": parent_id.unwrap_or(""),
        });
        tasks.push(task.clone());
        Ok(json!({ "task": task }))
    }

    async fn offline_list(&self, _phase: Option<&[String]>) -> UpstreamResult<Value> {
        self.touch();
        let tasks = self.tasks.lock().unwrap().clone();
        Ok(json!({ "tasks": tasks, "next_page_token": "" }))
    }

    async fn delete_tasks(&self, task_ids: &[String], _delete_files: bool) -> UpstreamResult<()> {
        self.touch();
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().unwrap().retain(|task| {
            !task_ids
                .iter()
                .any(|id| task["id"].as_str() == Some(id.as_str()))
        });
        Ok(())
    }

    async fn offline_task_retry(&self, task_id: &str) -> UpstreamResult<Value> {
        self.touch();
        self.retries.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "id": task_id, "phase": "PHASE_TYPE_RUNNING" }))
    }

    async fn file_list(&self, parent_id: Option<&str>, _: Option<&str>) -> UpstreamResult<Value> {
        self.touch();
        let parent = parent_id.unwrap_or("");
        let files: Vec<Value> = self
            .files
            .lock()
            .unwrap()
            .values()
            .filter(|f| f["parent_id"].as_str() == Some(parent))
            .cloned()
            .collect();
        Ok(json!({ "files": files, "next_page_token": "" }))
    }

    async fn offline_file_info(&self, file_id: &str) -> UpstreamResult<Value> {
        self.touch();
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| Self::not_found("file"))
    }

    async fn get_download_url(&self, file_id: &str) -> UpstreamResult<Value> {
        self.touch();
        self.url_lookups.fetch_add(1, Ordering::SeqCst);
        self.download_urls
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| Self::not_found("file"))
    }

    async fn delete_to_trash(&self, ids: &[String]) -> UpstreamResult<Value> {
        self.touch();
        self.trashes.fetch_add(1, Ordering::SeqCst);
        Ok(json!({ "trashed": ids }))
    }

    async fn get_quota_info(&self) -> UpstreamResult<Value> {
        self.touch();
        Ok(json!({ "quota": { "limit": "10995116277760", "usage": "1024" } }))
    }

    async fn create_folder(&self, name: &str, parent_id: Option<&str>) -> UpstreamResult<Value> {
        self.touch();
        let id = format!("folder-{}", name);
        self.add_file(&id, parent_id.unwrap_or(""), json!({ "name": name, "kind": "drive#folder" }));
        Ok(json!({ "file": { "id": id, "name": name } }))
    }
}

/// Hands out the one fake account for either the per-user or the service
/// credentials.
pub struct FakeFactory {
    pub client: Arc<FakePikPak>,
    pub logins: AtomicUsize,
}

#[async_trait]
impl ClientFactory for FakeFactory {
    async fn login(&self, username: &str, password: &str) -> UpstreamResult<Arc<dyn PikPakApi>> {
        self.logins.fetch_add(1, Ordering::SeqCst);
        let valid = (username == USERNAME && password == PASSWORD)
            || (username == SERVICE_USERNAME && password == SERVICE_PASSWORD);
        if !valid {
            return Err(UpstreamError::Api {
                status: 400,
                message: "Invalid username or password".into(),
            });
        }
        Ok(self.client.clone())
    }
}

pub struct TestApp {
    pub router: Router,
    pub fake: Arc<FakePikPak>,
    pub factory: Arc<FakeFactory>,
}

fn test_config(mode: Mode) -> Config {
    let mut config = Config::defaults().expect("default config");
    config.app.mode = mode;
    config.auth.bcrypt_cost = 4;
    if mode == Mode::MultiTenant {
        config.pikpak.username = SERVICE_USERNAME.into();
        config.pikpak.password = SERVICE_PASSWORD.into();
    }
    config
}

pub fn spawn_app(mode: Mode) -> TestApp {
    let fake = Arc::new(FakePikPak::default());
    let factory = Arc::new(FakeFactory {
        client: fake.clone(),
        logins: AtomicUsize::new(0),
    });
    let db = match mode {
        Mode::MultiTenant => Some(Database::open_in_memory().expect("in-memory database")),
        Mode::Session => None,
    };
    let state = AppState::new(test_config(mode), factory.clone(), db).expect("app state");
    TestApp {
        router: build_router(state),
        fake,
        factory,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub cookie: Option<String>,
    pub headers: axum::http::HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("JSON body")
    }
}

impl TestApp {
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        collect(response).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, None, cookie).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request(Method::POST, uri, Some(body), cookie).await
    }

    /// Logs in and returns the `name=value` cookie pair to replay.
    pub async fn login(&self, username: &str, password: &str) -> String {
        let response = self
            .post(
                "/api/login",
                json!({ "username": username, "password": password }),
                None,
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "login failed: {:?}", response.json());
        response.cookie.expect("login sets a session cookie")
    }

    pub async fn register(&self, username: &str, password: &str) -> TestResponse {
        self.post(
            "/api/register",
            json!({ "username": username, "password": password }),
            None,
        )
        .await
    }
}

async fn collect(response: Response<Body>) -> TestResponse {
    let status = response.status();
    let headers = response.headers().clone();
    let cookie = headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    TestResponse {
        status,
        cookie,
        headers,
        body,
    }
}
