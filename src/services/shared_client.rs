use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::errors::{UpstreamError, UpstreamResult};
use crate::services::pikpak::{ClientFactory, PikPakApi};

/// The service-account client used by every local user in multi-tenant mode.
///
/// Signs in on first use; a failed sign-in is not cached.
pub struct SharedClient {
    factory: Arc<dyn ClientFactory>,
    username: String,
    password: String,
    client: OnceCell<Arc<dyn PikPakApi>>,
}

impl SharedClient {
    pub fn new(factory: Arc<dyn ClientFactory>, username: String, password: String) -> Self {
        Self {
            factory,
            username,
            password,
            client: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> UpstreamResult<Arc<dyn PikPakApi>> {
        if self.username.is_empty() || self.password.is_empty() {
            return Err(UpstreamError::Auth("PikPak service account is not configured".into()));
        }

        self.client
            .get_or_try_init(|| async {
                tracing::info!("Signing in PikPak service account");
                self.factory.login(&self.username, &self.password).await
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::pikpak::UserInfo;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NamedClient(String);

    #[async_trait]
    impl PikPakApi for NamedClient {
        fn user_info(&self) -> UserInfo {
            UserInfo {
                username: self.0.clone(),
                user_id: format!("{}-id", self.0),
            }
        }
        async fn offline_download(&self, _: &str, _: Option<&str>, _: Option<&str>) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn offline_list(&self, _: Option<&[String]>) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn delete_tasks(&self, _: &[String], _: bool) -> UpstreamResult<()> {
            Ok(())
        }
        async fn offline_task_retry(&self, _: &str) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn file_list(&self, _: Option<&str>, _: Option<&str>) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn offline_file_info(&self, _: &str) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn get_download_url(&self, _: &str) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn delete_to_trash(&self, _: &[String]) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn get_quota_info(&self) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
        async fn create_folder(&self, _: &str, _: Option<&str>) -> UpstreamResult<Value> {
            Ok(Value::Null)
        }
    }

    /// Fails the first `failures` logins, then succeeds.
    struct CountingFactory {
        logins: AtomicUsize,
        failures: usize,
    }

    #[async_trait]
    impl ClientFactory for CountingFactory {
        async fn login(&self, username: &str, _: &str) -> UpstreamResult<Arc<dyn PikPakApi>> {
            let attempt = self.logins.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(UpstreamError::Auth("captcha required".into()));
            }
            Ok(Arc::new(NamedClient(username.to_string())))
        }
    }

    #[tokio::test]
    async fn signs_in_once_and_reuses_client() {
        let factory = Arc::new(CountingFactory {
            logins: AtomicUsize::new(0),
            failures: 0,
        });
        let shared = SharedClient::new(factory.clone(), "svc".into(), "secret".into());

        let first = shared.get().await.unwrap();
        let second = shared.get().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.user_info().username, "svc");
        assert_eq!(factory.logins.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_sign_in_is_retried_on_next_use() {
        let factory = Arc::new(CountingFactory {
            logins: AtomicUsize::new(0),
            failures: 1,
        });
        let shared = SharedClient::new(factory.clone(), "svc".into(), "secret".into());

        let err = shared.get().await.err().expect("first sign-in fails");
        assert_eq!(err.to_string(), "captcha required");
        assert!(shared.get().await.is_ok());
        assert_eq!(factory.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn missing_credentials_never_reach_upstream() {
        let factory = Arc::new(CountingFactory {
            logins: AtomicUsize::new(0),
            failures: 0,
        });
        let shared = SharedClient::new(factory.clone(), String::new(), String::new());

        assert!(shared.get().await.is_err());
        assert_eq!(factory.logins.load(Ordering::SeqCst), 0);
    }
}
