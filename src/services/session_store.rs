use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, SessionStore};

/// In-process browser-session records that can be pruned once expired.
#[derive(Debug, Clone, Default)]
pub struct ExpiringMemoryStore(Arc<Mutex<HashMap<Id, Record>>>);

impl ExpiringMemoryStore {
    /// Drops records past their expiry; returns how many were removed.
    pub async fn prune_expired(&self) -> usize {
        let mut records = self.0.lock().await;
        let now = OffsetDateTime::now_utc();
        let before = records.len();
        records.retain(|_, record| record.expiry_date > now);
        before - records.len()
    }

    pub async fn len(&self) -> usize {
        self.0.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for ExpiringMemoryStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut records = self.0.lock().await;
        while records.contains_key(&record.id) {
            record.id = Id::default();
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.0.lock().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let now = OffsetDateTime::now_utc();
        Ok(self
            .0
            .lock()
            .await
            .get(session_id)
            .filter(|record| record.expiry_date > now)
            .cloned())
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.0.lock().await.remove(session_id);
        Ok(())
    }
}

/// Periodically prunes expired session records until the runtime shuts down.
pub fn spawn_session_pruner(store: ExpiringMemoryStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let pruned = store.prune_expired().await;
            if pruned > 0 {
                tracing::info!("Pruned {} expired session(s)", pruned);
            }
        }
    })
}
