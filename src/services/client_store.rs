use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::services::pikpak::PikPakApi;

/// Binds browser-session tokens to authenticated upstream clients.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Stores the client under a fresh random token and returns the token.
    async fn insert(&self, client: Arc<dyn PikPakApi>) -> String;

    async fn get(&self, token: &str) -> Option<Arc<dyn PikPakApi>>;

    async fn remove(&self, token: &str) -> bool;

    /// Drops idle bindings; returns how many were removed.
    async fn evict_expired(&self) -> usize;
}

struct Entry {
    client: Arc<dyn PikPakApi>,
    last_seen: Instant,
}

/// In-process store with an idle timeout. Every `get` renews the binding.
pub struct MemoryClientStore {
    entries: Mutex<HashMap<String, Entry>>,
    idle_timeout: Duration,
}

impl MemoryClientStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn is_idle(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.last_seen) >= self.idle_timeout
    }
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn insert(&self, client: Arc<dyn PikPakApi>) -> String {
        let token = uuid::Uuid::new_v4().to_string();
        let entry = Entry {
            client,
            last_seen: Instant::now(),
        };
        self.entries.lock().await.insert(token.clone(), entry);
        token
    }

    async fn get(&self, token: &str) -> Option<Arc<dyn PikPakApi>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();

        let idle = entries.get(token).map(|entry| self.is_idle(entry, now))?;
        if idle {
            entries.remove(token);
            tracing::debug!("Upstream client binding expired on access");
            return None;
        }

        let entry = entries.get_mut(token)?;
        entry.last_seen = now;
        Some(entry.client.clone())
    }

    async fn remove(&self, token: &str) -> bool {
        self.entries.lock().await.remove(token).is_some()
    }

    async fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !self.is_idle(entry, now));
        before - entries.len()
    }
}

/// Periodically evicts idle bindings until the runtime shuts down.
pub fn spawn_sweeper(store: Arc<dyn ClientStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = store.evict_expired().await;
            if evicted > 0 {
                tracing::info!("Evicted {} idle upstream client(s)", evicted);
            }
        }
    })
}
