use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex as ScopeLock;

use crate::error::Error;

use super::{SessionStorage, StorageProvider};

/// How long a scope nobody asked for is kept before it is forgotten.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, String>>,
    lock: ScopeLock<()>,
}

impl MemoryStorage {
    pub fn new() -> MemoryStorage {
        MemoryStorage::default()
    }

    fn items(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // a panic while holding the lock cannot leave a torn value behind
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.items().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        self.items().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.items().remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.items().clear();
        Ok(())
    }

    fn scope_lock(&self) -> &ScopeLock<()> {
        &self.lock
    }
}

#[derive(Debug)]
struct ScopeEntry {
    storage: Arc<MemoryStorage>,
    last_used: Instant,
}

/// Keeps every scope in process memory. A scope that has not been opened
/// for `idle_ttl`, and that no request still holds, is dropped.
#[derive(Debug)]
pub struct MemoryStorageProvider {
    scopes: Mutex<HashMap<String, ScopeEntry>>,
    idle_ttl: Duration,
}

impl Default for MemoryStorageProvider {
    fn default() -> MemoryStorageProvider {
        MemoryStorageProvider::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl MemoryStorageProvider {
    pub fn new() -> MemoryStorageProvider {
        MemoryStorageProvider::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> MemoryStorageProvider {
        MemoryStorageProvider {
            scopes: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub fn scope_count(&self) -> usize {
        self.scopes().len()
    }

    fn scopes(&self) -> MutexGuard<'_, HashMap<String, ScopeEntry>> {
        self.scopes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageProvider for MemoryStorageProvider {
    fn open(&self, scope: &str) -> Arc<dyn SessionStorage> {
        let now = Instant::now();
        let idle_ttl = self.idle_ttl;
        let mut scopes = self.scopes();

        scopes.retain(|name, entry| {
            name == scope
                || Arc::strong_count(&entry.storage) > 1
                || now.duration_since(entry.last_used) < idle_ttl
        });

        let entry = scopes.entry(scope.to_owned()).or_insert_with(|| ScopeEntry {
            storage: Arc::new(MemoryStorage::new()),
            last_used: now,
        });
        entry.last_used = now;

        Arc::clone(&entry.storage) as Arc<dyn SessionStorage>
    }
}
