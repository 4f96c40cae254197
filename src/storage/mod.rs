use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::Error;

pub mod memory;
pub mod mongo;

pub use memory::{MemoryStorage, MemoryStorageProvider};
pub use mongo::{MongoStorage, MongoStorageProvider};

/// The key-value area of a single browser session. Values are whole
/// strings; every write replaces the previous value for its key.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error>;

    async fn set_item(&self, key: &str, value: &str) -> Result<(), Error>;

    async fn remove_item(&self, key: &str) -> Result<(), Error>;

    /// Removes every key of this session.
    async fn clear(&self) -> Result<(), Error>;

    /// Shared by every handle on the same scope. Hold it across a
    /// read-modify-write so concurrent requests cannot drop each other's
    /// writes.
    fn scope_lock(&self) -> &Mutex<()>;
}

/// Hands out the storage area for a scope, the opaque per-tab token the
/// widget sends with every request.
pub trait StorageProvider: Send + Sync {
    fn open(&self, scope: &str) -> Arc<dyn SessionStorage>;
}
