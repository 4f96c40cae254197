use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::options::ReplaceOptions;
use mongodb::{bson, Collection, Database};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as ScopeLock;

use crate::error::Error;

use super::{SessionStorage, StorageProvider};

const SESSION_STORAGE: &str = "session_storage";

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StorageEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub scope: String,
    pub key: String,
    pub value: String,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub modified_at: DateTime<Utc>,
}

fn entry_id(scope: &str, key: &str) -> String {
    format!("{}/{}", scope, key)
}

/// Server-held session storage; one document per (scope, key).
///
/// The scope lock serializes writers within this process only.
#[derive(Debug, Clone)]
pub struct MongoStorage {
    entries: Collection<StorageEntry>,
    scope: String,
    lock: Arc<ScopeLock<()>>,
}

#[async_trait]
impl SessionStorage for MongoStorage {
    #[tracing::instrument(skip(self), fields(scope = %self.scope))]
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        let entry = self
            .entries
            .find_one(bson::doc! { "_id": entry_id(&self.scope, key) }, None)
            .await?;

        Ok(entry.map(|entry| entry.value))
    }

    #[tracing::instrument(skip(self, value), fields(scope = %self.scope))]
    async fn set_item(&self, key: &str, value: &str) -> Result<(), Error> {
        let entry = StorageEntry {
            id: entry_id(&self.scope, key),
            scope: self.scope.clone(),
            key: key.to_owned(),
            value: value.to_owned(),
            modified_at: Utc::now(),
        };
        let options = ReplaceOptions::builder().upsert(true).build();

        self.entries
            .replace_one(bson::doc! { "_id": entry.id.as_str() }, &entry, options)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(scope = %self.scope))]
    async fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.entries
            .delete_one(bson::doc! { "_id": entry_id(&self.scope, key) }, None)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self), fields(scope = %self.scope))]
    async fn clear(&self) -> Result<(), Error> {
        self.entries
            .delete_many(bson::doc! { "scope": self.scope.as_str() }, None)
            .await?;

        Ok(())
    }

    fn scope_lock(&self) -> &ScopeLock<()> {
        &self.lock
    }
}

#[derive(Debug, Clone)]
pub struct MongoStorageProvider {
    entries: Collection<StorageEntry>,
    locks: Arc<Mutex<HashMap<String, Weak<ScopeLock<()>>>>>,
}

impl MongoStorageProvider {
    pub async fn initialize(db: Database) -> Result<MongoStorageProvider, Error> {
        db.run_command(
            bson::doc! {
                "createIndexes": SESSION_STORAGE,
                "indexes": [
                    { "key": { "scope": 1 }, "name": "by_scope" },
                ]
            },
            None,
        )
        .await?;

        Ok(MongoStorageProvider {
            entries: db.collection(SESSION_STORAGE),
            locks: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// The lock for `scope`, shared while any handle on the scope is alive.
    fn scope_lock(&self, scope: &str) -> Arc<ScopeLock<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|_, lock| lock.strong_count() > 0);

        if let Some(lock) = locks.get(scope).and_then(Weak::upgrade) {
            return lock;
        }

        let lock = Arc::new(ScopeLock::new(()));
        locks.insert(scope.to_owned(), Arc::downgrade(&lock));
        lock
    }
}

impl StorageProvider for MongoStorageProvider {
    fn open(&self, scope: &str) -> Arc<dyn SessionStorage> {
        Arc::new(MongoStorage {
            entries: self.entries.clone(),
            scope: scope.to_owned(),
            lock: self.scope_lock(scope),
        })
    }
}
