use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::identity::IdentityTriple;
use crate::session::{current_session_id, SessionId};
use crate::storage::SessionStorage;

use super::{ClosureAction, ClosureRecord};

pub const CLOSURES_KEY: &str = "insight_closures";

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
struct ClosureRecords {
    records: Vec<ClosureRecord>,
}

/// Session-lifetime record of closure outcomes.
///
/// Nothing here returns an error. Unreadable data is treated as "no
/// record" so a broken store can only ever let a banner through, never
/// hide one.
#[derive(Clone)]
pub struct ClosureStore {
    storage: Arc<dyn SessionStorage>,
}

impl ClosureStore {
    pub fn new(storage: Arc<dyn SessionStorage>) -> ClosureStore {
        ClosureStore { storage }
    }

    async fn load(&self) -> Option<ClosureRecords> {
        let value = match self.storage.get_item(CLOSURES_KEY).await {
            Ok(Some(value)) => value,
            Ok(None) => return Some(ClosureRecords::default()),
            Err(err) => {
                warn!("failed to read closure records: {}", err);
                return None;
            }
        };

        match serde_json::from_str(&value) {
            Ok(records) => Some(records),
            Err(err) => {
                warn!("failed to parse closure records: {}", err);
                None
            }
        }
    }

    async fn current_records(&self) -> (SessionId, Vec<ClosureRecord>) {
        let session_id = current_session_id(&*self.storage).await;
        let records = self
            .load()
            .await
            .unwrap_or_default()
            .records
            .into_iter()
            .filter(|record| record.session_id == session_id)
            .collect();

        (session_id, records)
    }

    /// Replaces whatever was recorded for `triple` in this session.
    #[tracing::instrument(skip(self))]
    pub async fn record_closure(
        &self,
        triple: &IdentityTriple,
        closure_count: u32,
        action: ClosureAction,
    ) {
        let session_id = current_session_id(&*self.storage).await;
        let _guard = self.storage.scope_lock().lock().await;
        // a corrupt list is overwritten rather than kept around
        let mut records = self.load().await.unwrap_or_default();

        records
            .records
            .retain(|record| !(record.session_id == session_id && record.is_for(triple)));
        records.records.push(ClosureRecord {
            campaign_id: triple.campaign_id().to_owned(),
            user_id: triple.user_id().to_owned(),
            company_id: triple.company_id().to_owned(),
            closure_count: closure_count.max(1),
            action,
            closed_at: Utc::now(),
            session_id,
        });

        let value = match serde_json::to_string(&records) {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to serialize closure records: {}", err);
                return;
            }
        };

        if let Err(err) = self.storage.set_item(CLOSURES_KEY, &value).await {
            warn!("failed to persist closure record: {}", err);
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_record(&self, triple: &IdentityTriple) -> Option<ClosureRecord> {
        let (_, records) = self.current_records().await;

        records.into_iter().find(|record| record.is_for(triple))
    }

    #[tracing::instrument(skip(self))]
    pub async fn is_closed(&self, triple: &IdentityTriple) -> bool {
        self.get_record(triple)
            .await
            .map_or(false, |record| record.action.is_permanent())
    }

    #[tracing::instrument(skip(self))]
    pub async fn has_any_closures(&self, user_id: &str, company_id: &str) -> bool {
        let (_, records) = self.current_records().await;

        records
            .iter()
            .any(|record| record.user_id == user_id && record.company_id == company_id)
    }

    /// Wipes every record, whatever session wrote it.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) {
        if let Err(err) = self.storage.remove_item(CLOSURES_KEY).await {
            warn!("failed to clear closure records: {}", err);
        }
    }
}
