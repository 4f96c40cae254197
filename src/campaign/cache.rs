use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::session::current_session_id;
use crate::storage::SessionStorage;

use super::{CampaignPayload, CampaignSnapshot};

pub const CAMPAIGN_CACHE_KEY: &str = "insight_campaign_cache";

/// Holds the single most recent rotation result of a session.
#[derive(Clone)]
pub struct CampaignCache {
    storage: Arc<dyn SessionStorage>,
}

impl CampaignCache {
    pub fn new(storage: Arc<dyn SessionStorage>) -> CampaignCache {
        CampaignCache { storage }
    }

    #[tracing::instrument(skip(self))]
    pub async fn store(&self, campaign: Option<&CampaignPayload>) {
        let campaign = match campaign {
            Some(campaign) => campaign,
            None => return,
        };

        let snapshot = CampaignSnapshot {
            campaign_id: campaign.campaign_id.clone(),
            banner_id: campaign.banner_id.clone(),
            insight_sub_type: campaign.insight_sub_type.clone(),
            insight_type: campaign.insight_type.clone(),
            name: campaign.name.clone(),
            fetched_at: Utc::now(),
            session_id: current_session_id(&*self.storage).await,
        };

        let value = match serde_json::to_string(&snapshot) {
            Ok(value) => value,
            Err(err) => {
                warn!("failed to serialize campaign snapshot: {}", err);
                return;
            }
        };

        if let Err(err) = self.storage.set_item(CAMPAIGN_CACHE_KEY, &value).await {
            warn!("failed to persist campaign snapshot: {}", err);
        }
    }

    /// The cached snapshot, if it was written in the current session. A
    /// snapshot left over from another session is purged.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self) -> Option<CampaignSnapshot> {
        let value = match self.storage.get_item(CAMPAIGN_CACHE_KEY).await {
            Ok(value) => value?,
            Err(err) => {
                warn!("failed to read campaign snapshot: {}", err);
                return None;
            }
        };

        let snapshot: CampaignSnapshot = match serde_json::from_str(&value) {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("discarding unreadable campaign snapshot: {}", err);
                self.clear().await;
                return None;
            }
        };

        if snapshot.session_id != current_session_id(&*self.storage).await {
            self.clear().await;
            return None;
        }

        Some(snapshot)
    }

    pub async fn has_data(&self) -> bool {
        self.get().await.is_some()
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self) {
        if let Err(err) = self.storage.remove_item(CAMPAIGN_CACHE_KEY).await {
            warn!("failed to clear campaign snapshot: {}", err);
        }
    }
}
