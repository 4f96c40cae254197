use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::api::{InsightApi, RotationRequest};
use crate::closure::ClosureStore;
use crate::identity::IdentityTriple;
use crate::session::{is_session_active, mark_session_active};
use crate::storage::SessionStorage;

use super::{CampaignCache, DisplayCampaign};

/// Who to rotate for when the widget does not say.
#[derive(Clone, Debug)]
pub struct RotationDefaults {
    pub username: String,
    pub company: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationParams {
    pub user_id: Option<String>,
    pub company_id: Option<String>,
    /// `YYYYMMDD`, today when absent
    pub date: Option<String>,
}

impl RotationParams {
    pub fn user_id<'a>(&'a self, defaults: &'a RotationDefaults) -> &'a str {
        non_blank(&self.user_id).unwrap_or(defaults.username.as_str())
    }

    pub fn company_id<'a>(&'a self, defaults: &'a RotationDefaults) -> &'a str {
        non_blank(&self.company_id).unwrap_or(defaults.company.as_str())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.trim().is_empty())
}

pub fn today() -> String {
    Local::now().format("%Y%m%d").to_string()
}

/// The caller's `YYYYMMDD` date, or today when it is missing or not a
/// real calendar date.
fn rotation_date(date: &Option<String>) -> String {
    match non_blank(date) {
        Some(date) if is_rotation_date(date) => date.to_owned(),
        Some(date) => {
            warn!("ignoring malformed rotation date {:?}", date);
            today()
        }
        None => today(),
    }
}

fn is_rotation_date(date: &str) -> bool {
    date.len() == 8
        && date.bytes().all(|b| b.is_ascii_digit())
        && NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rotation {
    /// The campaign rotation picked, before closures are considered.
    pub candidate: Option<DisplayCampaign>,
    /// Whether the candidate is closed for this user in this session.
    pub closed: bool,
}

impl Rotation {
    pub fn display(&self) -> Option<&DisplayCampaign> {
        if self.closed {
            None
        } else {
            self.candidate.as_ref()
        }
    }
}

/// Picks the campaign to show, reusing the session's cached rotation when
/// the session is already active. The closure check runs on every call,
/// cached or not.
#[tracing::instrument(skip(api, storage))]
pub async fn rotate(
    api: &dyn InsightApi,
    storage: &Arc<dyn SessionStorage>,
    defaults: &RotationDefaults,
    params: &RotationParams,
) -> Rotation {
    let cache = CampaignCache::new(Arc::clone(storage));
    let user_id = params.user_id(defaults);
    let company_id = params.company_id(defaults);

    let cached = if is_session_active(&**storage).await {
        cache.get().await
    } else {
        None
    };

    let candidate = match cached {
        Some(snapshot) => {
            debug!("reusing cached rotation for campaign {}", snapshot.campaign_id);
            Some(DisplayCampaign::from(snapshot))
        }
        None => {
            let request = RotationRequest {
                username: user_id.to_owned(),
                company: company_id.to_owned(),
                date: rotation_date(&params.date),
            };

            match api.next_campaign(&request).await {
                Ok(response) => match response.into_data() {
                    Some(payload) => {
                        mark_session_active(&**storage).await;
                        cache.store(Some(&payload)).await;
                        Some(DisplayCampaign::from(payload))
                    }
                    None => {
                        debug!("no eligible campaign for {}", user_id);
                        None
                    }
                },
                Err(err) => {
                    warn!("rotation call failed: {}", err);
                    None
                }
            }
        }
    };

    let closed = match &candidate {
        Some(campaign) => match IdentityTriple::new(&*campaign.campaign_id, user_id, company_id) {
            Some(triple) => ClosureStore::new(Arc::clone(storage)).is_closed(&triple).await,
            None => false,
        },
        None => false,
    };

    Rotation { candidate, closed }
}

/// The campaign to display, if any.
pub async fn next_display_campaign(
    api: &dyn InsightApi,
    storage: &Arc<dyn SessionStorage>,
    defaults: &RotationDefaults,
    params: &RotationParams,
) -> Option<DisplayCampaign> {
    rotate(api, storage, defaults, params).await.display().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test::{ok, MockInsightApi};
    use crate::api::ApiResponse;
    use crate::campaign::CampaignPayload;
    use crate::closure::ClosureAction;
    use crate::error::Error;
    use crate::session::SESSION_ACTIVE_KEY;
    use crate::storage::MemoryStorage;
    use std::sync::Mutex;

    fn defaults() -> RotationDefaults {
        RotationDefaults {
            username: "guest".into(),
            company: "default".into(),
        }
    }

    fn params() -> RotationParams {
        RotationParams {
            user_id: Some("U1".into()),
            company_id: Some("CO1".into()),
            date: Some("20240301".into()),
        }
    }

    fn payload(campaign_id: &str) -> CampaignPayload {
        CampaignPayload {
            campaign_id: campaign_id.into(),
            banner_id: "B1".into(),
            insight_sub_type: None,
            insight_type: None,
            name: None,
        }
    }

    fn storage() -> Arc<dyn SessionStorage> {
        Arc::new(MemoryStorage::new())
    }

    #[tokio::test]
    async fn active_session_with_cache_skips_the_network() {
        let storage = storage();
        CampaignCache::new(Arc::clone(&storage))
            .store(Some(&payload("C1")))
            .await;
        storage.set_item(SESSION_ACTIVE_KEY, "true").await.unwrap();
        let api = MockInsightApi::new();

        let campaign = next_display_campaign(&api, &storage, &defaults(), &params()).await;

        let campaign = campaign.unwrap();
        assert_eq!(campaign.campaign_id, "C1");
        assert_eq!(campaign.banner_id, "B1");
        assert_eq!(api.total_calls(), 0);
    }

    #[tokio::test]
    async fn successful_rotation_activates_session_and_caches() {
        let storage = storage();
        let mut api = MockInsightApi::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        api.on_next_campaign = Box::new(move |request| {
            *seen_clone.lock().unwrap() = Some(request.clone());
            ok(payload("C2"))
        });

        let campaign = next_display_campaign(&api, &storage, &defaults(), &params()).await;

        assert_eq!(campaign.unwrap().campaign_id, "C2");
        assert!(is_session_active(&*storage).await);
        assert_eq!(
            CampaignCache::new(Arc::clone(&storage)).get().await.unwrap().campaign_id,
            "C2"
        );
        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.username, "U1");
        assert_eq!(request.company, "CO1");
        assert_eq!(request.date, "20240301");

        next_display_campaign(&api, &storage, &defaults(), &params()).await;
        assert_eq!(api.calls_to("next_campaign"), 1);
    }

    #[tokio::test]
    async fn missing_identity_falls_back_to_defaults_and_today() {
        let storage = storage();
        let mut api = MockInsightApi::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        api.on_next_campaign = Box::new(move |request| {
            *seen_clone.lock().unwrap() = Some(request.clone());
            ok(payload("C1"))
        });

        next_display_campaign(&api, &storage, &defaults(), &RotationParams::default()).await;

        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.username, "guest");
        assert_eq!(request.company, "default");
        assert_eq!(request.date.len(), 8);
        assert!(request.date.chars().all(|c| c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn no_eligible_campaign_is_not_an_error() {
        let storage = storage();
        let mut api = MockInsightApi::new();
        api.on_next_campaign = Box::new(|_| {
            Ok(ApiResponse {
                success: false,
                data: None,
                message: Some("no eligible campaign".into()),
            })
        });

        let campaign = next_display_campaign(&api, &storage, &defaults(), &params()).await;

        assert_eq!(campaign, None);
        assert!(!is_session_active(&*storage).await);
    }

    #[tokio::test]
    async fn network_failure_neither_activates_nor_caches() {
        let storage = storage();
        let mut api = MockInsightApi::new();
        api.on_next_campaign = Box::new(|_| Err(Error::RemoteStatus { status: 503 }));

        let campaign = next_display_campaign(&api, &storage, &defaults(), &params()).await;

        assert_eq!(campaign, None);
        assert!(!is_session_active(&*storage).await);
        assert!(!CampaignCache::new(Arc::clone(&storage)).has_data().await);
    }

    #[tokio::test]
    async fn cached_campaign_still_honours_closures() {
        let storage = storage();
        CampaignCache::new(Arc::clone(&storage))
            .store(Some(&payload("C1")))
            .await;
        storage.set_item(SESSION_ACTIVE_KEY, "true").await.unwrap();
        ClosureStore::new(Arc::clone(&storage))
            .record_closure(
                &IdentityTriple::new("C1", "U1", "CO1").unwrap(),
                1,
                ClosureAction::FirstClosureHide,
            )
            .await;
        let api = MockInsightApi::new();

        let rotation = rotate(&api, &storage, &defaults(), &params()).await;

        assert!(rotation.closed);
        assert_eq!(rotation.candidate.unwrap().campaign_id, "C1");
        assert_eq!(
            next_display_campaign(&api, &storage, &defaults(), &params()).await,
            None
        );
        assert_eq!(api.total_calls(), 0);
    }

    #[test]
    fn malformed_dates_fall_back_to_today() {
        assert_eq!(rotation_date(&Some("20240301".into())), "20240301");
        assert_eq!(rotation_date(&Some("20240229".into())), "20240229");

        for date in &["2024-03-01", "20241301", "20230229", "2024030", "+2024030", "soon"] {
            assert_eq!(rotation_date(&Some(date.to_string())), today(), "{}", date);
        }
        assert_eq!(rotation_date(&None), today());
    }

    #[tokio::test]
    async fn malformed_date_is_not_sent_to_the_service() {
        let storage = storage();
        let mut api = MockInsightApi::new();
        let seen = Arc::new(Mutex::new(None));
        let seen_clone = Arc::clone(&seen);
        api.on_next_campaign = Box::new(move |request| {
            *seen_clone.lock().unwrap() = Some(request.clone());
            ok(payload("C1"))
        });
        let params = RotationParams {
            date: Some("01/03/2024".into()),
            ..params()
        };

        next_display_campaign(&api, &storage, &defaults(), &params).await;

        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.date, today());
    }
}
