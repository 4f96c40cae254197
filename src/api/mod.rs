use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::campaign::CampaignPayload;
use crate::error::Error;

pub mod http;

pub use http::HttpInsightApi;

/// The envelope every insight service endpoint answers with.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// The payload, if the call succeeded and carried one.
    pub fn into_data(self) -> Option<T> {
        if self.success {
            self.data
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RotationRequest {
    pub username: String,
    pub company: String,
    /// `YYYYMMDD`
    pub date: String,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerContent {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub banner_image_url: Option<String>,
    #[serde(default)]
    pub banner_background_color: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureRegistrationRequest {
    pub user_id: String,
    pub company_id: String,
    pub campaign_id: String,
    pub closure_date: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureRegistration {
    #[serde(default)]
    pub closure_count: u32,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub requires_user_input: bool,
    #[serde(default)]
    pub is_global_prompt: bool,
    #[serde(default)]
    pub effective_date: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRequest {
    pub user_id: String,
    pub company_id: String,
    pub campaign_id: String,
    pub wants_to_see: bool,
    pub reason: String,
    pub is_global_response: bool,
    pub preference_date: DateTime<Utc>,
}

/// The remote insight service as consumed by the widget backend.
///
/// Implementations are not required to be `Send`; one instance lives on
/// each server worker.
#[async_trait(?Send)]
pub trait InsightApi {
    async fn next_campaign(
        &self,
        request: &RotationRequest,
    ) -> Result<ApiResponse<CampaignPayload>, Error>;

    async fn banner(&self, banner_id: u64) -> Result<ApiResponse<BannerContent>, Error>;

    async fn register_closure(
        &self,
        request: &ClosureRegistrationRequest,
    ) -> Result<ApiResponse<ClosureRegistration>, Error>;

    async fn register_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<ApiResponse<serde_json::Value>, Error>;

    async fn global_opt_out(&self, user_id: &str) -> Result<ApiResponse<bool>, Error>;
}
