use async_trait::async_trait;
use awc::Client;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::campaign::CampaignPayload;
use crate::error::Error;

use super::{
    ApiResponse, BannerContent, ClosureRegistration, ClosureRegistrationRequest, InsightApi,
    PreferenceRequest, RotationRequest,
};

/// Everything that cannot appear as-is in a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

fn opt_out_path(user_id: &str) -> String {
    format!(
        "/insights/opt-out/{}",
        utf8_percent_encode(user_id, PATH_SEGMENT)
    )
}

/// Calls the insight service over HTTP.
pub struct HttpInsightApi {
    client: Client,
    base_url: String,
}

impl HttpInsightApi {
    pub fn new(base_url: impl Into<String>) -> HttpInsightApi {
        HttpInsightApi {
            client: Client::default(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ApiResponse<T>, Error> {
        let mut response = self.client.get(self.url(path)).send().await?;
        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<ApiResponse<T>, Error> {
        let mut response = self.client.post(self.url(path)).send_json(body).await?;
        if !response.status().is_success() {
            return Err(Error::RemoteStatus {
                status: response.status().as_u16(),
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait(?Send)]
impl InsightApi for HttpInsightApi {
    #[tracing::instrument(skip(self))]
    async fn next_campaign(
        &self,
        request: &RotationRequest,
    ) -> Result<ApiResponse<CampaignPayload>, Error> {
        self.post("/insights/rotation/next", request).await
    }

    #[tracing::instrument(skip(self))]
    async fn banner(&self, banner_id: u64) -> Result<ApiResponse<BannerContent>, Error> {
        self.get(&format!("/insights/banners/{}", banner_id)).await
    }

    #[tracing::instrument(skip(self))]
    async fn register_closure(
        &self,
        request: &ClosureRegistrationRequest,
    ) -> Result<ApiResponse<ClosureRegistration>, Error> {
        self.post("/insights/closures", request).await
    }

    #[tracing::instrument(skip(self))]
    async fn register_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<ApiResponse<serde_json::Value>, Error> {
        self.post("/insights/preferences", request).await
    }

    #[tracing::instrument(skip(self))]
    async fn global_opt_out(&self, user_id: &str) -> Result<ApiResponse<bool>, Error> {
        self.get(&opt_out_path(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_ids_are_encoded_as_one_segment() {
        assert_eq!(opt_out_path("U1"), "/insights/opt-out/U1");
        assert_eq!(opt_out_path("jane doe"), "/insights/opt-out/jane%20doe");
        assert_eq!(opt_out_path("a/b"), "/insights/opt-out/a%2Fb");
        assert_eq!(opt_out_path("50%?"), "/insights/opt-out/50%25%3F");
    }
}
