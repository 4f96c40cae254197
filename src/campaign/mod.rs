use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::session::SessionId;

pub mod cache;
pub mod rotation;

pub use cache::CampaignCache;

/// A campaign as handed out by the rotation endpoint.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPayload {
    #[serde(deserialize_with = "id_string")]
    pub campaign_id: String,
    #[serde(deserialize_with = "id_string")]
    pub banner_id: String,
    #[serde(default)]
    pub insight_sub_type: Option<String>,
    #[serde(default)]
    pub insight_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The rotation result cached for the session.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSnapshot {
    pub campaign_id: String,
    pub banner_id: String,
    pub insight_sub_type: Option<String>,
    pub insight_type: Option<String>,
    pub name: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub session_id: SessionId,
}

/// The campaign the widget should display, reduced to what the closure
/// flow needs to identify it.
#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayCampaign {
    pub campaign_id: String,
    pub banner_id: String,
    pub insight_sub_type: Option<String>,
    pub insight_type: Option<String>,
    pub name: Option<String>,
}

impl From<CampaignPayload> for DisplayCampaign {
    fn from(payload: CampaignPayload) -> DisplayCampaign {
        DisplayCampaign {
            campaign_id: payload.campaign_id,
            banner_id: payload.banner_id,
            insight_sub_type: payload.insight_sub_type,
            insight_type: payload.insight_type,
            name: payload.name,
        }
    }
}

impl From<CampaignSnapshot> for DisplayCampaign {
    fn from(snapshot: CampaignSnapshot) -> DisplayCampaign {
        DisplayCampaign {
            campaign_id: snapshot.campaign_id,
            banner_id: snapshot.banner_id,
            insight_sub_type: snapshot.insight_sub_type,
            insight_type: snapshot.insight_type,
            name: snapshot.name,
        }
    }
}

// ids arrive as either json strings or numbers
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}
