use serde::Serialize;
use tracing::warn;

use crate::api::{BannerContent, InsightApi};
use crate::campaign::DisplayCampaign;
use crate::closure::policy::PromptLevel;
use crate::closure::ClosureAction;
use crate::identity::IdentityTriple;

pub mod controller;
pub mod endpoints;

pub use controller::BannerController;
pub use endpoints::*;

/// Everything the widget needs to render. `hidden` and `prompt` are
/// independent: the banner region is hidden while a prompt is open.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerView {
    pub visible: bool,
    pub hidden: bool,
    pub campaign: Option<DisplayCampaign>,
    pub prompt: Option<PromptLevel>,
    pub processing: bool,
    pub confirmation: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum BannerEventKind {
    PromptOpened { prompt: PromptLevel },
    Hidden,
    ClosureRecorded { action: ClosureAction },
    Confirmation { message: String },
}

/// Published on every transition of a dismissal flow.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerEvent {
    pub scope: String,
    #[serde(flatten)]
    pub triple: IdentityTriple,
    pub kind: BannerEventKind,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerContentBody {
    pub id: u64,
    pub title: Option<String>,
    pub message: Option<String>,
    pub banner_image_url: Option<String>,
    pub banner_background_color: Option<String>,
}

impl BannerContentBody {
    pub fn render(content: BannerContent) -> BannerContentBody {
        BannerContentBody {
            id: content.id,
            title: content.title,
            message: content.message,
            banner_image_url: content.banner_image_url,
            banner_background_color: content.banner_background_color,
        }
    }
}

/// Looks up what to draw for a banner. Any failure reads as "nothing to
/// show".
#[tracing::instrument(skip(api))]
pub async fn fetch_banner_content(api: &dyn InsightApi, banner_id: u64) -> Option<BannerContent> {
    match api.banner(banner_id).await {
        Ok(response) => response.into_data(),
        Err(err) => {
            warn!("banner lookup failed: {}", err);
            None
        }
    }
}
