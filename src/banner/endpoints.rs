use actix_web::web::{Data, Json, Path, Query};
use actix_web::{delete, get, post};
use serde::{Deserialize, Serialize};

use crate::api::InsightApi;
use crate::campaign::rotation::RotationParams;
use crate::closure::policy::PromptChoice;
use crate::error::Error;
use crate::identity::IdentityTriple;
use crate::utils::SuccessBody;

use super::{fetch_banner_content, BannerContentBody, BannerController, BannerView};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityBody {
    pub campaign_id: Option<String>,
    pub user_id: Option<String>,
    pub company_id: Option<String>,
}

impl IdentityBody {
    pub fn into_triple(self) -> Option<IdentityTriple> {
        IdentityTriple::from_parts(self.campaign_id, self.user_id, self.company_id)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ChoiceBody {
    #[serde(flatten)]
    pub identity: IdentityBody,
    pub choice: PromptChoice,
}

#[get("/sessions/{scope}/banner")]
#[tracing::instrument(skip(controller, api))]
pub async fn get_banner(
    controller: Data<BannerController>,
    api: Data<Box<dyn InsightApi>>,
    params: Path<String>,
    query: Query<RotationParams>,
) -> Result<Json<BannerView>, Error> {
    let scope = params.into_inner();

    let view = controller.view(&***api, &scope, &query).await;

    Ok(Json(view))
}

#[post("/sessions/{scope}/banner/dismiss")]
#[tracing::instrument(skip(controller, api))]
pub async fn dismiss_banner(
    controller: Data<BannerController>,
    api: Data<Box<dyn InsightApi>>,
    params: Path<String>,
    body: Json<IdentityBody>,
) -> Result<Json<BannerView>, Error> {
    let scope = params.into_inner();
    let body = body.into_inner();

    let view = controller
        .dismiss(&***api, &scope, body.into_triple())
        .await;

    Ok(Json(view))
}

#[post("/sessions/{scope}/banner/choice")]
#[tracing::instrument(skip(controller, api))]
pub async fn choose_banner_option(
    controller: Data<BannerController>,
    api: Data<Box<dyn InsightApi>>,
    params: Path<String>,
    body: Json<ChoiceBody>,
) -> Result<Json<BannerView>, Error> {
    let scope = params.into_inner();
    let body = body.into_inner();

    let view = controller
        .choose(&***api, &scope, body.identity.into_triple(), body.choice)
        .await?;

    Ok(Json(view))
}

#[delete("/sessions/{scope}/banner/flow")]
#[tracing::instrument(skip(controller))]
pub async fn unmount_banner(
    controller: Data<BannerController>,
    params: Path<String>,
    body: Json<IdentityBody>,
) -> Result<Json<SuccessBody>, Error> {
    let scope = params.into_inner();

    if let Some(triple) = body.into_inner().into_triple() {
        controller.unmount(&scope, triple);
    }

    Ok(Json(SuccessBody {}))
}

#[delete("/sessions/{scope}")]
#[tracing::instrument(skip(controller))]
pub async fn reset_session(
    controller: Data<BannerController>,
    params: Path<String>,
) -> Result<Json<SuccessBody>, Error> {
    let scope = params.into_inner();

    controller.reset(&scope).await?;

    Ok(Json(SuccessBody {}))
}

#[get("/banners/{banner_id}")]
#[tracing::instrument(skip(api))]
pub async fn get_banner_content(
    api: Data<Box<dyn InsightApi>>,
    params: Path<u64>,
) -> Result<Json<Option<BannerContentBody>>, Error> {
    let banner_id = params.into_inner();

    let content = fetch_banner_content(&***api, banner_id).await;

    Ok(Json(content.map(BannerContentBody::render)))
}
