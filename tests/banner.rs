use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::web::{self, Data, Json, Path};
use actix_web::{test, App, HttpResponse, HttpServer, ResponseError};
use serde_json::{json, Value};

use insight_banner::api::{HttpInsightApi, InsightApi};
use insight_banner::campaign::rotation::RotationDefaults;
use insight_banner::storage::MemoryStorageProvider;
use insight_banner::{configure, BannerController, Error};

#[derive(Default)]
struct StubCalls {
    rotations: AtomicUsize,
    preferences: AtomicUsize,
}

async fn next_campaign(calls: Data<StubCalls>, body: Json<Value>) -> HttpResponse {
    calls.rotations.fetch_add(1, Ordering::SeqCst);
    let campaign_id = match body["username"].as_str() {
        Some("U2") => "C2",
        _ => "C1",
    };

    HttpResponse::Ok().json(json!({
        "success": true,
        "data": { "campaignId": campaign_id, "bannerId": 17, "insightType": "PROMO" }
    }))
}

async fn register_closure(body: Json<Value>) -> HttpResponse {
    let data = match body["campaignId"].as_str() {
        Some("C2") => json!({
            "closureCount": 2,
            "action": "PROMPT_USER",
            "requiresUserInput": true,
            "isGlobalPrompt": true
        }),
        _ => json!({ "closureCount": 1, "action": "RECORDED_FIRST_CLOSURE" }),
    };

    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

async fn register_preference(calls: Data<StubCalls>, body: Json<Value>) -> HttpResponse {
    calls.preferences.fetch_add(1, Ordering::SeqCst);
    assert_eq!(body["wantsToSee"], json!(false));
    assert_eq!(body["isGlobalResponse"], json!(true));

    HttpResponse::Ok().json(json!({ "success": true, "data": null }))
}

/// Everyone but the `U*` test users has opted out.
async fn global_opt_out(user_id: Path<String>) -> HttpResponse {
    let opted_out = !user_id.starts_with('U');

    HttpResponse::Ok().json(json!({ "success": true, "data": opted_out }))
}

async fn banner(banner_id: Path<u64>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "success": true,
        "data": {
            "id": banner_id.into_inner(),
            "title": "Upgrade today",
            "bannerBackgroundColor": "#123456"
        }
    }))
}

/// Starts a stand-in for the insight service on a random local port.
fn start_stub() -> (String, Data<StubCalls>) {
    let calls = Data::new(StubCalls::default());
    let server_calls = calls.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_calls.clone())
            .route("/insights/rotation/next", web::post().to(next_campaign))
            .route("/insights/closures", web::post().to(register_closure))
            .route("/insights/preferences", web::post().to(register_preference))
            .route("/insights/opt-out/{user_id}", web::get().to(global_opt_out))
            .route("/insights/banners/{banner_id}", web::get().to(banner))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let address = server.addrs()[0];
    actix_rt::spawn(server.run());

    (format!("http://{}", address), calls)
}

macro_rules! app {
    ($base_url:expr) => {{
        let controller = Data::new(BannerController::new(
            Arc::new(MemoryStorageProvider::new()),
            RotationDefaults {
                username: "guest".into(),
                company: "default".into(),
            },
        ));
        let api: Box<dyn InsightApi> = Box::new(HttpInsightApi::new($base_url));

        test::init_service(
            App::new()
                .app_data(controller)
                .app_data(Data::new(api))
                .configure(configure)
                .default_service(web::to(|| async { Error::PathNotFound.error_response() })),
        )
        .await
    }};
}

#[actix_rt::test]
async fn first_dismissal_hides_banner_for_the_session() {
    let (base_url, calls) = start_stub();
    let app = app!(base_url);

    let req = test::TestRequest::get()
        .uri("/sessions/tab-1/banner?userId=U1&companyId=CO1&date=20240301")
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["visible"], json!(true));
    assert_eq!(view["campaign"]["campaignId"], json!("C1"));
    assert_eq!(view["campaign"]["bannerId"], json!("17"));

    let req = test::TestRequest::post()
        .uri("/sessions/tab-1/banner/dismiss")
        .set_json(json!({ "campaignId": "C1", "userId": "U1", "companyId": "CO1" }))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["hidden"], json!(true));
    assert_eq!(view["prompt"], Value::Null);

    let req = test::TestRequest::get()
        .uri("/sessions/tab-1/banner?userId=U1&companyId=CO1")
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["visible"], json!(false));
    assert_eq!(calls.rotations.load(Ordering::SeqCst), 1);

    let req = test::TestRequest::delete()
        .uri("/sessions/tab-1")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/sessions/tab-1/banner?userId=U1&companyId=CO1")
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["visible"], json!(true));
    assert_eq!(calls.rotations.load(Ordering::SeqCst), 2);
}

#[actix_rt::test]
async fn repeated_dismissal_leads_to_global_opt_out() {
    let (base_url, calls) = start_stub();
    let app = app!(base_url);
    let identity = json!({ "campaignId": "C2", "userId": "U2", "companyId": "CO1" });

    let req = test::TestRequest::get()
        .uri("/sessions/tab-2/banner?userId=U2&companyId=CO1")
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["campaign"]["campaignId"], json!("C2"));

    let req = test::TestRequest::post()
        .uri("/sessions/tab-2/banner/dismiss")
        .set_json(identity.clone())
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["prompt"], json!("GLOBAL"));

    let req = test::TestRequest::post()
        .uri("/sessions/tab-2/banner/choice")
        .set_json(json!({
            "campaignId": "C2", "userId": "U2", "companyId": "CO1",
            "choice": { "type": "STOP-ALL-CAMPAIGNS", "reason": "" }
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error_code"], json!("E4001004"));
    assert_eq!(calls.preferences.load(Ordering::SeqCst), 0);

    let req = test::TestRequest::post()
        .uri("/sessions/tab-2/banner/choice")
        .set_json(json!({
            "campaignId": "C2", "userId": "U2", "companyId": "CO1",
            "choice": { "type": "STOP-ALL-CAMPAIGNS", "reason": "too many ads" }
        }))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["hidden"], json!(true));
    assert_eq!(view["confirmation"], json!("You won't see any more campaigns."));
    assert_eq!(calls.preferences.load(Ordering::SeqCst), 1);

    let req = test::TestRequest::delete()
        .uri("/sessions/tab-2/banner/flow")
        .set_json(identity)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri("/sessions/tab-2/banner?userId=U2&companyId=CO1")
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(view["visible"], json!(false));
    assert_eq!(view["campaign"], Value::Null);
}

#[actix_rt::test]
async fn banner_content_is_proxied() {
    let (base_url, _calls) = start_stub();
    let app = app!(base_url);

    let req = test::TestRequest::get().uri("/banners/17").to_request();
    let content: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(content["id"], json!(17));
    assert_eq!(content["title"], json!("Upgrade today"));
    assert_eq!(content["bannerBackgroundColor"], json!("#123456"));

    let req = test::TestRequest::get().uri("/banners/not-a-number").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get().uri("/nowhere").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_rt::test]
async fn dismissal_without_identity_hides_locally() {
    let (base_url, calls) = start_stub();
    let app = app!(base_url);

    let req = test::TestRequest::post()
        .uri("/sessions/tab-3/banner/dismiss")
        .set_json(json!({ "campaignId": "C1" }))
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(view["hidden"], json!(true));
    assert_eq!(view["confirmation"], json!("Thanks, we've noted your choice."));
    assert_eq!(calls.rotations.load(Ordering::SeqCst), 0);
}

#[actix_rt::test]
async fn opt_out_check_survives_awkward_user_ids() {
    let (base_url, _calls) = start_stub();
    let api = HttpInsightApi::new(base_url.clone());

    for user_id in &["jane doe", "a/b", "50%?"] {
        let response = api.global_opt_out(user_id).await.unwrap();
        assert_eq!(response.into_data(), Some(true), "user id {:?}", user_id);
    }

    let app = app!(base_url);
    let req = test::TestRequest::get()
        .uri("/sessions/tab-4/banner?userId=jane%20doe&companyId=CO1")
        .to_request();
    let view: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(view["visible"], json!(false));
    assert_eq!(view["hidden"], json!(true));
}
