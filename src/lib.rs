use std::sync::Arc;

use actix_web::web::{self, Data, JsonConfig, PathConfig, QueryConfig};
use actix_web::{App, HttpServer, ResponseError};
use mongodb::Client;
use tracing::info;
use tracing_actix_web::TracingLogger;

pub mod api;
pub mod banner;
pub mod campaign;
pub mod closure;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;
pub mod storage;
pub mod typedid;
pub mod utils;

pub use banner::{BannerController, BannerView};
pub use config::Config;
pub use error::Error;

use crate::api::{HttpInsightApi, InsightApi};
use crate::storage::{MemoryStorageProvider, MongoStorageProvider, StorageProvider};

/// Registers the widget-facing endpoints and error formatting. The app is
/// expected to provide `Data<BannerController>` and
/// `Data<Box<dyn InsightApi>>`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(JsonConfig::default().error_handler(|err, _req| {
        // format json errors with custom format
        Error::InvalidJson(err).into()
    }))
    .app_data(PathConfig::default().error_handler(|err, _req| {
        // format path errors with custom format
        Error::InvalidPath(err).into()
    }))
    .app_data(QueryConfig::default().error_handler(|err, _req| {
        // format query errors with custom format
        Error::InvalidQuery(err).into()
    }))
    .service(banner::endpoints::get_banner)
    .service(banner::endpoints::dismiss_banner)
    .service(banner::endpoints::choose_banner_option)
    .service(banner::endpoints::unmount_banner)
    .service(banner::endpoints::reset_session)
    .service(banner::endpoints::get_banner_content);
}

pub async fn run(config: Config) -> Result<(), Error> {
    let storage: Arc<dyn StorageProvider> = match &config.mongo_uri {
        Some(uri) => {
            info!("connecting to db: {}", uri);
            let db = Client::with_uri_str(uri)
                .await?
                .database(&config.mongo_database);
            Arc::new(MongoStorageProvider::initialize(db).await?)
        }
        None => {
            info!("no database configured, keeping sessions in memory");
            Arc::new(MemoryStorageProvider::new())
        }
    };

    let controller = Data::new(BannerController::new(storage, config.rotation_defaults()));
    let api_url = config.insight_api_url.clone();

    info!("listening on {}", config.bind_address);
    HttpServer::new(move || {
        let api: Box<dyn InsightApi> = Box::new(HttpInsightApi::new(api_url.clone()));

        App::new()
            .app_data(controller.clone())
            .app_data(Data::new(api))
            .wrap(TracingLogger::default())
            .configure(configure)
            .default_service(web::to(|| async { Error::PathNotFound.error_response() }))
    })
    .bind(config.bind_address.as_str())?
    .run()
    .await?;

    Ok(())
}
