use std::env;

use tracing::Level;

use crate::campaign::rotation::RotationDefaults;
use crate::error::Error;

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: String,
    pub insight_api_url: String,
    /// Sessions are kept in memory when unset.
    pub mongo_uri: Option<String>,
    pub mongo_database: String,
    pub default_username: String,
    pub default_company: String,
    pub log_level: Level,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            bind_address: "127.0.0.1:8080".to_string(),
            insight_api_url: "http://localhost:9000".to_string(),
            mongo_uri: None,
            mongo_database: "insight_banner".to_string(),
            default_username: "guest".to_string(),
            default_company: "default".to_string(),
            log_level: Level::INFO,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, Error> {
        Config::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Config, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let log_level = match get("INSIGHT_LOG_LEVEL") {
            Some(level) => level.parse().map_err(|_| {
                Error::InvalidConfig(format!("unknown log level {:?}", level))
            })?,
            None => defaults.log_level,
        };

        Ok(Config {
            bind_address: get("INSIGHT_BIND_ADDRESS").unwrap_or(defaults.bind_address),
            insight_api_url: get("INSIGHT_API_URL").unwrap_or(defaults.insight_api_url),
            mongo_uri: get("INSIGHT_MONGO_URI"),
            mongo_database: get("INSIGHT_MONGO_DATABASE").unwrap_or(defaults.mongo_database),
            default_username: get("INSIGHT_DEFAULT_USERNAME")
                .unwrap_or(defaults.default_username),
            default_company: get("INSIGHT_DEFAULT_COMPANY").unwrap_or(defaults.default_company),
            log_level,
        })
    }

    pub fn rotation_defaults(&self) -> RotationDefaults {
        RotationDefaults {
            username: self.default_username.clone(),
            company: self.default_company.clone(),
        }
    }
}
