use anyhow::Context;
use serde::Deserialize;

use crate::services::SuggestSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // Suggestion tuning
    #[serde(default = "default_suggest_fanout")]
    pub suggest_fanout: usize,
    #[serde(default = "default_second_degree_factor")]
    pub second_degree_factor: usize,
}

fn default_port() -> u16 { 3010 }
fn default_pool_max_size() -> u32 { 10 }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_suggest_fanout() -> usize { 10 }
fn default_second_degree_factor() -> usize { 2 }

impl AppConfig {
    /// Reads `MEDLINK_GRAPH__*` environment variables. Only the database URL is required.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("MEDLINK_GRAPH").separator("__"))
            .build()?;
        config
            .try_deserialize()
            .context("invalid configuration (is MEDLINK_GRAPH__DATABASE_URL set?)")
    }

    /// Defaults for everything but the storage location.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            port: default_port(),
            pool_max_size: default_pool_max_size(),
            request_timeout_secs: default_request_timeout_secs(),
            suggest_fanout: default_suggest_fanout(),
            second_degree_factor: default_second_degree_factor(),
        }
    }

    pub fn suggest_settings(&self) -> SuggestSettings {
        SuggestSettings {
            fanout: self.suggest_fanout,
            second_degree_factor: self.second_degree_factor,
        }
    }
}
