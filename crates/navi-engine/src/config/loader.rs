use super::schema::NaviConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const ENV_API_URL: &str = "NAVI_API_URL";
pub const ENV_EVENTS_URL: &str = "NAVI_EVENTS_URL";
pub const ENV_MODEL: &str = "NAVI_MODEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./navi.yaml
    /// 2. ~/.navi/config.yaml
    /// 3. Default configuration
    ///
    /// Environment overrides are applied on top.
    pub async fn load_default() -> Result<NaviConfig, ConfigError> {
        let mut config = match Self::find_default_file() {
            Some(path) => Self::load_from(&path).await?,
            None => NaviConfig::default(),
        };
        Self::apply_env(&mut config);
        Ok(config)
    }

    pub async fn load_from(path: &Path) -> Result<NaviConfig, ConfigError> {
        debug!("Loading config from {}", path.display());
        let content = tokio::fs::read_to_string(path).await?;
        let config: NaviConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    fn find_default_file() -> Option<PathBuf> {
        let local_config = PathBuf::from("./navi.yaml");
        if local_config.exists() {
            return Some(local_config);
        }

        let home_config = dirs::home_dir()?.join(".navi").join("config.yaml");
        home_config.exists().then_some(home_config)
    }

    pub fn apply_env(config: &mut NaviConfig) {
        if let Ok(url) = std::env::var(ENV_API_URL) {
            config.api.base_url = url;
        }
        if let Ok(url) = std::env::var(ENV_EVENTS_URL) {
            config.events.url = url;
        }
        if let Ok(model) = std::env::var(ENV_MODEL) {
            config.navigation.default_model = model;
        }
    }
}
