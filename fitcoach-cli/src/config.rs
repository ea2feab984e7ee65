//! CLI configuration handling.

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use fitcoach_session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.toml";
const STORE_FILE: &str = "store.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Directory holding the persisted key-value store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Logging level, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Identity provider, profile API and refresh settings.
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".fitcoach"))
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::new(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            session: SessionConfig::default(),
        }
    }
}

impl CliConfig {
    /// Location of the key-value store file.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }
}

/// Parse a configuration document.
pub fn parse_config(contents: &str) -> Result<CliConfig> {
    let config: CliConfig = toml::from_str(contents)?;
    Ok(config)
}

/// Load configuration from `path`, or from the default location.
///
/// An explicit path must exist. A missing default file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    let config_path = match path {
        Some(path) => {
            if !path.exists() {
                bail!("Config file {:?} does not exist", path);
            }
            path.to_path_buf()
        }
        None => project_dirs()
            .map(|d| d.config_dir().join(CONFIG_FILE))
            .unwrap_or_else(|| PathBuf::from("fitcoach.toml")),
    };

    let mut config = if config_path.exists() {
        let contents = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        parse_config(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        CliConfig::default()
    };

    config.config_path = config_path;

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "fitcoach", "fitcoach")
}
