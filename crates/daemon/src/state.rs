use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "courier";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the relay API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Seconds between expiry sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Include server-side failure detail in error bodies (development only)
    #[serde(default)]
    pub expose_error_details: bool,
}

fn default_api_port() -> u16 {
    5000
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            sweep_interval_secs: default_sweep_interval_secs(),
            expose_error_details: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the courier directory (~/.courier)
    pub courier_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the courier directory path (custom or default ~/.courier)
    pub fn courier_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new courier state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let courier_dir = Self::courier_dir(custom_path)?;

        if courier_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&courier_dir)?;

        let config = config.unwrap_or_default();
        let config_path = courier_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // migrations run on first connect
        let db_path = courier_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            courier_dir,
            db_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the courier directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let courier_dir = Self::courier_dir(custom_path)?;

        if !courier_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = courier_dir.join(DB_FILE_NAME);
        let config_path = courier_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            courier_dir,
            db_path,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("courier directory not initialized. Run 'courier init' first")]
    NotInitialized,

    #[error("courier directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier");

        let config = AppConfig {
            api_port: 5999,
            ..Default::default()
        };
        let created = AppState::init(Some(path.clone()), Some(config.clone())).unwrap();
        assert!(created.db_path.exists());

        let loaded = AppState::load(Some(path.clone())).unwrap();
        assert_eq!(loaded.config, config);

        assert!(matches!(
            AppState::init(Some(path), None),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_missing_keys_take_defaults() {
        let config: AppConfig = toml::from_str("api_port = 7000").unwrap();
        assert_eq!(config.api_port, 7000);
        assert_eq!(config.sweep_interval_secs, 300);
        assert!(!config.expose_error_details);
    }
}
