use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::settings::types::{ConfigFile, NodeConfig};

/// Environment variable naming the config file when no CLI argument is given.
pub const CONFIG_ENV: &str = "ENSENSO_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// A resolved configuration plus one warning per defaulted key.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: NodeConfig,
    pub warnings: Vec<String>,
}

/// Pick the config path: first CLI argument, else `ENSENSO_CONFIG`.
pub fn config_path(args: impl Iterator<Item = String>) -> Option<PathBuf> {
    choose_path(args, std::env::var(CONFIG_ENV).ok())
}

fn choose_path(mut args: impl Iterator<Item = String>, env: Option<String>) -> Option<PathBuf> {
    args.next()
        .or(env)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

/// Read a config file. A missing file (or no path) means every key is missing.
pub fn read_file(path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let Some(path) = path else {
        return Ok(ConfigFile::default());
    };
    if !path.exists() {
        warn!("Config file {} not found", path.display());
        return Ok(ConfigFile::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Fill missing keys with defaults, warning for each one.
pub fn resolve(file: ConfigFile) -> Result<LoadedConfig, ConfigError> {
    let defaults = NodeConfig::default();
    let mut warnings = Vec::new();

    fn take<T: std::fmt::Debug>(
        key: &str,
        value: Option<T>,
        default: T,
        warnings: &mut Vec<String>,
    ) -> T {
        value.unwrap_or_else(|| {
            let message = format!("Parameter [{key}] not found, using default: {default:?}");
            warn!("{message}");
            warnings.push(message);
            default
        })
    }

    let config = NodeConfig {
        serial_no: take("serial_no", file.serial_no, defaults.serial_no, &mut warnings),
        camera_frame_id: take(
            "camera_frame_id",
            file.camera_frame_id,
            defaults.camera_frame_id,
            &mut warnings,
        ),
        front_light: take("front_light", file.front_light, defaults.front_light, &mut warnings),
        projector: take("projector", file.projector, defaults.projector, &mut warnings),
        capture: take("capture", file.capture, defaults.capture, &mut warnings),
        queue_size: take("queue_size", file.queue_size, defaults.queue_size, &mut warnings),
    };

    if config.serial_no.trim().is_empty() {
        return Err(ConfigError::Invalid("serial_no is empty".to_string()));
    }
    if config.camera_frame_id.trim().is_empty() {
        return Err(ConfigError::Invalid("camera_frame_id is empty".to_string()));
    }
    if config.queue_size == 0 {
        return Err(ConfigError::Invalid("queue_size must be at least 1".to_string()));
    }
    config
        .capture
        .validate()
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;

    Ok(LoadedConfig { config, warnings })
}

/// Read and resolve in one step.
pub fn load(path: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let loaded = resolve(read_file(path)?)?;
    info!(
        "Config: serial {} frame {} projector {} front light {}",
        loaded.config.serial_no,
        loaded.config.camera_frame_id,
        loaded.config.projector,
        loaded.config.front_light
    );
    Ok(loaded)
}
