//! Router config loader (strict parsing).

pub mod schema;

use std::fs;

use dynbus_core::error::{DynbusError, Result};

pub use schema::{AddressingMode, NullDestination, RebindPolicy, RouterConfig, RouterSection};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DYNBUS_CONFIG";
/// Config file used when [`CONFIG_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "dynbus.yaml";

pub fn load_from_file(path: &str) -> Result<RouterConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| DynbusError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<RouterConfig> {
    let cfg: RouterConfig = serde_yaml::from_str(s)
        .map_err(|e| DynbusError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Path from `DYNBUS_CONFIG`, falling back to `dynbus.yaml`.
pub fn config_path() -> String {
    std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}
