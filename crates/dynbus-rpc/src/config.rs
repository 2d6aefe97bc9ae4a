//! Endpoint config (strict YAML, same discipline as the router).

use std::fs;

use serde::Deserialize;

use dynbus_core::error::{DynbusError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    #[serde(default = "default_router_url")]
    pub router_url: String,

    /// Name to `__listen__` under right after connecting.
    #[serde(default)]
    pub name: Option<String>,

    /// Buffered one-way calls are flushed once this many are queued.
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            router_url: default_router_url(),
            name: None,
            max_batch: default_max_batch(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl EndpointConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.router_url.starts_with("ws://") || self.router_url.starts_with("wss://")) {
            return Err(DynbusError::BadRequest(
                "router_url must be a ws:// or wss:// url".into(),
            ));
        }
        if matches!(self.name.as_deref(), Some("")) {
            return Err(DynbusError::BadRequest("name must not be empty".into()));
        }
        if !(1..=10000).contains(&self.max_batch) {
            return Err(DynbusError::BadRequest(
                "max_batch must be between 1 and 10000".into(),
            ));
        }
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(DynbusError::BadRequest(
                "outbound_queue must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }
}

pub fn load_from_file(path: &str) -> Result<EndpointConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| DynbusError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<EndpointConfig> {
    let cfg: EndpointConfig = serde_yaml::from_str(s)
        .map_err(|e| DynbusError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

fn default_router_url() -> String {
    "ws://127.0.0.1:8000/ws".into()
}
fn default_max_batch() -> usize {
    256
}
fn default_outbound_queue() -> usize {
    1024
}
