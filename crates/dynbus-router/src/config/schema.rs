use serde::Deserialize;
use dynbus_core::error::{DynbusError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    pub version: u32,

    #[serde(default)]
    pub router: RouterSection,
}

impl RouterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(DynbusError::UnsupportedVersion(format!(
                "config version {}",
                self.version
            )));
        }

        self.router.validate()?;

        Ok(())
    }
}

/// How destinations are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    /// Every routed envelope names an existing destination.
    Explicit,
    /// Explicit, plus: a node that joined with `__connect__` may only talk to
    /// its declared peer, and only that peer may talk to it.
    #[default]
    Anchored,
}

/// Meaning of `to: null` on non-control traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullDestination {
    /// Refused with `UnknownAddress`.
    #[default]
    Reject,
    /// Delivered to the only other registered node; refused when there are
    /// zero or several candidates.
    SolePeer,
}

/// What happens when a name is registered while another connection holds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebindPolicy {
    /// Last registration wins; the previous holder is unbound.
    #[default]
    Replace,
    /// The new registration fails with `AddressInUse`.
    Reject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    #[serde(default)]
    pub addressing: AddressingMode,

    #[serde(default)]
    pub null_destination: NullDestination,

    #[serde(default)]
    pub rebind: RebindPolicy,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// How long a routed envelope may wait on a full destination queue.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ws_path: default_ws_path(),
            addressing: AddressingMode::default(),
            null_destination: NullDestination::default(),
            rebind: RebindPolicy::default(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_queue: default_outbound_queue(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
        }
    }
}

impl RouterSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(DynbusError::BadRequest(
                "router.listen must be a valid SocketAddr".into(),
            ));
        }
        if !self.ws_path.starts_with('/') {
            return Err(DynbusError::BadRequest(
                "router.ws_path must start with '/'".into(),
            ));
        }
        if !(1024..=64 * 1024 * 1024).contains(&self.max_frame_bytes) {
            return Err(DynbusError::BadRequest(
                "router.max_frame_bytes must be between 1024 and 67108864".into(),
            ));
        }
        if !(1..=65536).contains(&self.outbound_queue) {
            return Err(DynbusError::BadRequest(
                "router.outbound_queue must be between 1 and 65536".into(),
            ));
        }
        if !(1000..=120000).contains(&self.ping_interval_ms) {
            return Err(DynbusError::BadRequest(
                "router.ping_interval_ms must be between 1000 and 120000".into(),
            ));
        }
        if self.idle_timeout_ms > 600000 {
            return Err(DynbusError::BadRequest(
                "router.idle_timeout_ms must not exceed 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(DynbusError::BadRequest(
                "router.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if !(10..=60000).contains(&self.delivery_timeout_ms) {
            return Err(DynbusError::BadRequest(
                "router.delivery_timeout_ms must be between 10 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8000".into()
}
fn default_ws_path() -> String {
    "/ws".into()
}
fn default_max_frame_bytes() -> usize {
    1024 * 1024
}
fn default_outbound_queue() -> usize {
    1024
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_delivery_timeout_ms() -> u64 {
    5000
}
