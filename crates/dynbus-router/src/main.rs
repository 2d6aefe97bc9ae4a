//! dynbus router binary.
//!
//! - Config from `$DYNBUS_CONFIG` (default `dynbus.yaml`), strict YAML
//! - WebSocket endpoint at `router.ws_path`
//! - `/healthz`, `/metrics`

use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};

use dynbus_router::{app_state, config, router};

#[tokio::main]
async fn main() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "dynbus-router failed");
        std::process::exit(1);
    }
}

async fn run() -> dynbus_core::Result<()> {
    let path = config::config_path();
    let cfg = config::load_from_file(&path)?;
    let listen: SocketAddr = cfg
        .router
        .listen
        .parse()
        .map_err(|e| dynbus_core::DynbusError::BadRequest(format!("router.listen: {e}")))?;

    let state = app_state::AppState::new(cfg);
    let app = router::build_router(state);

    tracing::info!(%listen, config = %path, "dynbus-router starting");
    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| dynbus_core::DynbusError::Internal(format!("bind failed: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| dynbus_core::DynbusError::Internal(format!("server failed: {e}")))
}
