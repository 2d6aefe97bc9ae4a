//! Shared application state for the router.

use std::sync::Arc;

use crate::broker::{Broker, RoutingPolicy};
use crate::config::RouterConfig;
use crate::obs::metrics::RouterMetrics;

#[derive(Clone)]
pub struct AppState {
    cfg: Arc<RouterConfig>,
    broker: Arc<Broker>,
    metrics: Arc<RouterMetrics>,
}

impl AppState {
    pub fn new(cfg: RouterConfig) -> Self {
        let metrics = Arc::new(RouterMetrics::default());
        let policy = RoutingPolicy::from(&cfg.router);
        let broker = Arc::new(Broker::new(policy, Arc::clone(&metrics)));
        Self {
            cfg: Arc::new(cfg),
            broker,
            metrics,
        }
    }

    pub fn cfg(&self) -> &RouterConfig {
        &self.cfg
    }

    pub fn broker(&self) -> Arc<Broker> {
        Arc::clone(&self.broker)
    }

    pub fn metrics(&self) -> &RouterMetrics {
        &self.metrics
    }
}
