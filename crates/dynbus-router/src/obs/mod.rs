//! In-process router metrics.
//!
//! Stored as atomics behind `DashMap` label keys and rendered in Prometheus
//! text format by the `/metrics` handler.

pub mod metrics;
