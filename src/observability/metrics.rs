//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_listeners_bound_total` (counter): listeners that bound, by protocol
//! - `proxy_listeners_pending` (gauge): listeners still waiting to bind
//! - `proxy_plugins_mounted_total` (counter): plugin mounts, by protocol
//! - `proxy_ready` (gauge): 1 once every listener has bound

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::Protocol;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint started"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics endpoint"),
    }
}

pub fn record_listener_bound(protocol: Protocol) {
    counter!("proxy_listeners_bound_total", "protocol" => protocol.as_str()).increment(1);
}

pub fn record_pending_listeners(pending: usize) {
    gauge!("proxy_listeners_pending").set(pending as f64);
}

pub fn record_plugin_mounted(protocol: Protocol) {
    counter!("proxy_plugins_mounted_total", "protocol" => protocol.as_str()).increment(1);
}

pub fn record_ready() {
    gauge!("proxy_ready").set(1.0);
}
