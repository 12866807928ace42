//! Built-in plugin answering version and feature queries.

use std::sync::Weak;

use axum::routing::get;
use axum::Json;
use serde::Serialize;

use crate::config::Protocol;
use crate::plugins::{Mount, Plugin, PluginRegistry, PluginResult};

/// Response body of `GET /version`.
#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
}

/// Serves `GET /version` and `GET /features` over both protocols.
pub struct RootPlugin {
    registry: Weak<PluginRegistry>,
}

impl RootPlugin {
    pub const NAME: &'static str = "root";

    /// The registry is held weakly since it also owns this plugin.
    pub fn new(registry: Weak<PluginRegistry>) -> Self {
        Self { registry }
    }
}

impl Plugin for RootPlugin {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn eligible(&self, _protocol: Protocol) -> bool {
        true
    }

    fn mount(&self, _protocol: Protocol) -> PluginResult<Mount> {
        let registry = self.registry.clone();
        Ok(Mount::new()
            .route(
                "/version",
                get(|| async {
                    Json(VersionInfo {
                        version: env!("CARGO_PKG_VERSION"),
                    })
                }),
            )
            .route(
                "/features",
                get(move || {
                    let registry = registry.clone();
                    async move { Json(features(&registry)) }
                }),
            ))
    }
}

/// Sorted names of running plugins, excluding this one.
fn features(registry: &Weak<PluginRegistry>) -> Vec<String> {
    let mut names = registry
        .upgrade()
        .map(|registry| registry.running())
        .unwrap_or_default();
    names.retain(|name| name != RootPlugin::NAME);
    names.sort();
    names
}
