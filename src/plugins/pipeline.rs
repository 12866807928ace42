//! Pipeline composition.
//!
//! Each eligible plugin contributes a [`Mount`]: a prefix plus a list of
//! routes. The builder validates every contribution against the routes
//! already mounted before adding it to the router, so a conflict surfaces as
//! an error instead of a router panic.

use std::collections::HashMap;
use std::sync::Arc;

use axum::routing::MethodRouter;
use axum::Router;

use crate::config::Protocol;
use crate::observability::metrics;
use crate::plugins::{Plugin, PluginError, PluginResult};

/// Declarative route contribution of one plugin.
pub struct Mount {
    prefix: String,
    routes: Vec<(String, MethodRouter)>,
}

impl Mount {
    /// Routes mounted at the root.
    pub fn new() -> Self {
        Self::at("/")
    }

    /// Routes mounted below `prefix`.
    pub fn at(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            routes: Vec::new(),
        }
    }

    pub fn route(mut self, path: &str, method_router: MethodRouter) -> Self {
        self.routes.push((path.to_string(), method_router));
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full paths this mount will register.
    pub fn paths(&self) -> Vec<String> {
        self.routes
            .iter()
            .map(|(path, _)| join_path(&self.prefix, path))
            .collect()
    }
}

impl Default for Mount {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulates plugin mounts into a single router.
pub struct PipelineBuilder {
    protocol: Protocol,
    router: Router,
    owners: HashMap<String, String>,
    plugins: Vec<String>,
}

impl PipelineBuilder {
    pub fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            router: Router::new(),
            owners: HashMap::new(),
            plugins: Vec::new(),
        }
    }

    /// Validate and add one plugin's routes.
    pub fn mount(&mut self, plugin: &str, mount: Mount) -> PluginResult<()> {
        if !valid_path(&mount.prefix) {
            return Err(PluginError::InvalidPath {
                plugin: plugin.to_string(),
                path: mount.prefix.clone(),
            });
        }

        let mut claimed: HashMap<String, String> = HashMap::new();
        for (path, _) in &mount.routes {
            let full = join_path(&mount.prefix, path);
            if !valid_path(path) || !valid_path(&full) {
                return Err(PluginError::InvalidPath {
                    plugin: plugin.to_string(),
                    path: full,
                });
            }

            let key = route_key(&full);
            let owner = self
                .owners
                .get(&key)
                .map(String::as_str)
                .or_else(|| claimed.contains_key(&key).then_some(plugin));
            if let Some(owner) = owner {
                return Err(PluginError::RouteConflict {
                    plugin: plugin.to_string(),
                    path: full,
                    owner: owner.to_string(),
                });
            }
            claimed.insert(key, full);
        }

        let mut router = std::mem::replace(&mut self.router, Router::new());
        for (path, method_router) in mount.routes {
            router = router.route(&join_path(&mount.prefix, &path), method_router);
        }
        self.router = router;

        self.owners
            .extend(claimed.into_keys().map(|key| (key, plugin.to_string())));
        self.plugins.push(plugin.to_string());
        Ok(())
    }

    pub fn finish(self) -> Pipeline {
        Pipeline {
            protocol: self.protocol,
            router: self.router,
            plugins: self.plugins,
        }
    }
}

/// The composed request handler for one protocol.
pub struct Pipeline {
    protocol: Protocol,
    router: Router,
    plugins: Vec<String>,
}

impl Pipeline {
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Names of the mounted plugins, in mount order.
    pub fn plugins(&self) -> &[String] {
        &self.plugins
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("protocol", &self.protocol)
            .field("plugins", &self.plugins)
            .finish()
    }
}

/// Mount every plugin, in order, into one pipeline for `protocol`.
///
/// Fails on the first plugin that cannot be mounted.
pub fn compose(protocol: Protocol, plugins: &[Arc<dyn Plugin>]) -> PluginResult<Pipeline> {
    let mut builder = PipelineBuilder::new(protocol);

    for plugin in plugins {
        let mount = plugin.mount(protocol).and_then(|mount| builder.mount(plugin.name(), mount));
        if let Err(e) = mount {
            tracing::error!(plugin = plugin.name(), protocol = %protocol, error = %e, "Unable to mount plugin");
            return Err(e);
        }
        metrics::record_plugin_mounted(protocol);
        tracing::debug!(plugin = plugin.name(), protocol = %protocol, "Plugin mounted");
    }

    let pipeline = builder.finish();
    tracing::info!(protocol = %protocol, plugins = ?pipeline.plugins(), "Pipeline composed");
    Ok(pipeline)
}

fn join_path(prefix: &str, path: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    match (prefix.is_empty(), path) {
        (true, _) => path.to_string(),
        (false, "/") => prefix.to_string(),
        (false, _) => format!("{prefix}{path}"),
    }
}

/// Paths accepted here never make the router panic.
///
/// A parameter fills its whole segment (`{name}`), and a catch-all
/// (`{*name}`) may only be the last segment.
fn valid_path(path: &str) -> bool {
    if !path.starts_with('/') {
        return false;
    }
    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let last = segments.len().saturating_sub(1);
    segments
        .iter()
        .enumerate()
        .all(|(index, segment)| valid_segment(segment, index == last))
}

fn valid_segment(segment: &str, last: bool) -> bool {
    if segment.starts_with(':') || segment.starts_with('*') {
        return false;
    }
    if !segment.contains(['{', '}']) {
        return true;
    }

    let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        return false;
    };
    let (name, catch_all) = match inner.strip_prefix('*') {
        Some(name) => (name, true),
        None => (inner, false),
    };
    !name.is_empty() && !name.contains(['{', '}', '*']) && (last || !catch_all)
}

/// Paths that differ only in parameter names collide in the router.
fn route_key(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("{*") && segment.ends_with('}') {
                "{*}"
            } else if segment.starts_with('{') && segment.ends_with('}') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
