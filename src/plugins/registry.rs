//! Plugin registry and lifecycle state.
//!
//! # State Transitions
//! ```text
//! registered → initializing → running
//!                           ↘ failed
//! registered → stopped            (plugin disabled)
//! running → stopped               (proxy shut down)
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::Protocol;
use crate::plugins::{Plugin, PluginError, PluginResult};

/// Lifecycle state of a registered plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Registered,
    Initializing,
    Running,
    Failed,
    Stopped,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginState::Registered => "registered",
            PluginState::Initializing => "initializing",
            PluginState::Running => "running",
            PluginState::Failed => "failed",
            PluginState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered plugin together with its current state.
#[derive(Clone)]
pub struct PluginHandle {
    plugin: Arc<dyn Plugin>,
    state: PluginState,
}

impl PluginHandle {
    pub fn name(&self) -> &str {
        self.plugin.name()
    }

    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn http_eligible(&self) -> bool {
        self.plugin.eligible(Protocol::Http)
    }

    pub fn https_eligible(&self) -> bool {
        self.plugin.eligible(Protocol::Https)
    }

    pub fn plugin(&self) -> &Arc<dyn Plugin> {
        &self.plugin
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("name", &self.name())
            .field("state", &self.state)
            .finish()
    }
}

/// Ordered collection of plugins known to the proxy.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Mutex<Vec<PluginHandle>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PluginHandle>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a plugin in the `registered` state. Names must be unique.
    pub fn register(&self, plugin: Arc<dyn Plugin>) -> PluginResult<()> {
        let mut entries = self.lock();
        if entries.iter().any(|e| e.name() == plugin.name()) {
            return Err(PluginError::Duplicate(plugin.name().to_string()));
        }
        tracing::debug!(plugin = plugin.name(), "Plugin registered");
        entries.push(PluginHandle {
            plugin,
            state: PluginState::Registered,
        });
        Ok(())
    }

    /// Snapshot of every plugin, in registration order.
    pub fn handles(&self) -> Vec<PluginHandle> {
        self.lock().clone()
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.lock().iter().find(|e| e.name() == name).map(|e| e.state)
    }

    /// Names of the plugins currently running.
    pub fn running(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|e| e.state == PluginState::Running)
            .map(|e| e.name().to_string())
            .collect()
    }

    fn set_state(&self, name: &str, state: PluginState) {
        if let Some(entry) = self.lock().iter_mut().find(|e| e.name() == name) {
            entry.state = state;
        }
    }

    /// Start every registered plugin in registration order.
    ///
    /// Disabled plugins move straight to `stopped`. The first plugin that
    /// fails to start is marked `failed` and its error is returned.
    /// Returns the number of running plugins.
    pub fn initialize(&self) -> PluginResult<usize> {
        let pending: Vec<Arc<dyn Plugin>> = self
            .lock()
            .iter()
            .filter(|e| e.state == PluginState::Registered)
            .map(|e| e.plugin.clone())
            .collect();

        for plugin in pending {
            let name = plugin.name();
            if !plugin.enabled() {
                tracing::info!(plugin = name, "Plugin disabled");
                self.set_state(name, PluginState::Stopped);
                continue;
            }

            self.set_state(name, PluginState::Initializing);
            // Plugin code runs without the registry lock held.
            match plugin.start() {
                Ok(()) => {
                    tracing::info!(plugin = name, "Plugin started");
                    self.set_state(name, PluginState::Running);
                }
                Err(e) => {
                    tracing::error!(plugin = name, error = %e, "Plugin failed to start");
                    self.set_state(name, PluginState::Failed);
                    return Err(e);
                }
            }
        }

        Ok(self.running().len())
    }

    /// Move every running plugin to `stopped`.
    pub fn stop_all(&self) {
        for entry in self.lock().iter_mut() {
            if entry.state == PluginState::Running {
                entry.state = PluginState::Stopped;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::plugins::Mount;

    /// Configurable plugin used across the crate's unit tests.
    pub struct TestPlugin {
        pub name: &'static str,
        pub http: bool,
        pub https: bool,
        pub enabled: bool,
        pub fail_start: bool,
        pub exit_code: Option<u8>,
        pub routes: Vec<&'static str>,
    }

    impl TestPlugin {
        pub fn new(name: &'static str, http: bool, https: bool) -> Self {
            Self {
                name,
                http,
                https,
                enabled: true,
                fail_start: false,
                exit_code: None,
                routes: Vec::new(),
            }
        }
    }

    impl Plugin for TestPlugin {
        fn name(&self) -> &str {
            self.name
        }

        fn eligible(&self, protocol: Protocol) -> bool {
            match protocol {
                Protocol::Http => self.http,
                Protocol::Https => self.https,
            }
        }

        fn enabled(&self) -> bool {
            self.enabled
        }

        fn start(&self) -> PluginResult<()> {
            if let Some(code) = self.exit_code {
                return Err(PluginError::Exit {
                    plugin: self.name.to_string(),
                    code,
                });
            }
            if self.fail_start {
                Err(PluginError::Start {
                    plugin: self.name.to_string(),
                    reason: "boom".into(),
                })
            } else {
                Ok(())
            }
        }

        fn mount(&self, _protocol: Protocol) -> PluginResult<Mount> {
            let name = self.name;
            Ok(self.routes.iter().fold(Mount::new(), |mount, path| {
                mount.route(path, axum::routing::get(move || async move { name }))
            }))
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin::new("dns", true, true))).unwrap();
        let err = registry
            .register(Arc::new(TestPlugin::new("dns", true, false)))
            .unwrap_err();
        assert_eq!(err, PluginError::Duplicate("dns".into()));
        assert_eq!(registry.handles().len(), 1);
    }

    #[test]
    fn initialize_walks_lifecycle() {
        let registry = PluginRegistry::new();
        let mut disabled = TestPlugin::new("tftp", true, true);
        disabled.enabled = false;
        registry.register(Arc::new(TestPlugin::new("dns", true, true))).unwrap();
        registry.register(Arc::new(disabled)).unwrap();

        assert_eq!(registry.state("dns"), Some(PluginState::Registered));
        assert_eq!(registry.initialize().unwrap(), 1);
        assert_eq!(registry.state("dns"), Some(PluginState::Running));
        assert_eq!(registry.state("tftp"), Some(PluginState::Stopped));
        assert_eq!(registry.running(), vec!["dns".to_string()]);

        registry.stop_all();
        assert_eq!(registry.state("dns"), Some(PluginState::Stopped));
    }

    #[test]
    fn start_failure_marks_plugin_failed() {
        let registry = PluginRegistry::new();
        let mut broken = TestPlugin::new("dhcp", true, true);
        broken.fail_start = true;
        registry.register(Arc::new(broken)).unwrap();
        registry.register(Arc::new(TestPlugin::new("dns", true, true))).unwrap();

        let err = registry.initialize().unwrap_err();
        assert!(matches!(err, PluginError::Start { ref plugin, .. } if plugin == "dhcp"));
        assert_eq!(registry.state("dhcp"), Some(PluginState::Failed));
        assert_eq!(registry.state("dns"), Some(PluginState::Registered));
    }
}
