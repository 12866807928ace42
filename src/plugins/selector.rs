//! Plugin selection by protocol eligibility.

use std::sync::Arc;

use crate::config::Protocol;
use crate::plugins::{Plugin, PluginRegistry, PluginState};

/// Running plugins split by the protocols they serve.
#[derive(Default)]
pub struct Selection {
    pub http: Vec<Arc<dyn Plugin>>,
    pub https: Vec<Arc<dyn Plugin>>,
}

impl Selection {
    pub fn for_protocol(&self, protocol: Protocol) -> &[Arc<dyn Plugin>] {
        match protocol {
            Protocol::Http => &self.http,
            Protocol::Https => &self.https,
        }
    }
}

/// Pick the running plugins eligible for each protocol, keeping registry order.
pub fn select(registry: &PluginRegistry) -> Selection {
    let mut selection = Selection::default();

    for handle in registry.handles() {
        if handle.state() != PluginState::Running {
            continue;
        }
        if handle.http_eligible() {
            selection.http.push(handle.plugin().clone());
        }
        if handle.https_eligible() {
            selection.https.push(handle.plugin().clone());
        }
    }

    tracing::debug!(
        http = selection.http.len(),
        https = selection.https.len(),
        "Plugins selected"
    );
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::registry::tests::TestPlugin;

    fn names(plugins: &[Arc<dyn Plugin>]) -> Vec<&str> {
        plugins.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn partitions_running_plugins_in_registry_order() {
        let registry = PluginRegistry::new();
        let mut disabled = TestPlugin::new("puppet", true, true);
        disabled.enabled = false;

        registry.register(Arc::new(TestPlugin::new("tftp", true, false))).unwrap();
        registry.register(Arc::new(TestPlugin::new("dns", true, true))).unwrap();
        registry.register(Arc::new(disabled)).unwrap();
        registry.register(Arc::new(TestPlugin::new("bmc", false, true))).unwrap();
        registry.register(Arc::new(TestPlugin::new("logs", false, false))).unwrap();
        registry.initialize().unwrap();

        let selection = select(&registry);
        assert_eq!(names(&selection.http), vec!["tftp", "dns"]);
        assert_eq!(names(&selection.https), vec!["dns", "bmc"]);
        assert_eq!(names(selection.for_protocol(Protocol::Https)), vec!["dns", "bmc"]);
    }

    #[test]
    fn nothing_selected_before_initialization() {
        let registry = PluginRegistry::new();
        registry.register(Arc::new(TestPlugin::new("dns", true, true))).unwrap();
        let selection = select(&registry);
        assert!(selection.http.is_empty());
        assert!(selection.https.is_empty());
    }
}
