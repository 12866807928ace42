//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use tokio::sync::Notify;

use plugin_proxy::config::{Protocol, ProxyConfig};
use plugin_proxy::lifecycle::{Launcher, NoSignalTrap, ReadinessNotifier};
use plugin_proxy::plugins::{Mount, Plugin, PluginRegistry, PluginResult, RootPlugin};

/// Path of a file under `tests/fixtures/tls`.
pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures/tls")
        .join(name)
}

/// Ask the OS for a port nobody is listening on.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Settings with only the plain HTTP listener on loopback.
pub fn http_config(port: u16) -> ProxyConfig {
    ProxyConfig {
        http_port: Some(port),
        https_port: None,
        bind_host: vec!["127.0.0.1".into()],
        shutdown_grace_secs: 1,
        ..ProxyConfig::default()
    }
}

/// Settings with both listeners, using the fixture certificates.
pub fn dual_config(http_port: u16, https_port: u16) -> ProxyConfig {
    ProxyConfig {
        https_port: Some(https_port),
        ssl_private_key: Some(fixture("server.key")),
        ssl_certificate: Some(fixture("server.pem")),
        ssl_ca_file: Some(fixture("ca.pem")),
        foreman_ssl_ca: Some(fixture("bundle.pem")),
        ..http_config(http_port)
    }
}

/// Counts readiness notifications and lets tests wait for the first one.
#[derive(Default)]
pub struct RecordingNotifier {
    calls: AtomicUsize,
    notify: Notify,
}

impl RecordingNotifier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wait up to five seconds for readiness; returns whether it arrived.
    pub async fn wait_ready(&self) -> bool {
        tokio::time::timeout(Duration::from_secs(5), self.notify.notified())
            .await
            .is_ok()
    }
}

impl ReadinessNotifier for RecordingNotifier {
    fn notify_ready(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

/// Plugin answering `GET {route}` (default `/echo`) with its own name.
pub struct EchoPlugin {
    pub name: &'static str,
    pub route: &'static str,
    pub http: bool,
    pub https: bool,
}

impl EchoPlugin {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            route: "/echo",
            http: true,
            https: true,
        }
    }
}

impl Plugin for EchoPlugin {
    fn name(&self) -> &str {
        self.name
    }

    fn eligible(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Http => self.http,
            Protocol::Https => self.https,
        }
    }

    fn mount(&self, _protocol: Protocol) -> PluginResult<Mount> {
        let name = self.name;
        Ok(Mount::new().route(self.route, get(move || async move { name })))
    }
}

/// Registry holding the root plugin plus `plugins`, in order.
pub fn registry(plugins: Vec<Arc<dyn Plugin>>) -> Arc<PluginRegistry> {
    let registry = Arc::new(PluginRegistry::new());
    registry
        .register(Arc::new(RootPlugin::new(Arc::downgrade(&registry))))
        .unwrap();
    for plugin in plugins {
        registry.register(plugin).unwrap();
    }
    registry
}

/// Launcher wired to a recording notifier and no OS signal handling.
pub fn launcher(
    config: ProxyConfig,
    registry: Arc<PluginRegistry>,
) -> (Launcher, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let launcher = Launcher::new(config, registry, notifier.clone(), Arc::new(NoSignalTrap));
    (launcher, notifier)
}

/// HTTPS client trusting the fixture CA.
pub fn https_client() -> reqwest::Client {
    let ca = std::fs::read(fixture("ca.pem")).unwrap();
    reqwest::Client::builder()
        .add_root_certificate(reqwest::Certificate::from_pem(&ca).unwrap())
        .build()
        .unwrap()
}
