//! Launch orchestration.
//!
//! # Data Flow
//! ```text
//! INIT → VALIDATING → PLUGIN_INIT → BUILDING → STARTING → RUNNING
//!            │             │            │           │
//!            └─────────────┴────────────┴───────────┴──→ FAILED
//! ```
//!
//! # Design Decisions
//! - Fail fast: any error on an enabled protocol aborts the whole launch
//! - TLS material and pipelines are built before any socket is bound
//! - Signal handling is installed only once listeners have been started
//! - The launcher returns as soon as any listener stops

use std::sync::Arc;

use crate::config::validation::validate_config;
use crate::config::{Protocol, ProxyConfig};
use crate::http::ServerSettings;
use crate::lifecycle::{
    ReadinessNotifier, Shutdown, ShutdownCause, SignalTrap, StartupCoordinator,
};
use crate::net::listener::{ListenerError, ListenerFactory};
use crate::net::tls::{load_tls_policy, TlsError};
use crate::plugins::{compose, select, PluginError, PluginRegistry};

/// Where the launcher is in its startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchPhase {
    Init,
    Validating,
    PluginInit,
    Building,
    Starting,
    Running,
    Failed,
}

impl LaunchPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchPhase::Init => "init",
            LaunchPhase::Validating => "validating",
            LaunchPhase::PluginInit => "plugin_init",
            LaunchPhase::Building => "building",
            LaunchPhase::Starting => "starting",
            LaunchPhase::Running => "running",
            LaunchPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for LaunchPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a launch ended.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("TLS material error: {0}")]
    TlsMaterial(#[from] TlsError),

    #[error("plugin initialization failed: {0}")]
    PluginInit(PluginError),

    #[error("unable to compose {protocol} pipeline: {source}")]
    PluginComposition {
        protocol: Protocol,
        #[source]
        source: PluginError,
    },

    #[error(transparent)]
    Listener(#[from] ListenerError),

    /// Clean stop requested by an OS signal.
    #[error("interrupted by {0}")]
    Interrupted(&'static str),

    /// A plugin asked for the process to exit with this status.
    #[error("exit requested with status {0}")]
    Exit(u8),
}

impl From<PluginError> for LaunchError {
    fn from(e: PluginError) -> Self {
        match e {
            PluginError::Exit { code, .. } => LaunchError::Exit(code),
            other => LaunchError::PluginInit(other),
        }
    }
}

/// Result type for launcher operations.
pub type LaunchResult<T> = Result<T, LaunchError>;

/// Drives the proxy from settings to running listeners.
pub struct Launcher {
    config: ProxyConfig,
    registry: Arc<PluginRegistry>,
    notifier: Arc<dyn ReadinessNotifier>,
    signals: Arc<dyn SignalTrap>,
    shutdown: Shutdown,
    phase: LaunchPhase,
}

impl Launcher {
    pub fn new(
        config: ProxyConfig,
        registry: Arc<PluginRegistry>,
        notifier: Arc<dyn ReadinessNotifier>,
        signals: Arc<dyn SignalTrap>,
    ) -> Self {
        Self {
            config,
            registry,
            notifier,
            signals,
            shutdown: Shutdown::new(),
            phase: LaunchPhase::Init,
        }
    }

    pub fn phase(&self) -> LaunchPhase {
        self.phase
    }

    /// Handle for stopping a running launch from elsewhere.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Launch and block until the first listener stops.
    ///
    /// Returns `Interrupted` when a signal stopped the listeners.
    pub async fn run(&mut self) -> LaunchResult<()> {
        let result = self.launch().await;

        self.shutdown.trigger();
        self.registry.stop_all();

        if let Err(e) = &result {
            if !matches!(e, LaunchError::Interrupted(_)) {
                tracing::error!(phase = %self.phase, error = %e, "Launch failed");
                self.enter(LaunchPhase::Failed);
            }
        }
        result
    }

    fn enter(&mut self, phase: LaunchPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "Launcher phase change");
        self.phase = phase;
    }

    async fn launch(&mut self) -> LaunchResult<()> {
        self.enter(LaunchPhase::Validating);
        let protocols = self.validate()?;

        self.enter(LaunchPhase::PluginInit);
        let running = self.registry.initialize()?;
        tracing::info!(plugins = running, "Plugins initialized");

        self.enter(LaunchPhase::Building);
        let selection = select(&self.registry);
        let factory = ListenerFactory::new(&self.config);
        let mut specs = Vec::with_capacity(protocols.len());
        for protocol in protocols {
            let pipeline = compose(protocol, selection.for_protocol(protocol))
                .map_err(|source| LaunchError::PluginComposition { protocol, source })?;

            let policy = match protocol {
                Protocol::Http => None,
                Protocol::Https => match self.config.https_settings() {
                    Some(settings) => Some(load_tls_policy(&settings)?),
                    None => None,
                },
            };

            specs.push(factory.build(protocol, pipeline, policy)?);
        }

        self.enter(LaunchPhase::Starting);
        let coordinator =
            StartupCoordinator::new(self.notifier.clone(), ServerSettings::from(&self.config));
        let specs = coordinator.install(specs);
        let mut listeners = coordinator.start(specs, &self.shutdown);
        self.signals.install(self.shutdown.clone());

        self.enter(LaunchPhase::Running);
        tracing::info!(listeners = listeners.len(), "Proxy running");
        let first = listeners.wait_any().await;

        let cause = self.shutdown.cause();
        self.shutdown.trigger();
        listeners.drain().await;

        match (first, cause) {
            (Some((_, Err(e))), _) => Err(e.into()),
            (_, Some(ShutdownCause::Signal(signal))) => Err(LaunchError::Interrupted(signal)),
            (Some((protocol, Ok(()))), _) => {
                tracing::info!(protocol = %protocol, "Listener stopped, shutting down");
                Ok(())
            }
            (None, _) => Ok(()),
        }
    }

    /// Check the settings and return the protocols that apply.
    fn validate(&self) -> LaunchResult<Vec<Protocol>> {
        if let Err(errors) = validate_config(&self.config) {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LaunchError::Configuration(message));
        }

        if self.config.https_incomplete() {
            tracing::warn!("HTTPS port set without key, certificate and CA file, HTTPS disabled");
        }

        let factory = ListenerFactory::new(&self.config);
        let protocols: Vec<Protocol> = [Protocol::Http, Protocol::Https]
            .into_iter()
            .filter(|protocol| factory.applicable(*protocol))
            .collect();

        if protocols.is_empty() {
            return Err(LaunchError::Configuration(
                "both HTTP and HTTPS are disabled".into(),
            ));
        }
        tracing::info!(protocols = ?protocols, "Protocols enabled");
        Ok(protocols)
    }
}
