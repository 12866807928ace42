//! Plugin proxy daemon.
//!
//! # Architecture Overview
//!
//! ```text
//!   settings.toml ──▶ config ──▶ Launcher
//!                                  │
//!            ┌─────────────────────┼──────────────────────┐
//!            ▼                     ▼                      ▼
//!      PluginRegistry         net::tls              net::listener
//!   (initialize, select)   (TLS material,         (bind addresses,
//!            │              cipher/version         listener specs)
//!            ▼                 policy)                    │
//!      plugins::compose ───────────┴──────────────────────┤
//!                                                         ▼
//!                                          StartupCoordinator (latch)
//!                                           │                    │
//!                                     HTTP listener       HTTPS listener
//!                                           └────── ready ───────┘
//!                                                     │
//!                                              $NOTIFY_SOCKET
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use plugin_proxy::config::{load_config, ObservabilityConfig, ProxyConfig};
use plugin_proxy::lifecycle::{LaunchError, Launcher, SystemdNotifier, TokioSignalTrap};
use plugin_proxy::observability::{logging, metrics};
use plugin_proxy::plugins::{PluginRegistry, RootPlugin};

#[derive(Parser)]
#[command(name = "plugin-proxy")]
#[command(about = "Serve plugin routes over HTTP and HTTPS", long_about = None)]
struct Cli {
    /// Settings file (TOML). Built-in defaults apply when omitted.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,
}

/// Load the settings file, or fall back to defaults when none is given.
///
/// A load failure is logged with the default filter and echoed to stderr.
fn load_settings(path: Option<&Path>) -> Result<ProxyConfig, ExitCode> {
    let Some(path) = path else {
        return Ok(ProxyConfig::default());
    };

    load_config(path).map_err(|e| {
        logging::init_logging(&ObservabilityConfig::default());
        tracing::error!(path = %path.display(), error = %e, "Unable to load settings");
        eprintln!("plugin-proxy: unable to load {}: {e}", path.display());
        ExitCode::FAILURE
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_settings(cli.config.as_deref()) {
        Ok(config) => config,
        Err(code) => return code,
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "plugin-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let registry = Arc::new(PluginRegistry::new());
    if let Err(e) = registry.register(Arc::new(RootPlugin::new(Arc::downgrade(&registry)))) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    let mut launcher = Launcher::new(
        config,
        registry,
        Arc::new(SystemdNotifier::from_env()),
        Arc::new(TokioSignalTrap),
    );

    match launcher.run().await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(LaunchError::Interrupted(signal)) => {
            tracing::info!(signal, "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(LaunchError::Exit(code)) => ExitCode::from(code),
        Err(e) => {
            tracing::error!(error = %e, "plugin-proxy failed to start");
            eprintln!("plugin-proxy: {e}");
            ExitCode::FAILURE
        }
    }
}
