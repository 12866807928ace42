//! Listener descriptors.
//!
//! # Responsibilities
//! - Decide whether a protocol applies to the current settings
//! - Resolve the configured bind hosts into socket addresses
//! - Pair a composed pipeline with its addresses and TLS termination
//!
//! # Design Decisions
//! - "Not applicable" is `Ok(None)`, never an error
//! - The startup callback slot is left empty; the startup coordinator owns it

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use rustls::ServerConfig;

use crate::config::{Protocol, ProxyConfig};
use crate::net::tls::{TlsError, TlsPolicy};
use crate::plugins::Pipeline;

/// Invoked once by a listener after all of its sockets are bound.
pub type StartupCallback = Box<dyn FnOnce() + Send + 'static>;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Bind host could not be resolved.
    #[error("unable to resolve bind host '{host}': {source}")]
    Resolve {
        host: String,
        #[source]
        source: std::io::Error,
    },

    /// Bind host resolved to nothing.
    #[error("bind host '{0}' resolved to no addresses")]
    NoAddresses(String),

    /// HTTPS requested without TLS material.
    #[error("HTTPS listener requires a TLS policy")]
    MissingTlsPolicy,

    /// TLS policy could not be turned into a server config.
    #[error(transparent)]
    Tls(#[from] TlsError),

    /// Failed to bind to address.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The listener's accept loop failed.
    #[error("{protocol} listener failed: {source}")]
    Serve {
        protocol: Protocol,
        #[source]
        source: std::io::Error,
    },

    /// The listener task panicked or was cancelled.
    #[error("{0} listener task aborted")]
    Aborted(Protocol),
}

/// Result type for listener operations.
pub type ListenerResult<T> = Result<T, ListenerError>;

/// TLS material plus the rustls config derived from it.
#[derive(Debug)]
pub struct TlsTermination {
    pub policy: TlsPolicy,
    pub server_config: Arc<ServerConfig>,
}

/// Everything needed to start one listener.
pub struct ListenerSpec {
    pub protocol: Protocol,
    pub pipeline: Pipeline,
    pub addresses: Vec<SocketAddr>,
    pub port: u16,
    pub tls: Option<TlsTermination>,
    pub on_bound: Option<StartupCallback>,
}

impl std::fmt::Debug for ListenerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerSpec")
            .field("protocol", &self.protocol)
            .field("pipeline", &self.pipeline)
            .field("addresses", &self.addresses)
            .field("port", &self.port)
            .field("tls", &self.tls.is_some())
            .field("on_bound", &self.on_bound.is_some())
            .finish()
    }
}

/// Builds listener descriptors from the proxy settings.
pub struct ListenerFactory<'a> {
    config: &'a ProxyConfig,
}

impl<'a> ListenerFactory<'a> {
    pub fn new(config: &'a ProxyConfig) -> Self {
        Self { config }
    }

    /// Whether the settings enable `protocol` at all.
    pub fn applicable(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Http => self.config.http_settings().is_some(),
            Protocol::Https => self.config.https_settings().is_some(),
        }
    }

    /// Build the descriptor for `protocol`, or `Ok(None)` when it does not apply.
    pub fn build(
        &self,
        protocol: Protocol,
        pipeline: Pipeline,
        policy: Option<TlsPolicy>,
    ) -> ListenerResult<Option<ListenerSpec>> {
        let (port, bind_host, tls) = match protocol {
            Protocol::Http => match self.config.http_settings() {
                Some(settings) => (settings.port, settings.bind_host, None),
                None => return Ok(None),
            },
            Protocol::Https => match self.config.https_settings() {
                Some(settings) => {
                    let policy = policy.ok_or(ListenerError::MissingTlsPolicy)?;
                    let server_config = policy.server_config()?;
                    let tls = TlsTermination {
                        policy,
                        server_config,
                    };
                    (settings.port, settings.bind_host, Some(tls))
                }
                None => return Ok(None),
            },
        };

        let addresses = resolve_bind_addresses(&bind_host, port)?;
        tracing::debug!(protocol = %protocol, addresses = ?addresses, "Listener built");

        Ok(Some(ListenerSpec {
            protocol,
            pipeline,
            addresses,
            port,
            tls,
            on_bound: None,
        }))
    }
}

/// Resolve bind hosts to socket addresses, dropping duplicates.
///
/// `*` stands for every IPv4 interface.
pub fn resolve_bind_addresses(hosts: &[String], port: u16) -> ListenerResult<Vec<SocketAddr>> {
    let mut addresses: Vec<SocketAddr> = Vec::new();

    for host in hosts {
        let host = host.trim();
        let resolved: Vec<SocketAddr> = if host == "*" {
            vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)]
        } else if let Ok(ip) = host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>() {
            vec![SocketAddr::new(ip, port)]
        } else {
            (host, port)
                .to_socket_addrs()
                .map_err(|source| ListenerError::Resolve {
                    host: host.to_string(),
                    source,
                })?
                .collect()
        };

        if resolved.is_empty() {
            return Err(ListenerError::NoAddresses(host.to_string()));
        }
        for addr in resolved {
            if !addresses.contains(&addr) {
                addresses.push(addr);
            }
        }
    }

    Ok(addresses)
}
