//! Configuration schema definitions.
//!
//! This module defines the settings the launcher reads. All types derive Serde
//! traits for deserialization from the settings file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration for the proxy daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Plain HTTP port. `None` disables the HTTP listener.
    pub http_port: Option<u16>,

    /// HTTPS port. HTTPS additionally needs key, certificate and CA paths.
    pub https_port: Option<u16>,

    /// Addresses or host names to bind every listener on. `*` means all
    /// IPv4 interfaces.
    pub bind_host: Vec<String>,

    /// Path to the PEM private key for the HTTPS listener.
    pub ssl_private_key: Option<PathBuf>,

    /// Path to the PEM leaf certificate for the HTTPS listener.
    pub ssl_certificate: Option<PathBuf>,

    /// Path to the PEM CA bundle used to verify client certificates.
    pub ssl_ca_file: Option<PathBuf>,

    /// Path to the PEM bundle of intermediate certificates sent after the leaf.
    pub foreman_ssl_ca: Option<PathBuf>,

    /// TLS versions to disable, e.g. `["1.2"]`.
    pub tls_disabled_versions: Vec<String>,

    /// Cipher suites to remove from the preferred list.
    pub ssl_disabled_ciphers: Vec<String>,

    /// Request timeout applied to every pipeline, in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// How long listeners may drain in-flight requests on shutdown.
    pub shutdown_grace_secs: u64,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            http_port: None,
            https_port: Some(8443),
            bind_host: vec!["*".to_string()],
            ssl_private_key: None,
            ssl_certificate: None,
            ssl_ca_file: None,
            foreman_ssl_ca: None,
            tls_disabled_versions: Vec::new(),
            ssl_disabled_ciphers: Vec::new(),
            request_timeout_secs: 60,
            max_body_size: 2 * 1024 * 1024, // 2MB
            shutdown_grace_secs: 10,
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// The two protocols a listener can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings relevant to the plain HTTP listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub port: u16,
    pub bind_host: Vec<String>,
}

/// Settings relevant to the HTTPS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpsSettings {
    pub port: u16,
    pub bind_host: Vec<String>,
    pub private_key: PathBuf,
    pub certificate: PathBuf,
    pub ca_file: PathBuf,
    pub chain_bundle: Option<PathBuf>,
    pub disabled_versions: Vec<String>,
    pub disabled_ciphers: Vec<String>,
}

impl ProxyConfig {
    /// HTTP view, or `None` when no HTTP port is configured.
    pub fn http_settings(&self) -> Option<HttpSettings> {
        self.http_port.map(|port| HttpSettings {
            port,
            bind_host: self.bind_host.clone(),
        })
    }

    /// HTTPS view, or `None` unless port, key, certificate and CA are all set.
    pub fn https_settings(&self) -> Option<HttpsSettings> {
        Some(HttpsSettings {
            port: self.https_port?,
            bind_host: self.bind_host.clone(),
            private_key: self.ssl_private_key.clone()?,
            certificate: self.ssl_certificate.clone()?,
            ca_file: self.ssl_ca_file.clone()?,
            chain_bundle: self.foreman_ssl_ca.clone(),
            disabled_versions: self.tls_disabled_versions.clone(),
            disabled_ciphers: self.ssl_disabled_ciphers.clone(),
        })
    }

    /// True when an HTTPS port is set but some TLS material path is missing.
    pub fn https_incomplete(&self) -> bool {
        self.https_port.is_some() && self.https_settings().is_none()
    }
}
