//! TLS material loading and listener hardening policy.
//!
//! # Responsibilities
//! - Load the private key, leaf certificate and intermediate bundle from disk
//! - Load the CA bundle used to verify client certificates
//! - Resolve the cipher preference list and disabled protocol versions
//! - Build the rustls `ServerConfig` used by the HTTPS listener
//!
//! # Design Decisions
//! - Key and certificate failures are fatal, a missing CA only logs
//! - Bundles are split on the PEM end marker and parsed one record at a time
//! - Unknown version identifiers are skipped with a warning

use std::collections::HashSet;
use std::fs;
use std::ops::{BitOr, BitOrAssign};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ParsedCertificate, WebPkiClientVerifier};
use rustls::{RootCertStore, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};

use crate::config::HttpsSettings;

const END_CERTIFICATE: &str = "-----END CERTIFICATE-----";

/// Cipher suites in server preference order.
pub const PREFERRED_CIPHERS: &[&str] = &[
    "TLS13_AES_256_GCM_SHA384",
    "TLS13_AES_128_GCM_SHA256",
    "TLS13_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
    "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
    "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
    "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
];

/// OpenSSL spellings accepted in `ssl_disabled_ciphers`.
const OPENSSL_ALIASES: &[(&str, &str)] = &[
    ("TLS_AES_256_GCM_SHA384", "TLS13_AES_256_GCM_SHA384"),
    ("TLS_AES_128_GCM_SHA256", "TLS13_AES_128_GCM_SHA256"),
    ("TLS_CHACHA20_POLY1305_SHA256", "TLS13_CHACHA20_POLY1305_SHA256"),
    ("ECDHE-ECDSA-AES256-GCM-SHA384", "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384"),
    ("ECDHE-ECDSA-AES128-GCM-SHA256", "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256"),
    ("ECDHE-ECDSA-CHACHA20-POLY1305", "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256"),
    ("ECDHE-RSA-AES256-GCM-SHA384", "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384"),
    ("ECDHE-RSA-AES128-GCM-SHA256", "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256"),
    ("ECDHE-RSA-CHACHA20-POLY1305", "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256"),
];

/// Version identifiers an operator may disable and the option each sets.
/// Identifiers missing here are unsupported and only produce a warning.
const VERSION_CAPABILITIES: &[(&str, TlsOptions)] = &[
    ("1", TlsOptions::NO_TLSV1),
    ("1.0", TlsOptions::NO_TLSV1),
    ("1.1", TlsOptions::NO_TLSV1_1),
    ("1.2", TlsOptions::NO_TLSV1_2),
    ("1.3", TlsOptions::NO_TLSV1_3),
];

/// Errors raised while loading TLS material or building the server config.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("unable to read {kind} {path}: {source}")]
    Read {
        kind: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to parse {kind} {path}: {reason}")]
    Parse {
        kind: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("every TLS protocol version is disabled")]
    NoProtocolVersions,

    #[error("every cipher suite is disabled")]
    NoCipherSuites,

    #[error("invalid TLS configuration: {0}")]
    Rustls(#[from] rustls::Error),

    #[error("invalid client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),
}

/// Result type for TLS operations.
pub type TlsResult<T> = Result<T, TlsError>;

/// Hardening option bitmask applied to the HTTPS listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsOptions(u32);

impl TlsOptions {
    pub const NO_RENEGOTIATION: Self = Self(1 << 0);
    pub const NO_SSLV2: Self = Self(1 << 1);
    pub const NO_SSLV3: Self = Self(1 << 2);
    pub const NO_TLSV1: Self = Self(1 << 3);
    pub const NO_TLSV1_1: Self = Self(1 << 4);
    pub const NO_TLSV1_2: Self = Self(1 << 5);
    pub const NO_TLSV1_3: Self = Self(1 << 6);
    pub const CIPHER_SERVER_PREFERENCE: Self = Self(1 << 7);

    /// Always applied, regardless of configuration.
    pub const BASELINE: Self = Self(
        Self::NO_RENEGOTIATION.0
            | Self::NO_SSLV2.0
            | Self::NO_SSLV3.0
            | Self::NO_TLSV1.0
            | Self::NO_TLSV1_1.0
            | Self::CIPHER_SERVER_PREFERENCE.0,
    );

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for TlsOptions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TlsOptions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Resolved TLS material and policy for one HTTPS listener.
#[derive(Debug)]
pub struct TlsPolicy {
    /// Effective cipher suites, in server preference order.
    pub ciphers: Vec<&'static str>,
    /// Baseline hardening plus operator-disabled versions.
    pub options: TlsOptions,
    pub private_key: PrivateKeyDer<'static>,
    pub certificate: CertificateDer<'static>,
    /// Intermediates sent after the leaf, in bundle order.
    pub chain: Vec<CertificateDer<'static>>,
    pub ca_file: PathBuf,
    /// Roots for client certificate verification. `None` when the CA file
    /// could not be loaded.
    pub client_roots: Option<Arc<RootCertStore>>,
}

impl TlsPolicy {
    /// Protocol versions left enabled after applying the option mask.
    pub fn protocol_versions(&self) -> Vec<&'static SupportedProtocolVersion> {
        let mut versions = Vec::with_capacity(2);
        if !self.options.contains(TlsOptions::NO_TLSV1_3) {
            versions.push(&rustls::version::TLS13);
        }
        if !self.options.contains(TlsOptions::NO_TLSV1_2) {
            versions.push(&rustls::version::TLS12);
        }
        versions
    }

    /// Build the rustls server configuration for this policy.
    pub fn server_config(&self) -> TlsResult<Arc<ServerConfig>> {
        let base = rustls::crypto::aws_lc_rs::default_provider();
        let cipher_suites: Vec<SupportedCipherSuite> = self
            .ciphers
            .iter()
            .filter_map(|name| {
                base.cipher_suites
                    .iter()
                    .find(|suite| cipher_name(suite) == *name)
                    .copied()
            })
            .collect();
        if cipher_suites.is_empty() {
            return Err(TlsError::NoCipherSuites);
        }

        let versions = self.protocol_versions();
        if versions.is_empty() {
            return Err(TlsError::NoProtocolVersions);
        }

        let provider = Arc::new(CryptoProvider {
            cipher_suites,
            ..base
        });
        let builder = ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&versions)?;

        let builder = match &self.client_roots {
            Some(roots) => {
                let verifier = WebPkiClientVerifier::builder_with_provider(roots.clone(), provider)
                    .allow_unauthenticated()
                    .build()?;
                builder.with_client_cert_verifier(verifier)
            }
            None => builder.with_no_client_auth(),
        };

        let mut chain = Vec::with_capacity(self.chain.len() + 1);
        chain.push(self.certificate.clone());
        chain.extend(self.chain.iter().cloned());

        let mut config = builder.with_single_cert(chain, self.private_key.clone_key())?;
        config.ignore_client_order = self.options.contains(TlsOptions::CIPHER_SERVER_PREFERENCE);
        config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
        Ok(Arc::new(config))
    }
}

/// Load every piece of TLS material named by the HTTPS settings.
pub fn load_tls_policy(settings: &HttpsSettings) -> TlsResult<TlsPolicy> {
    let provider = rustls::crypto::aws_lc_rs::default_provider();

    let private_key = load_private_key(&settings.private_key, &provider).inspect_err(|e| {
        tracing::error!(error = %e, path = ?settings.private_key, "Unable to load private key");
    })?;

    let certificate = load_certificate(&settings.certificate).inspect_err(|e| {
        tracing::error!(error = %e, path = ?settings.certificate, "Unable to load certificate");
    })?;

    let chain = match &settings.chain_bundle {
        Some(path) => load_certificate_bundle(path, "certificate chain").inspect_err(|e| {
            tracing::error!(error = %e, path = ?path, "Unable to load certificate chain");
        })?,
        None => Vec::new(),
    };

    let client_roots = load_client_roots(&settings.ca_file);

    let (version_options, _) = resolve_disabled_versions(&settings.disabled_versions);
    let ciphers = filter_ciphers(PREFERRED_CIPHERS, &settings.disabled_ciphers);

    tracing::debug!(
        ciphers = ?ciphers,
        chain_len = chain.len(),
        "TLS policy loaded"
    );

    Ok(TlsPolicy {
        ciphers,
        options: TlsOptions::BASELINE | version_options,
        private_key,
        certificate,
        chain,
        ca_file: settings.ca_file.clone(),
        client_roots,
    })
}

/// Resolve operator-disabled version identifiers through the capability table.
///
/// Returns the combined option flags and the identifiers that were skipped.
pub fn resolve_disabled_versions(versions: &[String]) -> (TlsOptions, Vec<String>) {
    let mut options = TlsOptions::empty();
    let mut unknown = Vec::new();

    for version in versions {
        match version_flag(version) {
            Some(flag) => {
                tracing::info!(version = %version, "TLSv{} will be disabled", version);
                options |= flag;
            }
            None => {
                tracing::warn!(version = %version, "TLSv{} was not found, ignoring", version);
                unknown.push(version.clone());
            }
        }
    }

    (options, unknown)
}

fn version_flag(version: &str) -> Option<TlsOptions> {
    let trimmed = version.trim();
    let normalized = trimmed
        .strip_prefix("TLSv")
        .or_else(|| trimmed.strip_prefix("tlsv"))
        .unwrap_or(trimmed)
        .replace('_', ".");

    VERSION_CAPABILITIES
        .iter()
        .find(|(id, _)| *id == normalized)
        .map(|(_, flag)| *flag)
}

/// Remove disabled ciphers from `base`, keeping the preference order of the rest.
pub fn filter_ciphers(base: &[&'static str], disabled: &[String]) -> Vec<&'static str> {
    let disabled: HashSet<String> = disabled.iter().map(|c| canonical_cipher(c)).collect();
    base.iter()
        .copied()
        .filter(|cipher| !disabled.contains(&canonical_cipher(cipher)))
        .collect()
}

fn canonical_cipher(name: &str) -> String {
    let name = name.trim();
    OPENSSL_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
        .map(|(_, iana)| (*iana).to_string())
        .unwrap_or_else(|| name.to_ascii_uppercase())
}

fn cipher_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Split a PEM bundle into one text block per certificate.
pub fn split_pem_certificates(pem: &str) -> Vec<&str> {
    pem.split_inclusive(END_CERTIFICATE)
        .filter(|block| !block.trim().is_empty())
        .collect()
}

/// Load every certificate of a concatenated PEM bundle, in file order.
pub fn load_certificate_bundle(path: &Path, kind: &'static str) -> TlsResult<Vec<CertificateDer<'static>>> {
    let pem = read_to_string(path, kind)?;
    let certs = split_pem_certificates(&pem)
        .into_iter()
        .map(|block| parse_certificate(block, path, kind))
        .collect::<TlsResult<Vec<_>>>()?;

    if certs.is_empty() {
        return Err(parse_error(path, kind, "no certificates found"));
    }
    Ok(certs)
}

fn load_certificate(path: &Path) -> TlsResult<CertificateDer<'static>> {
    let pem = read_to_string(path, "certificate")?;
    let block = split_pem_certificates(&pem)
        .into_iter()
        .next()
        .ok_or_else(|| parse_error(path, "certificate", "no certificate found"))?;
    parse_certificate(block, path, "certificate")
}

fn parse_certificate(block: &str, path: &Path, kind: &'static str) -> TlsResult<CertificateDer<'static>> {
    let cert = match rustls_pemfile::read_one(&mut block.as_bytes()) {
        Ok(Some(rustls_pemfile::Item::X509Certificate(cert))) => cert,
        Ok(Some(_)) => return Err(parse_error(path, kind, "PEM block is not a certificate")),
        Ok(None) => return Err(parse_error(path, kind, "no PEM certificate block")),
        Err(e) => return Err(parse_error(path, kind, e)),
    };

    ParsedCertificate::try_from(&cert).map_err(|e| parse_error(path, kind, e))?;
    Ok(cert)
}

fn load_private_key(path: &Path, provider: &CryptoProvider) -> TlsResult<PrivateKeyDer<'static>> {
    let pem = fs::read(path).map_err(|source| TlsError::Read {
        kind: "private key",
        path: path.to_path_buf(),
        source,
    })?;

    let key = rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|e| parse_error(path, "private key", e))?
        .ok_or_else(|| parse_error(path, "private key", "no private key found"))?;

    provider
        .key_provider
        .load_private_key(key.clone_key())
        .map_err(|e| parse_error(path, "private key", e))?;
    Ok(key)
}

fn load_client_roots(path: &Path) -> Option<Arc<RootCertStore>> {
    let certs = match load_certificate_bundle(path, "CA file") {
        Ok(certs) => certs,
        Err(e) => {
            tracing::error!(error = %e, path = ?path, "Unable to load CA file, client certificates will not be verified");
            return None;
        }
    };

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        tracing::warn!(path = ?path, ignored, "Some CA certificates were not usable as trust anchors");
    }
    if added == 0 {
        tracing::error!(path = ?path, "CA file contains no usable trust anchors");
        return None;
    }
    Some(Arc::new(roots))
}

fn read_to_string(path: &Path, kind: &'static str) -> TlsResult<String> {
    fs::read_to_string(path).map_err(|source| TlsError::Read {
        kind,
        path: path.to_path_buf(),
        source,
    })
}

fn parse_error(path: &Path, kind: &'static str, reason: impl std::fmt::Display) -> TlsError {
    TlsError::Parse {
        kind,
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
