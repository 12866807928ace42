//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyConfig
//!     → tls.rs (load key, certificate, chain, CA; resolve hardening policy)
//!     → listener.rs (resolve bind hosts, pair pipeline + TLS into a ListenerSpec)
//!     → Hand off to the startup coordinator
//! ```
//!
//! # Design Decisions
//! - TLS material is validated before any listener starts
//! - Each protocol owns its own sockets and TLS state

pub mod listener;
pub mod tls;

pub use listener::{ListenerError, ListenerFactory, ListenerResult, ListenerSpec, StartupCallback};
pub use tls::{load_tls_policy, TlsError, TlsOptions, TlsPolicy};
