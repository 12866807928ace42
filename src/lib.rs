//! Plugin proxy launcher library.
//!
//! Starts plain HTTP and hardened HTTPS listeners serving routes contributed
//! by plugins, and reports readiness once every listener is accepting.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod plugins;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::{LaunchError, Launcher, Shutdown};
pub use plugins::{Plugin, PluginRegistry};
