//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! PluginRegistry (registration order)
//!     → initialize (registered → initializing → running | failed | stopped)
//!     → selector.rs (running plugins, split by protocol eligibility)
//!     → pipeline.rs (mount each plugin's routes, in order, per protocol)
//!     → Pipeline handed to the listener factory
//! ```
//!
//! # Design Decisions
//! - Plugins are only seen through the `Plugin` trait, never as concrete types
//! - Mount contributions are declarative (paths + handlers) and validated
//!   before any of them touch the router
//! - One bad mount fails the whole protocol, never a partial pipeline

pub mod pipeline;
pub mod registry;
pub mod root;
pub mod selector;

use crate::config::Protocol;

pub use pipeline::{compose, Mount, Pipeline, PipelineBuilder};
pub use registry::{PluginHandle, PluginRegistry, PluginState};
pub use root::RootPlugin;
pub use selector::{select, Selection};

/// Errors raised by plugins or while composing their pipelines.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PluginError {
    #[error("plugin '{0}' is already registered")]
    Duplicate(String),

    #[error("plugin '{plugin}' failed to start: {reason}")]
    Start { plugin: String, reason: String },

    #[error("plugin '{plugin}' requested exit with status {code}")]
    Exit { plugin: String, code: u8 },

    #[error("plugin '{plugin}' could not be mounted: {reason}")]
    Mount { plugin: String, reason: String },

    #[error("plugin '{plugin}' route '{path}' is invalid")]
    InvalidPath { plugin: String, path: String },

    #[error("plugin '{plugin}' route '{path}' conflicts with plugin '{owner}'")]
    RouteConflict {
        plugin: String,
        path: String,
        owner: String,
    },
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// A unit of request-handling behaviour contributed to the proxy.
pub trait Plugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &str;

    /// Whether the plugin serves requests over `protocol`.
    fn eligible(&self, protocol: Protocol) -> bool;

    /// Disabled plugins are never started and end up `stopped`.
    fn enabled(&self) -> bool {
        true
    }

    /// Called once during plugin initialization.
    fn start(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Routes this plugin serves over `protocol`.
    fn mount(&self, protocol: Protocol) -> PluginResult<Mount>;
}
