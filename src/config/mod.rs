//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → HttpSettings / HttpsSettings views handed to each listener
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded and passed explicitly, never global
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{HttpSettings, HttpsSettings, ObservabilityConfig, Protocol, ProxyConfig};
pub use validation::ValidationError;
