//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerSpec (pipeline + addresses + optional TLS)
//!     → server.rs (middleware stack, bind, startup callback)
//!     → axum-server accept loop (plain TCP or rustls)
//!     → plugin routes
//! ```

pub mod server;

pub use server::{HttpServer, ServerSettings, X_REQUEST_ID};
