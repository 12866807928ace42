//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Launch (launcher.rs):
//!     Validate → Initialize plugins → Build pipelines + TLS → Start listeners
//!
//! Startup (startup.rs, latch.rs):
//!     Each listener binds → latch counts down → readiness.rs notifies once
//!
//! Shutdown (signals.rs, shutdown.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown → Listeners drain → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then plugins, then listeners
//! - Readiness only after every listener is accepting connections
//! - Shutdown has timeout: listeners force-close after the grace period

pub mod latch;
pub mod launcher;
pub mod readiness;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use latch::CountdownLatch;
pub use launcher::{LaunchError, LaunchPhase, LaunchResult, Launcher};
pub use readiness::{ReadinessNotifier, SystemdNotifier};
pub use shutdown::{Shutdown, ShutdownCause, ShutdownSignal};
pub use signals::{NoSignalTrap, SignalTrap, TokioSignalTrap};
pub use startup::{RunningListeners, StartupCoordinator};
