//! Shutdown coordination for the proxy.

use tokio::sync::watch;

/// Why the proxy is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// An OS signal such as SIGTERM or SIGINT.
    Signal(&'static str),
    /// Requested programmatically.
    Requested,
}

/// Coordinator for graceful shutdown.
///
/// Every long-running task subscribes; the first cause recorded wins.
/// Subscribers created after the trigger still observe it.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: watch::Sender<Option<ShutdownCause>>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.record(ShutdownCause::Requested);
    }

    /// Trigger shutdown on behalf of an OS signal.
    pub fn interrupt(&self, signal: &'static str) {
        self.record(ShutdownCause::Signal(signal));
    }

    fn record(&self, cause: ShutdownCause) {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        });
    }

    /// The recorded cause, once shutdown has been triggered.
    pub fn cause(&self) -> Option<ShutdownCause> {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving half handed to each task.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ShutdownCause>>,
}

impl ShutdownSignal {
    /// Wait until shutdown is triggered.
    ///
    /// Never resolves if the coordinator is dropped without triggering.
    pub async fn recv(&mut self) -> ShutdownCause {
        let cause = match self.rx.wait_for(Option::is_some).await {
            Ok(cause) => *cause,
            Err(_) => None,
        };
        match cause {
            Some(cause) => cause,
            None => std::future::pending().await,
        }
    }
}
