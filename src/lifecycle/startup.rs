//! Startup coordination.
//!
//! # Responsibilities
//! - Drop listeners that do not apply and count the rest
//! - Give each listener a callback that counts it as bound
//! - Signal readiness exactly once, after the last listener binds
//! - Run every listener on its own task and report the first to finish
//!
//! # Design Decisions
//! - Readiness fires from inside the latch's critical section
//! - A listener that fails to bind never arrives, so readiness never fires
//! - Listeners are independent tasks; one slow bind never blocks another

use std::future::{poll_fn, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::task::Poll;

use tokio::task::JoinHandle;

use crate::config::Protocol;
use crate::http::{HttpServer, ServerSettings};
use crate::lifecycle::{CountdownLatch, ReadinessNotifier, Shutdown};
use crate::net::listener::{ListenerError, ListenerResult, ListenerSpec};
use crate::observability::metrics;

/// Wires listeners to a shared readiness latch and starts them.
pub struct StartupCoordinator {
    notifier: Arc<dyn ReadinessNotifier>,
    settings: ServerSettings,
}

impl StartupCoordinator {
    pub fn new(notifier: Arc<dyn ReadinessNotifier>, settings: ServerSettings) -> Self {
        Self { notifier, settings }
    }

    /// Keep the applicable specs and fill in their startup callbacks.
    pub fn install(&self, specs: Vec<Option<ListenerSpec>>) -> Vec<ListenerSpec> {
        let mut specs: Vec<ListenerSpec> = specs.into_iter().flatten().collect();

        let notifier = self.notifier.clone();
        let latch = Arc::new(CountdownLatch::new(specs.len(), move || {
            tracing::info!("All listeners bound, signalling readiness");
            metrics::record_ready();
            notifier.notify_ready();
        }));
        metrics::record_pending_listeners(specs.len());

        for spec in &mut specs {
            let latch = latch.clone();
            let protocol = spec.protocol;
            spec.on_bound = Some(Box::new(move || {
                latch.arrive();
                let pending = latch.pending();
                metrics::record_pending_listeners(pending);
                tracing::debug!(protocol = %protocol, pending, "Listener reported bound");
            }));
        }

        specs
    }

    /// Start one task per listener.
    pub fn start(&self, specs: Vec<ListenerSpec>, shutdown: &Shutdown) -> RunningListeners {
        let tasks = specs
            .into_iter()
            .map(|spec| {
                let protocol = spec.protocol;
                tracing::info!(protocol = %protocol, port = spec.port, "Starting listener");
                let server = HttpServer::new(spec, self.settings);
                (protocol, tokio::spawn(server.run(shutdown.subscribe())))
            })
            .collect();

        RunningListeners { tasks }
    }
}

/// Listener tasks started by the coordinator.
///
/// Dropping it aborts whatever is still running.
#[derive(Debug)]
pub struct RunningListeners {
    tasks: Vec<(Protocol, JoinHandle<ListenerResult<()>>)>,
}

impl RunningListeners {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for the first listener to return or fail.
    ///
    /// Returns `None` once every listener has been collected.
    pub async fn wait_any(&mut self) -> Option<(Protocol, ListenerResult<()>)> {
        if self.tasks.is_empty() {
            return None;
        }

        let (index, joined) = poll_fn(|cx| {
            for (index, (_, task)) in self.tasks.iter_mut().enumerate() {
                if let Poll::Ready(joined) = Pin::new(task).poll(cx) {
                    return Poll::Ready((index, joined));
                }
            }
            Poll::Pending
        })
        .await;

        let (protocol, _) = self.tasks.remove(index);
        let result = joined.unwrap_or_else(|e| {
            tracing::error!(protocol = %protocol, error = %e, "Listener task ended abnormally");
            Err(ListenerError::Aborted(protocol))
        });
        Some((protocol, result))
    }

    /// Wait for every remaining listener, logging failures.
    pub async fn drain(&mut self) {
        while let Some((protocol, result)) = self.wait_any().await {
            if let Err(e) = result {
                tracing::warn!(protocol = %protocol, error = %e, "Listener failed while stopping");
            }
        }
    }
}

impl Drop for RunningListeners {
    fn drop(&mut self) {
        for (_, task) in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{Mount, PipelineBuilder};
    use axum::routing::get;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingNotifier {
        calls: AtomicUsize,
    }

    impl ReadinessNotifier for CountingNotifier {
        fn notify_ready(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spec(protocol: Protocol, addr: SocketAddr) -> ListenerSpec {
        let mut builder = PipelineBuilder::new(protocol);
        builder
            .mount("echo", Mount::new().route("/ping", get(|| async { "pong" })))
            .unwrap();
        ListenerSpec {
            protocol,
            pipeline: builder.finish(),
            addresses: vec![addr],
            port: addr.port(),
            tls: None,
            on_bound: None,
        }
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn install_drops_inapplicable_and_fills_callbacks() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = StartupCoordinator::new(notifier.clone(), ServerSettings::default());

        let specs = coordinator.install(vec![None, Some(spec(Protocol::Https, loopback()))]);
        assert_eq!(specs.len(), 1);
        assert!(specs[0].on_bound.is_some());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn readiness_waits_for_every_callback() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = StartupCoordinator::new(notifier.clone(), ServerSettings::default());

        let mut specs = coordinator.install(vec![
            Some(spec(Protocol::Http, loopback())),
            Some(spec(Protocol::Https, loopback())),
        ]);
        let second = specs.pop().unwrap().on_bound.unwrap();
        let first = specs.pop().unwrap().on_bound.unwrap();

        first();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
        second();
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn started_listeners_signal_ready_once() {
        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = StartupCoordinator::new(notifier.clone(), ServerSettings::default());
        let shutdown = Shutdown::new();

        let specs = coordinator.install(vec![
            Some(spec(Protocol::Http, loopback())),
            Some(spec(Protocol::Https, loopback())),
        ]);
        let mut running = coordinator.start(specs, &shutdown);
        assert_eq!(running.len(), 2);

        for _ in 0..100 {
            if notifier.calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);

        shutdown.trigger();
        let (_, result) = running.wait_any().await.unwrap();
        assert!(result.is_ok());
        running.drain().await;
        assert!(running.is_empty());
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bind_failure_never_signals_ready() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let notifier = Arc::new(CountingNotifier::default());
        let coordinator = StartupCoordinator::new(notifier.clone(), ServerSettings::default());
        let shutdown = Shutdown::new();

        let specs = coordinator.install(vec![
            Some(spec(Protocol::Http, loopback())),
            Some(spec(Protocol::Https, addr)),
        ]);
        let mut running = coordinator.start(specs, &shutdown);

        let (protocol, result) = running.wait_any().await.unwrap();
        assert_eq!(protocol, Protocol::Https);
        assert!(matches!(result, Err(ListenerError::Bind { .. })));
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);

        shutdown.trigger();
        running.drain().await;
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 0);
    }
}
