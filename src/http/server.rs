//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap a composed pipeline in the common middleware stack
//! - Bind every address of a listener, then report the bind
//! - Serve plain HTTP or HTTPS (rustls) through axum-server
//! - Stop accepting on shutdown and drain within the grace period

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use futures_util::future::try_join_all;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Protocol, ProxyConfig};
use crate::lifecycle::ShutdownSignal;
use crate::net::listener::{ListenerError, ListenerResult, ListenerSpec};
use crate::observability::metrics;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

type ServeFuture = Pin<Box<dyn Future<Output = Result<(), (SocketAddr, std::io::Error)>> + Send>>;

/// Request handling limits shared by every listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerSettings {
    pub request_timeout: Duration,
    pub max_body_size: usize,
    pub shutdown_grace: Duration,
}

impl From<&ProxyConfig> for ServerSettings {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_body_size: config.max_body_size,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_secs),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self::from(&ProxyConfig::default())
    }
}

/// One running listener: a pipeline bound to one or more sockets.
pub struct HttpServer {
    spec: ListenerSpec,
    settings: ServerSettings,
}

impl HttpServer {
    pub fn new(spec: ListenerSpec, settings: ServerSettings) -> Self {
        Self { spec, settings }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(pipeline: Router, settings: &ServerSettings) -> Router {
        let header = axum::http::HeaderName::from_static(X_REQUEST_ID);
        pipeline.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(header.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(header))
                .layer(RequestBodyLimitLayer::new(settings.max_body_size))
                .layer(TimeoutLayer::new(settings.request_timeout)),
        )
    }

    /// Bind, report the bind, then serve until shutdown or failure.
    ///
    /// The startup callback fires once every address is listening. A bind
    /// failure on any address ends the listener without calling it.
    pub async fn run(self, shutdown: ShutdownSignal) -> ListenerResult<()> {
        let ListenerSpec {
            protocol,
            pipeline,
            addresses,
            tls,
            on_bound,
            ..
        } = self.spec;

        let router = Self::build_router(pipeline.into_router(), &self.settings);
        let rustls = tls.map(|tls| RustlsConfig::from_config(tls.server_config));

        let mut handles = Vec::with_capacity(addresses.len());
        let mut serving: Vec<ServeFuture> = Vec::with_capacity(addresses.len());
        for addr in addresses {
            let handle = Handle::new();
            handles.push(handle.clone());
            serving.push(serve(
                addr,
                router.clone(),
                rustls.clone(),
                handle,
                shutdown.clone(),
                self.settings.shutdown_grace,
            ));
        }

        let serve_all = try_join_all(serving);
        tokio::pin!(serve_all);

        let bound = tokio::select! {
            result = &mut serve_all => return finish(protocol, result, false),
            bound = wait_listening(protocol, &handles) => bound,
        };
        if !bound {
            return finish(protocol, serve_all.await, false);
        }

        metrics::record_listener_bound(protocol);
        if let Some(callback) = on_bound {
            callback();
        }

        finish(protocol, serve_all.await, true)
    }
}

fn serve(
    addr: SocketAddr,
    router: Router,
    rustls: Option<RustlsConfig>,
    handle: Handle,
    mut shutdown: ShutdownSignal,
    grace: Duration,
) -> ServeFuture {
    let app = router.into_make_service_with_connect_info::<SocketAddr>();
    Box::pin(async move {
        let server: Pin<Box<dyn Future<Output = std::io::Result<()>> + Send>> = match rustls {
            Some(config) => Box::pin(
                axum_server::bind_rustls(addr, config)
                    .handle(handle.clone())
                    .serve(app),
            ),
            None => Box::pin(axum_server::bind(addr).handle(handle.clone()).serve(app)),
        };
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => return result.map_err(|e| (addr, e)),
            _ = shutdown.recv() => handle.graceful_shutdown(Some(grace)),
        }
        server.await.map_err(|e| (addr, e))
    })
}

async fn wait_listening(protocol: Protocol, handles: &[Handle]) -> bool {
    for handle in handles {
        match handle.listening().await {
            Some(addr) => tracing::info!(protocol = %protocol, address = %addr, "Listener bound"),
            None => return false,
        }
    }
    true
}

fn finish(
    protocol: Protocol,
    result: Result<Vec<()>, (SocketAddr, std::io::Error)>,
    bound: bool,
) -> ListenerResult<()> {
    match result {
        Ok(_) => {
            tracing::info!(protocol = %protocol, "Listener stopped");
            Ok(())
        }
        Err((addr, source)) if !bound => Err(ListenerError::Bind { addr, source }),
        Err((_, source)) => Err(ListenerError::Serve { protocol, source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use crate::plugins::{Mount, PipelineBuilder};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::{get, post};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn spec(addresses: Vec<SocketAddr>) -> ListenerSpec {
        let mut builder = PipelineBuilder::new(Protocol::Http);
        builder
            .mount("echo", Mount::new().route("/ping", get(|| async { "pong" })))
            .unwrap();
        ListenerSpec {
            protocol: Protocol::Http,
            pipeline: builder.finish(),
            addresses,
            port: 0,
            tls: None,
            on_bound: None,
        }
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let mut builder = PipelineBuilder::new(Protocol::Http);
        builder
            .mount(
                "echo",
                Mount::new().route("/upload", post(|body: String| async move { body })),
            )
            .unwrap();
        let settings = ServerSettings {
            max_body_size: 16,
            ..ServerSettings::default()
        };
        let router = HttpServer::build_router(builder.finish().into_router(), &settings);

        let small = Request::post("/upload").body(Body::from("tiny")).unwrap();
        let response = router.clone().oneshot(small).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));

        let large = Request::post("/upload")
            .header("content-length", "64")
            .body(Body::from(vec![b'x'; 64]))
            .unwrap();
        let response = router.oneshot(large).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn bind_failure_skips_callback() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = taken.local_addr().unwrap();

        let called = Arc::new(AtomicUsize::new(0));
        let c = called.clone();
        let mut spec = spec(vec![addr]);
        spec.on_bound = Some(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let shutdown = Shutdown::new();
        let err = HttpServer::new(spec, ServerSettings::default())
            .run(shutdown.subscribe())
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::Bind { addr: a, .. } if a == addr));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn serves_until_shutdown() {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = free.local_addr().unwrap();
        drop(free);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let mut spec = spec(vec![addr]);
        spec.on_bound = Some(Box::new(move || {
            let _ = tx.send(());
        }));

        let shutdown = Shutdown::new();
        let server = tokio::spawn(
            HttpServer::new(spec, ServerSettings::default()).run(shutdown.subscribe()),
        );
        rx.await.unwrap();

        let response = reqwest::get(format!("http://{addr}/ping")).await.unwrap();
        assert_eq!(response.status(), 200);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        assert_eq!(response.text().await.unwrap(), "pong");

        shutdown.trigger();
        server.await.unwrap().unwrap();
    }
}
