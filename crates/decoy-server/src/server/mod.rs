//! HTTP front end.
//!
//! [`MockServer`] accepts connections on the mock port and hands every request
//! to the [`DispatchEngine`]. [`MetricsServer`] serves Prometheus text on a
//! separate port. Both stop accepting when their [`CancellationToken`] fires
//! and let in-flight connections finish.

use crate::engine::{DispatchEngine, DispatchResult, InboundRequest, ENDPOINT_HEADER};
use crate::metrics;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Serves mock endpoints.
pub struct MockServer {
    listener: TcpListener,
    engine: Arc<DispatchEngine>,
    shutdown: CancellationToken,
}

impl MockServer {
    pub async fn bind(
        addr: SocketAddr,
        engine: Arc<DispatchEngine>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind mock listener on {addr}: {e}"))?;
        Ok(Self::from_listener(listener, engine, shutdown))
    }

    pub fn from_listener(
        listener: TcpListener,
        engine: Arc<DispatchEngine>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            listener,
            engine,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until shutdown, then wait for open connections.
    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.local_addr()?;
        info!("Decoy mock server listening on http://{}", addr);

        let engine = self.engine;
        serve(self.listener, self.shutdown, "mock", move |req, peer| {
            let engine = Arc::clone(&engine);
            async move { handle_mock_request(req, engine, peer).await }
        })
        .await;

        info!("Decoy mock server on {} stopped", addr);
        Ok(())
    }
}

/// Serves `GET /metrics` and `GET /health`.
pub struct MetricsServer {
    listener: TcpListener,
    shutdown: CancellationToken,
}

impl MetricsServer {
    pub async fn bind(addr: SocketAddr, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind metrics listener on {addr}: {e}"))?;
        Ok(Self { listener, shutdown })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.local_addr()?;
        info!("Metrics listening on http://{}/metrics", addr);
        serve(self.listener, self.shutdown, "metrics", |req, _| async move {
            Ok::<_, hyper::Error>(handle_metrics_request(&req))
        })
        .await;
        Ok(())
    }
}

async fn serve<F, Fut>(
    listener: TcpListener,
    shutdown: CancellationToken,
    name: &'static str,
    handler: F,
) where
    F: Fn(Request<Incoming>, SocketAddr) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<Response<Full<Bytes>>, hyper::Error>> + Send + 'static,
{
    let connections = TaskTracker::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let handler = handler.clone();
                        let shutdown = shutdown.clone();
                        connections.spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req| handler(req, peer));
                            let conn = http1::Builder::new().serve_connection(io, service);
                            tokio::pin!(conn);
                            let mut draining = false;
                            let result = loop {
                                tokio::select! {
                                    result = conn.as_mut() => break result,
                                    _ = shutdown.cancelled(), if !draining => {
                                        draining = true;
                                        conn.as_mut().graceful_shutdown();
                                    }
                                }
                            };
                            if let Err(e) = result {
                                debug!("Connection error on {} listener from {}: {}", name, peer, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Accept error on {} listener: {}", name, e);
                    }
                }
            }
            _ = shutdown.cancelled() => {
                debug!("{} listener stopped accepting", name);
                break;
            }
        }
    }

    connections.close();
    connections.wait().await;
}

/// Convert a hyper request into an [`InboundRequest`], dispatch it and build
/// the response.
pub async fn handle_mock_request(
    req: Request<Incoming>,
    engine: Arc<DispatchEngine>,
    peer: SocketAddr,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned())
        }
        Err(e) => {
            debug!("Failed to read request body: {}", e);
            None
        }
    };

    let inbound = InboundRequest {
        method: parts.method.as_str().to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
        client_addr: Some(peer),
    };

    // Detached so a client disconnect cannot cancel logging or webhook enqueue.
    let task = tokio::spawn(async move { engine.dispatch(inbound).await });
    match task.await {
        Ok(result) => Ok(build_response(&result)),
        Err(e) => {
            error!("Dispatch task failed: {}", e);
            Ok(plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ))
        }
    }
}

/// Build the HTTP response for a dispatch outcome.
pub fn build_response(result: &DispatchResult) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(result.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = Response::builder().status(status);

    if let Some(headers) = response.headers_mut() {
        match HeaderValue::from_str(&result.content_type) {
            Ok(value) => {
                headers.insert(CONTENT_TYPE, value);
            }
            Err(_) => debug!("Invalid content type {:?} ignored", result.content_type),
        }
        for (name, value) in &result.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => debug!("Invalid response header {:?} ignored", name),
            }
        }
        if let Some(endpoint) = result
            .endpoint_id
            .as_deref()
            .and_then(|id| HeaderValue::from_str(id).ok())
        {
            headers.insert(HeaderName::from_static(ENDPOINT_HEADER), endpoint);
        }
    }

    response
        .body(Full::new(Bytes::from(result.body.clone())))
        .unwrap_or_else(|_| {
            plain_response(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        })
}

fn handle_metrics_request(req: &Request<Incoming>) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut response = Response::new(Full::new(Bytes::from(metrics::collect_metrics())));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        (&Method::GET, "/health") => plain_response(StatusCode::OK, "ok"),
        _ => plain_response(StatusCode::NOT_FOUND, "Not Found"),
    }
}

fn plain_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    response
}
