//! In-process HTTP server that answers requests from a [`StubRegistry`].
//!
//! Point the client under test at [`StubServer::uri`], or configure the
//! server as the client's HTTP proxy so requests keep their original host
//! and full-URL stubs can match them.

use crate::config::ServerSettings;
use crate::registry::StubRegistry;
use crate::request::InterceptedRequest;
use crate::response::{Fault, StubResponse};
use crate::{Result, StubError};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

const NOT_FOUND_BODY: &str = r#"{"error":"not_found","message":"No matching stub found"}"#;

/// Running interception server. Stops when dropped.
pub struct StubServer {
    address: SocketAddr,
    registry: Arc<StubRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
}

/// Shared per-server state handed to every connection.
struct Interceptor {
    registry: Arc<StubRegistry>,
    settings: ServerSettings,
    fallback: Option<StubResponse>,
    address: SocketAddr,
}

/// Returned from the service to make hyper drop the connection.
#[derive(Debug)]
struct ConnectionReset;

impl std::fmt::Display for ConnectionReset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("connection reset by stub")
    }
}

impl std::error::Error for ConnectionReset {}

impl StubServer {
    /// Serve the process-wide registry.
    pub async fn start() -> Result<Self> {
        Self::start_with(StubRegistry::global(), ServerSettings::default()).await
    }

    /// Serve `registry` on an ephemeral localhost port.
    pub async fn start_with(registry: Arc<StubRegistry>, settings: ServerSettings) -> Result<Self> {
        Self::builder(registry).settings(settings).start().await
    }

    pub fn builder(registry: Arc<StubRegistry>) -> StubServerBuilder {
        StubServerBuilder {
            registry,
            settings: ServerSettings::default(),
            fallback: None,
            bind: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Base URI, e.g. `http://127.0.0.1:49152`.
    pub fn uri(&self) -> String {
        format!("http://{}", self.address)
    }

    /// `path` resolved against [`uri`](Self::uri).
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.uri(), path)
    }

    pub fn registry(&self) -> &Arc<StubRegistry> {
        &self.registry
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Configures a [`StubServer`] before it binds.
pub struct StubServerBuilder {
    registry: Arc<StubRegistry>,
    settings: ServerSettings,
    fallback: Option<StubResponse>,
    bind: SocketAddr,
}

impl StubServerBuilder {
    pub fn settings(mut self, settings: ServerSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Response for requests no stub matches, instead of a 404.
    pub fn fallback(mut self, response: Option<StubResponse>) -> Self {
        self.fallback = response;
        self
    }

    pub fn bind(mut self, address: SocketAddr) -> Self {
        self.bind = address;
        self
    }

    pub async fn start(self) -> Result<StubServer> {
        let listener = TcpListener::bind(self.bind).await.map_err(StubError::Bind)?;
        let address = listener.local_addr().map_err(StubError::Bind)?;
        let (shutdown, stopped) = oneshot::channel();

        let interceptor = Arc::new(Interceptor {
            registry: Arc::clone(&self.registry),
            settings: self.settings,
            fallback: self.fallback,
            address,
        });
        tokio::spawn(accept_loop(listener, interceptor, stopped));

        info!(address = %address, stubs = self.registry.len(), "Stub server listening");
        Ok(StubServer {
            address,
            registry: self.registry,
            shutdown: Some(shutdown),
        })
    }
}

async fn accept_loop(
    listener: TcpListener,
    interceptor: Arc<Interceptor>,
    mut stopped: oneshot::Receiver<()>,
) {
    loop {
        let stream = tokio::select! {
            _ = &mut stopped => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            },
        };

        let interceptor = Arc::clone(&interceptor);
        tokio::spawn(async move {
            let service = service_fn(move |request| {
                let interceptor = Arc::clone(&interceptor);
                async move { interceptor.handle(request).await }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(error = %e, "Connection closed");
            }
        });
    }
    debug!("Stub server stopped");
}

impl Interceptor {
    async fn handle(
        &self,
        request: Request<Incoming>,
    ) -> std::result::Result<Response<Full<Bytes>>, ConnectionReset> {
        let intercepted = match self.intercept(request).await {
            Ok(intercepted) => intercepted,
            Err(reason) => {
                warn!(reason = %reason, "Could not read intercepted request");
                return Ok(to_hyper(StubResponse::text(reason, 400)));
            }
        };

        let response = match self.registry.find(&intercepted) {
            Some(matched) => {
                if self.settings.log_matches {
                    info!(
                        stub_id = %matched.id,
                        name = matched.name.as_deref().unwrap_or(""),
                        method = %intercepted.method,
                        url = %intercepted.url,
                        "Request matched stub"
                    );
                }
                matched.response
            }
            None => {
                if self.settings.log_unmatched {
                    warn!(
                        method = %intercepted.method,
                        url = %intercepted.url,
                        "No matching stub found"
                    );
                }
                self.fallback.clone().unwrap_or_else(not_found)
            }
        };

        deliver(response).await
    }

    /// Rebuild the absolute URL and collect the body.
    async fn intercept(&self, request: Request<Incoming>) -> std::result::Result<InterceptedRequest, String> {
        let (parts, body) = request.into_parts();

        let url = if parts.uri.scheme().is_some() {
            // Absolute-form target: we are acting as a forward proxy.
            parts.uri.to_string()
        } else {
            let host = parts
                .headers
                .get(hyper::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
                .unwrap_or_else(|| self.address.to_string());
            let target = parts
                .uri
                .path_and_query()
                .map(|pq| pq.as_str())
                .unwrap_or("/");
            format!("http://{host}{target}")
        };
        let url = Url::parse(&url).map_err(|e| format!("invalid request URL {url:?}: {e}"))?;

        let mut headers = HashMap::new();
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }

        let body = body
            .collect()
            .await
            .map_err(|e| format!("failed to read request body: {e}"))?
            .to_bytes();

        Ok(InterceptedRequest {
            method: parts.method.as_str().to_uppercase(),
            url,
            headers,
            body,
        })
    }
}

fn not_found() -> StubResponse {
    StubResponse::bytes(NOT_FOUND_BODY, 404).with_header("Content-Type", "application/json")
}

/// Apply the delay and fault of `response`, then convert it.
async fn deliver(
    response: StubResponse,
) -> std::result::Result<Response<Full<Bytes>>, ConnectionReset> {
    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let response = match response.fault {
        None => response,
        Some(Fault::ConnectionReset) => return Err(ConnectionReset),
        Some(Fault::Timeout { after }) => {
            tokio::time::sleep(after).await;
            StubResponse::text("Gateway Timeout (simulated)", 504)
        }
        Some(Fault::Empty) => StubResponse::empty(200),
        Some(Fault::Corrupt) => StubResponse::bytes(garbage(), 200)
            .with_header("Content-Type", "application/octet-stream"),
    };

    Ok(to_hyper(response))
}

fn to_hyper(response: StubResponse) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder.body(Full::new(response.body)).unwrap_or_else(|e| {
        warn!(error = %e, status = response.status, "Invalid stub response");
        let mut fallback = Response::new(Full::new(Bytes::from(format!("invalid stub response: {e}"))));
        *fallback.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// Random printable bytes for corruption simulation.
fn garbage() -> Vec<u8> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(50..200);
    (0..len).map(|_| rng.gen_range(0x20u8..0x7e)).collect()
}
