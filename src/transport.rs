//! Transports a server instance can be run on
//!
//! - [`StdioTransport`] speaks MCP over stdin/stdout (one client per process)
//! - [`HttpTransport`] exposes the MCP Streamable HTTP transport at `/mcp`

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use rmcp::{
    transport::streamable_http_server::{
        session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
    },
    ServiceExt,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tower_http::trace::TraceLayer;

use crate::mcp_bridge::CapgraphMcpBridge;
use crate::server::{ServerError, ServerInstance};

/// Resolves when the transport should stop accepting requests
pub type ShutdownSignal = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Accept loop for one server instance
///
/// `serve` returns once `shutdown` has resolved and in-flight requests have
/// drained, or when the peer goes away on its own.
#[async_trait]
pub trait Transport: Send + Sized + 'static {
    fn name(&self) -> &'static str;

    async fn serve(self, server: Arc<ServerInstance>, shutdown: ShutdownSignal) -> Result<(), ServerError>;
}

/// How long a stopping session waits for running invocations
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Time left for the session to write out the last responses
const FLUSH_GRACE: Duration = Duration::from_millis(100);

/// MCP over the process's stdin and stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioTransport;

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &'static str {
        "stdio"
    }

    async fn serve(self, server: Arc<ServerInstance>, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        serve_stream(server, tokio::io::stdin(), tokio::io::stdout(), shutdown).await
    }
}

/// Serve one MCP session over a byte stream pair
///
/// On shutdown, invocations that are already running finish and have their
/// responses written before the session is cancelled.
pub async fn serve_stream<R, W>(
    server: Arc<ServerInstance>,
    reader: R,
    writer: W,
    shutdown: ShutdownSignal,
) -> Result<(), ServerError>
where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let bridge = CapgraphMcpBridge::new(server);
    let in_flight = bridge.in_flight().clone();
    let running = bridge
        .serve((reader, writer))
        .await
        .map_err(|e| ServerError::Transport(e.to_string()))?;

    let ct = running.cancellation_token();
    let waiting = running.waiting();
    tokio::pin!(waiting);

    let quit = tokio::select! {
        quit = &mut waiting => quit,
        _ = shutdown => {
            let busy = in_flight.count();
            if busy > 0 {
                tracing::info!("Waiting for {} running request(s)", busy);
                match tokio::time::timeout(DRAIN_TIMEOUT, in_flight.wait_idle()).await {
                    Ok(()) => tokio::time::sleep(FLUSH_GRACE).await,
                    Err(_) => tracing::warn!(
                        "{} request(s) still running after {:?}, cancelling",
                        in_flight.count(),
                        DRAIN_TIMEOUT
                    ),
                }
            }
            ct.cancel();
            waiting.await
        }
    };

    let reason = quit.map_err(|e| ServerError::Transport(e.to_string()))?;
    tracing::debug!("session ended: {:?}", reason);
    Ok(())
}

/// MCP Streamable HTTP, mounted at `/mcp`
#[derive(Debug, Clone, Copy)]
pub struct HttpTransport {
    pub bind: SocketAddr,
}

impl HttpTransport {
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn serve(self, server: Arc<ServerInstance>, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let listener = tokio::net::TcpListener::bind(self.bind).await?;
        tracing::info!("MCP server listening on http://{}/mcp", listener.local_addr()?);

        axum::serve(listener, router(server))
            .with_graceful_shutdown(shutdown)
            .await?;
        Ok(())
    }
}

/// Axum router serving `server` at `/mcp`
pub fn router(server: Arc<ServerInstance>) -> Router {
    let bridge = CapgraphMcpBridge::new(server);
    let service = StreamableHttpService::new(
        move || Ok(bridge.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    Router::new()
        .nest_service("/mcp", service)
        .fallback(fallback_handler)
        .layer(middleware::from_fn(log_request_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn log_request_middleware(request: Request, next: Next) -> Response {
    tracing::debug!("{} {}", request.method(), request.uri());
    next.run(request).await
}

async fn fallback_handler(request: Request) -> impl IntoResponse {
    tracing::warn!("Unmatched route: {}", request.uri());
    (StatusCode::NOT_FOUND, "Not found. The MCP endpoint is /mcp")
}
