//! Server lifecycle
//!
//! `startup` runs before the transport accepts its first request and
//! `shutdown` after the transport has stopped. Neither overlaps with request
//! handling.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::errors::ServerError;
use super::instance::ServerInstance;
use crate::transport::{ShutdownSignal, Transport};

/// Startup and shutdown hooks of a server
#[async_trait]
pub trait Lifespan: Send + Sync + 'static {
    async fn startup(&self) -> anyhow::Result<()>;

    async fn shutdown(&self) -> anyhow::Result<()>;
}

/// Lifespan built from two async closures, see [`lifespan`]
pub struct FnLifespan<S, D> {
    startup: S,
    shutdown: D,
}

#[async_trait]
impl<S, SFut, D, DFut> Lifespan for FnLifespan<S, D>
where
    S: Fn() -> SFut + Send + Sync + 'static,
    SFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    D: Fn() -> DFut + Send + Sync + 'static,
    DFut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn startup(&self) -> anyhow::Result<()> {
        (self.startup)().await
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        (self.shutdown)().await
    }
}

pub fn lifespan<S, D>(startup: S, shutdown: D) -> FnLifespan<S, D> {
    FnLifespan { startup, shutdown }
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

impl ServerInstance {
    /// Serve until Ctrl-C or SIGTERM
    pub async fn run<T: Transport>(self, transport: T) -> Result<(), ServerError> {
        self.run_until(transport, shutdown_signal()).await
    }

    /// Serve until `signal` resolves or the transport stops on its own
    ///
    /// A failing startup hook aborts before anything is served, and shutdown
    /// is not run. A failing shutdown hook is logged.
    pub async fn run_until<T, F>(self, transport: T, signal: F) -> Result<(), ServerError>
    where
        T: Transport,
        F: Future<Output = ()> + Send + 'static,
    {
        let lifespan = self.lifespan.clone();
        let name = self.name().to_string();

        if let Some(lifespan) = &lifespan {
            tracing::info!(server = %name, "Running startup hook");
            lifespan.startup().await.map_err(ServerError::Startup)?;
        }

        tracing::info!(
            server = %name,
            transport = transport.name(),
            capabilities = self.registry().len(),
            "Serving"
        );
        let signal: ShutdownSignal = Box::pin(signal);
        let served = transport.serve(Arc::new(self), signal).await;
        tracing::info!(server = %name, "Transport stopped");

        if let Some(lifespan) = &lifespan {
            tracing::info!(server = %name, "Running shutdown hook");
            if let Err(e) = lifespan.shutdown().await {
                tracing::warn!(server = %name, "Shutdown hook failed: {:#}", e);
            }
        }

        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Records when it serves and waits for the shutdown signal
    struct RecordingTransport {
        log: Log,
        fail: bool,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn serve(self, server: Arc<ServerInstance>, shutdown: ShutdownSignal) -> Result<(), ServerError> {
            self.log.lock().unwrap().push(format!("serve {}", server.name()));
            shutdown.await;
            self.log.lock().unwrap().push("stopped".to_string());
            if self.fail {
                return Err(ServerError::Transport("connection reset".to_string()));
            }
            Ok(())
        }
    }

    fn recording_lifespan(log: &Log, fail_startup: bool, fail_shutdown: bool) -> impl Lifespan {
        let up = log.clone();
        let down = log.clone();
        lifespan(
            move || {
                let log = up.clone();
                async move {
                    log.lock().unwrap().push("startup".to_string());
                    if fail_startup {
                        anyhow::bail!("database unreachable");
                    }
                    anyhow::Ok(())
                }
            },
            move || {
                let log = down.clone();
                async move {
                    log.lock().unwrap().push("shutdown".to_string());
                    if fail_shutdown {
                        anyhow::bail!("flush failed");
                    }
                    anyhow::Ok(())
                }
            },
        )
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_hooks_wrap_the_transport() {
        let log: Log = Default::default();
        let mut server = ServerInstance::create("ordered", Vec::<String>::new());
        server.attach_lifespan(recording_lifespan(&log, false, false));

        let transport = RecordingTransport { log: log.clone(), fail: false };
        server.run_until(transport, async {}).await.unwrap();

        assert_eq!(entries(&log), ["startup", "serve ordered", "stopped", "shutdown"]);
    }

    #[tokio::test]
    async fn test_failed_startup_never_serves() {
        let log: Log = Default::default();
        let mut server = ServerInstance::create("broken", Vec::<String>::new());
        server.attach_lifespan(recording_lifespan(&log, true, false));

        let transport = RecordingTransport { log: log.clone(), fail: false };
        let err = server.run_until(transport, async {}).await.unwrap_err();

        assert!(matches!(err, ServerError::Startup(_)));
        assert!(err.to_string().contains("database unreachable"));
        assert_eq!(entries(&log), ["startup"]);
    }

    #[tokio::test]
    async fn test_failed_shutdown_is_not_raised() {
        let log: Log = Default::default();
        let mut server = ServerInstance::create("flaky", Vec::<String>::new());
        server.attach_lifespan(recording_lifespan(&log, false, true));

        let transport = RecordingTransport { log: log.clone(), fail: false };
        assert!(server.run_until(transport, async {}).await.is_ok());
        assert_eq!(entries(&log).last().map(String::as_str), Some("shutdown"));
    }

    #[tokio::test]
    async fn test_shutdown_runs_after_transport_error() {
        let log: Log = Default::default();
        let mut server = ServerInstance::create("lossy", Vec::<String>::new());
        server.attach_lifespan(recording_lifespan(&log, false, false));

        let transport = RecordingTransport { log: log.clone(), fail: true };
        let err = server.run_until(transport, async {}).await.unwrap_err();

        assert!(matches!(err, ServerError::Transport(_)));
        assert_eq!(entries(&log), ["startup", "serve lossy", "stopped", "shutdown"]);
    }

    #[tokio::test]
    async fn test_runs_without_lifespan() {
        let log: Log = Default::default();
        let server = ServerInstance::create("bare", Vec::<String>::new());
        let transport = RecordingTransport { log: log.clone(), fail: false };
        server.run_until(transport, async {}).await.unwrap();
        assert_eq!(entries(&log), ["serve bare", "stopped"]);
    }
}
