//! Lifecycle coordination.
//!
//! [`Runtime::start`] binds every listener before serving anything, so a
//! port conflict fails the whole run. [`RunningRuntime::shutdown`] stops the
//! listeners, waits for them to drain, then stops the statistics collector
//! and waits for its backlog to be applied.

mod listener;

pub use listener::{BoundListener, ListenerReport, ListenerState, RequestHandler};

use crate::endpoint::Dispatcher;
use crate::management::ManagementServer;
use crate::mock_server::{MockServer, RouteError, ServerSpec};
use crate::response::ResponseCompiler;
use crate::statistics::StatisticsStore;
use crate::substitution::SubstitutionStore;
use futures::future::join_all;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Upper bound on waiting for in-flight connections per listener
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to bind {name} on {addr}: {source}")]
    Bind {
        name: String,
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Management listener settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementConfig {
    pub port: u16,
    pub collect_statistics: bool,
    pub allow_substitutions: bool,
}

/// Everything a [`Runtime`] needs, as produced by `config::load`
#[derive(Debug)]
pub struct RuntimeConfig {
    pub servers: Vec<ServerSpec>,
    pub management: ManagementConfig,
    /// Compiles substitution payloads
    pub compiler: ResponseCompiler,
}

#[derive(Debug)]
pub struct Runtime {
    config: RuntimeConfig,
    host: IpAddr,
    drain_timeout: Duration,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        Self {
            config,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            drain_timeout: DRAIN_TIMEOUT,
        }
    }

    /// Interface every listener binds to (default `0.0.0.0`)
    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub async fn start(self) -> Result<RunningRuntime, RuntimeError> {
        let Runtime {
            config,
            host,
            drain_timeout,
        } = self;
        let management_config = config.management;

        let substitutions = Arc::new(SubstitutionStore::new());
        let (statistics, sender, collector) = if management_config.collect_statistics {
            let (store, sender, collector) = StatisticsStore::new();
            (Some(store), Some(sender), Some(collector))
        } else {
            (None, None, None)
        };

        // Bind everything first; returning early drops what was already bound
        let mut bound = Vec::with_capacity(config.servers.len() + 1);
        let mut server_addrs = Vec::with_capacity(config.servers.len());
        for spec in config.servers {
            let name = spec.name.clone();
            let addr = SocketAddr::new(host, spec.port);
            let dispatcher = Dispatcher::new(
                name.as_str(),
                Arc::clone(&substitutions),
                sender.clone(),
            );
            let server = MockServer::new(spec, dispatcher)?;
            let listener = bind(&name, addr, Arc::new(server)).await?;
            server_addrs.push((name, listener.local_addr()));
            bound.push(listener);
        }
        // Mock servers hold the remaining senders
        drop(sender);

        let mut management_addr = None;
        let mut server = ManagementServer::new();
        if let Some(store) = &statistics {
            server = server.with_statistics(Arc::clone(store));
        }
        if management_config.allow_substitutions {
            server = server.with_substitutions(Arc::clone(&substitutions), config.compiler);
        }
        if server.is_enabled() {
            let addr = SocketAddr::new(host, management_config.port);
            let listener = bind("management", addr, Arc::new(server)).await?;
            management_addr = Some(listener.local_addr());
            bound.push(listener);
        }

        let collector = collector.map(|collector| {
            let (stop_tx, stop_rx) = oneshot::channel();
            (stop_tx, tokio::spawn(collector.run(stop_rx)))
        });

        let (shutdown_tx, _) = broadcast::channel(1);
        let listeners = bound
            .into_iter()
            .map(|listener| {
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(listener.serve(shutdown_rx, drain_timeout))
            })
            .collect();

        info!(
            "Runtime started with {} mock server(s){}",
            server_addrs.len(),
            if management_addr.is_some() {
                " and the management API"
            } else {
                ""
            }
        );

        Ok(RunningRuntime {
            server_addrs,
            management_addr,
            statistics,
            substitutions,
            shutdown_tx,
            listeners,
            collector,
        })
    }

    /// Start, wait for `signal`, then shut down
    pub async fn run_until<F>(self, signal: F) -> Result<ShutdownSummary, RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let running = self.start().await?;
        signal.await;
        info!("Shutdown requested");
        Ok(running.shutdown().await)
    }
}

async fn bind(
    name: &str,
    addr: SocketAddr,
    handler: Arc<dyn RequestHandler>,
) -> Result<BoundListener, RuntimeError> {
    BoundListener::bind(addr, handler)
        .await
        .map_err(|source| RuntimeError::Bind {
            name: name.to_string(),
            addr,
            source,
        })
}

/// Outcome of [`RunningRuntime::shutdown`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownSummary {
    pub listeners: Vec<ListenerReport>,
    /// Records applied by the statistics collector over its lifetime
    pub records_applied: u64,
}

/// A started runtime. Dropping it without [`shutdown`](Self::shutdown)
/// closes the shutdown channel, so every listener starts draining on its
/// own and nothing waits for the drain or the statistics collector.
#[derive(Debug)]
pub struct RunningRuntime {
    server_addrs: Vec<(String, SocketAddr)>,
    management_addr: Option<SocketAddr>,
    statistics: Option<Arc<StatisticsStore>>,
    substitutions: Arc<SubstitutionStore>,
    shutdown_tx: broadcast::Sender<()>,
    listeners: Vec<JoinHandle<ListenerReport>>,
    collector: Option<(oneshot::Sender<()>, JoinHandle<u64>)>,
}

impl RunningRuntime {
    /// Bound address of the mock server called `name`
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.server_addrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| *addr)
    }

    pub fn management_addr(&self) -> Option<SocketAddr> {
        self.management_addr
    }

    pub fn statistics(&self) -> Option<&Arc<StatisticsStore>> {
        self.statistics.as_ref()
    }

    pub fn substitutions(&self) -> &Arc<SubstitutionStore> {
        &self.substitutions
    }

    /// Stop every listener, then the statistics collector.
    ///
    /// Returns once every listener has stopped and the collector has
    /// applied everything that was sent.
    pub async fn shutdown(self) -> ShutdownSummary {
        // Err only means every listener already exited
        let _ = self.shutdown_tx.send(());

        let mut summary = ShutdownSummary::default();
        for result in join_all(self.listeners).await {
            match result {
                Ok(report) => {
                    if !report.drained {
                        warn!("Listener {} stopped before draining", report.name);
                    }
                    summary.listeners.push(report);
                }
                Err(e) => error!("Listener task failed: {}", e),
            }
        }

        if let Some((stop_tx, handle)) = self.collector {
            let _ = stop_tx.send(());
            match handle.await {
                Ok(applied) => {
                    summary.records_applied = applied;
                    if let Some(store) = &self.statistics {
                        info!(
                            "Statistics collector applied {} record(s) into {} counter(s)",
                            applied,
                            store.len()
                        );
                    }
                }
                Err(e) => error!("Statistics collector task failed: {}", e),
            }
        }

        info!(
            "Runtime stopped ({} listener(s), {} substitution(s) discarded)",
            summary.listeners.len(),
            self.substitutions.len()
        );
        summary
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointSpec, HttpMethod};
    use crate::response::ResponseSpec;

    fn config(servers: Vec<ServerSpec>, management: ManagementConfig) -> RuntimeConfig {
        RuntimeConfig {
            servers,
            management,
            compiler: ResponseCompiler::new("/tmp"),
        }
    }

    fn server(name: &str, port: u16) -> ServerSpec {
        let response = ResponseCompiler::new("/tmp")
            .compile(&ResponseSpec::template("hello"))
            .unwrap();
        ServerSpec {
            name: name.to_string(),
            port,
            endpoints: vec![EndpointSpec::new("/").with_response(HttpMethod::Get, response)],
        }
    }

    fn local() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn test_management_listener_only_when_enabled() {
        let disabled = ManagementConfig {
            port: 0,
            collect_statistics: false,
            allow_substitutions: false,
        };
        let running = Runtime::new(config(vec![server("a", 0)], disabled))
            .with_host(local())
            .start()
            .await
            .unwrap();

        assert!(running.local_addr("a").is_some());
        assert!(running.local_addr("b").is_none());
        assert!(running.management_addr().is_none());
        assert!(running.statistics().is_none());

        let summary = running.shutdown().await;
        assert_eq!(summary.listeners.len(), 1);
        assert!(summary
            .listeners
            .iter()
            .all(|l| l.state == ListenerState::Stopped));
    }

    #[tokio::test]
    async fn test_bind_failure_aborts_start() {
        let taken = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let management = ManagementConfig {
            port: 0,
            collect_statistics: true,
            allow_substitutions: true,
        };
        let result = Runtime::new(config(vec![server("a", 0), server("b", port)], management))
            .with_host(local())
            .start()
            .await;

        match result {
            Err(RuntimeError::Bind { name, addr, .. }) => {
                assert_eq!(name, "b");
                assert_eq!(addr.port(), port);
            }
            other => panic!("expected bind error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_until_returns_after_signal() {
        let management = ManagementConfig {
            port: 0,
            collect_statistics: true,
            allow_substitutions: false,
        };
        let summary = Runtime::new(config(vec![server("a", 0)], management))
            .with_host(local())
            .run_until(async {})
            .await
            .unwrap();

        assert_eq!(summary.listeners.len(), 2);
        assert_eq!(summary.records_applied, 0);
    }

    #[tokio::test]
    async fn test_dropping_runtime_drains_listeners() {
        let disabled = ManagementConfig {
            port: 0,
            collect_statistics: false,
            allow_substitutions: false,
        };
        let running = Runtime::new(config(vec![server("a", 0)], disabled))
            .with_host(local())
            .start()
            .await
            .unwrap();
        let addr = running.local_addr("a").unwrap();
        drop(running);

        for _ in 0..50 {
            if tokio::net::TcpStream::connect(addr).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("listener on {addr} still accepting after the runtime was dropped");
    }
}
