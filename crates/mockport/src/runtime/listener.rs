//! One HTTP listener: bind, accept, drain.

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Serves the requests of one listener
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Name used in logs
    fn name(&self) -> &str;

    async fn handle(&self, req: Request<Incoming>) -> Response<Full<Bytes>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Created,
    Listening,
    Draining,
    Stopped,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            ListenerState::Created => "created",
            ListenerState::Listening => "listening",
            ListenerState::Draining => "draining",
            ListenerState::Stopped => "stopped",
        };
        f.write_str(state)
    }
}

/// What a listener reports once stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerReport {
    pub name: String,
    pub addr: SocketAddr,
    pub state: ListenerState,
    /// False when the drain timeout elapsed with connections still open
    pub drained: bool,
}

/// A bound socket paired with its handler, not yet accepting
pub struct BoundListener {
    listener: TcpListener,
    handler: Arc<dyn RequestHandler>,
    addr: SocketAddr,
}

impl BoundListener {
    pub async fn bind(addr: SocketAddr, handler: Arc<dyn RequestHandler>) -> io::Result<Self> {
        info!("Listener {} {} on {}", handler.name(), ListenerState::Created, addr);
        let listener = TcpListener::bind(addr).await?;
        let addr = listener.local_addr()?;
        Ok(Self {
            listener,
            handler,
            addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    /// Accept connections until `shutdown` fires, then wait up to
    /// `drain_timeout` for in-flight connections before abandoning them.
    pub async fn serve(
        self,
        mut shutdown: broadcast::Receiver<()>,
        drain_timeout: Duration,
    ) -> ListenerReport {
        let name = self.handler.name().to_string();
        let port = self.addr.port();
        info!("Listener {} {} on {}", name, ListenerState::Listening, self.addr);

        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, remote)) => {
                            debug!("Accepted connection from {} on port {}", remote, port);
                            let handler = Arc::clone(&self.handler);
                            let service = service_fn(move |req| {
                                let handler = Arc::clone(&handler);
                                async move { Ok::<_, Infallible>(handler.handle(req).await) }
                            });
                            let conn = http1::Builder::new()
                                .serve_connection(TokioIo::new(stream), service);
                            let conn = graceful.watch(conn);
                            connections.spawn(async move {
                                if let Err(e) = conn.await {
                                    debug!("Connection error on port {}: {}", port, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error on port {}: {}", port, e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown.recv() => {
                    break;
                }
            }
        }

        info!("Listener {} {}", name, ListenerState::Draining);
        drop(self.listener);

        let drained = match tokio::time::timeout(drain_timeout, graceful.shutdown()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Listener {} drain timed out after {:?}, abandoning {} connection(s)",
                    name,
                    drain_timeout,
                    connections.len()
                );
                connections.abort_all();
                false
            }
        };
        while connections.join_next().await.is_some() {}

        info!("Listener {} {}", name, ListenerState::Stopped);
        ListenerReport {
            name,
            addr: self.addr,
            state: ListenerState::Stopped,
            drained,
        }
    }
}

impl fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundListener")
            .field("name", &self.handler.name())
            .field("addr", &self.addr)
            .finish()
    }
}
