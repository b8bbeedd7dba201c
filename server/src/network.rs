//! Server network layer: TCP listener, worker pool and graceful shutdown

use crate::connection::{handle_connection, DEFAULT_REQUEST_TIMEOUT};
use crate::coordinator::{Coordinator, DEFAULT_EXPECTED_AGENCIES};
use crate::error::{Result, ServerError};
use log::{debug, error, info, warn};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Connections waiting for a free worker
type ConnectionQueue = Arc<Mutex<mpsc::UnboundedReceiver<(TcpStream, SocketAddr)>>>;

/// Settings consumed by [`Server::bind`]
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub listen_backlog: u32,
    pub workers: usize,
    pub expected_agencies: usize,
    pub shutdown_grace: Duration,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 12345,
            listen_backlog: 5,
            workers: 10,
            expected_agencies: DEFAULT_EXPECTED_AGENCIES,
            shutdown_grace: Duration::from_secs(2),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Accepts agency connections and feeds them to a fixed pool of workers
pub struct Server {
    listener: TcpListener,
    coordinator: Arc<Coordinator>,
    workers: usize,
    shutdown_grace: Duration,
    request_timeout: Duration,
}

impl Server {
    /// Binds the listening socket; the only fatal failure of the server
    pub fn bind(config: &ServerConfig, coordinator: Arc<Coordinator>) -> Result<Self> {
        if config.workers == 0 {
            return Err(ServerError::Config("worker pool needs at least one worker".into()));
        }

        let address = config.address();
        let bind_error = |source| ServerError::Bind {
            addr: address.clone(),
            source,
        };

        let addr: SocketAddr = address
            .parse()
            .map_err(|e| ServerError::Config(format!("invalid address {}: {}", address, e)))?;
        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(config.listen_backlog).map_err(bind_error)?;

        info!("Server listening on {}", listener.local_addr().map_err(bind_error)?);

        Ok(Self {
            listener,
            coordinator,
            workers: config.workers,
            shutdown_grace: config.shutdown_grace,
            request_timeout: config.request_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn coordinator(&self) -> Arc<Coordinator> {
        Arc::clone(&self.coordinator)
    }

    /// Serves connections until `shutdown` resolves, then drains the workers
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server {
            listener,
            coordinator,
            workers,
            shutdown_grace,
            request_timeout,
        } = self;

        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue: ConnectionQueue = Arc::new(Mutex::new(queue_rx));
        let mut pool = spawn_workers(workers, &queue, &coordinator, request_timeout);
        info!("Started {} workers", workers);

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!("Accepted connection from {}", peer);
                        if queue_tx.send((stream, peer)).is_err() {
                            error!("Worker queue closed, stopping listener");
                            break;
                        }
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }

        // Stop accepting and let parked winner queries answer NOT_READY
        drop(listener);
        coordinator.shutdown();
        drop(queue_tx);

        drain_workers(&mut pool, shutdown_grace).await;
        info!("Server stopped");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl-C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn spawn_workers(
    count: usize,
    queue: &ConnectionQueue,
    coordinator: &Arc<Coordinator>,
    request_timeout: Duration,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let queue = Arc::clone(queue);
            let coordinator = Arc::clone(coordinator);
            tokio::spawn(async move {
                run_worker(worker_id, queue, coordinator, request_timeout).await
            })
        })
        .collect()
}

/// Takes connections off the queue one at a time until it is closed and empty
async fn run_worker(
    worker_id: usize,
    queue: ConnectionQueue,
    coordinator: Arc<Coordinator>,
    request_timeout: Duration,
) {
    loop {
        let next = queue.lock().await.recv().await;
        let Some((mut stream, peer)) = next else {
            break;
        };

        debug!("Worker {} handling {}", worker_id, peer);
        if let Err(e) = handle_connection(&mut stream, &coordinator, request_timeout).await {
            warn!("Connection from {} closed with error: {}", peer, e);
        }
        if let Err(e) = stream.shutdown().await {
            debug!("Failed to shut down connection from {}: {}", peer, e);
        }
    }
    debug!("Worker {} exiting", worker_id);
}

/// Waits up to `grace` for workers, then aborts the rest
async fn drain_workers(pool: &mut Vec<JoinHandle<()>>, grace: Duration) {
    let deadline = tokio::time::Instant::now() + grace;

    for handle in pool.iter_mut() {
        if tokio::time::timeout_at(deadline, &mut *handle).await.is_err() {
            break;
        }
    }

    let stuck: Vec<_> = pool.drain(..).filter(|h| !h.is_finished()).collect();
    if !stuck.is_empty() {
        warn!(
            "{} workers still busy after {:?}, closing their connections",
            stuck.len(),
            grace
        );
        for handle in stuck {
            handle.abort();
        }
    }
}
