//! TCP Server
//!
//! Accepts connections and dispatches each to its own thread.

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::Config;
use crate::error::{DaError, Result};
use crate::lifecycle::CancellationToken;
use crate::protocol::{write_response, Response};
use crate::service::StorageService;

use super::Connection;

/// How long the acceptor sleeps when no client is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// TCP server for dakv
pub struct Server {
    config: Config,
    service: Arc<dyn StorageService>,
    listener: TcpListener,
    local_addr: SocketAddr,
    token: CancellationToken,
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Bind `config.listen_addr`; port 0 picks a free port
    pub fn bind(
        config: Config,
        service: Arc<dyn StorageService>,
        token: CancellationToken,
    ) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr)
            .map_err(|e| DaError::Network(format!("bind {}: {}", config.listen_addr, e)))?;
        // Non-blocking so the accept loop can observe cancellation
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            config,
            service,
            listener,
            local_addr,
            token,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Serve until the token is cancelled (blocking)
    ///
    /// Returns after every connection thread has exited.
    pub fn run(&self) -> Result<()> {
        tracing::info!(
            addr = %self.local_addr,
            backend = %self.service.identity(),
            "Server listening"
        );

        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while !self.token.is_cancelled() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    workers.retain(|w| !w.is_finished());

                    if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
                        tracing::warn!(%peer, limit = self.config.max_connections, "Rejecting connection");
                        let mut stream = stream;
                        let _ = write_response(&mut stream, &Response::unavailable("too many connections"));
                        continue;
                    }

                    match self.spawn_connection(stream) {
                        Ok(worker) => workers.push(worker),
                        Err(e) => tracing::warn!(%peer, error = %e, "Failed to start connection"),
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!(connections = workers.len(), "Server shutting down");
        for worker in workers {
            let _ = worker.join();
        }

        Ok(())
    }

    fn spawn_connection(&self, stream: std::net::TcpStream) -> Result<JoinHandle<()>> {
        // Accepted sockets inherit non-blocking mode on some platforms
        stream.set_nonblocking(false)?;

        let mut connection =
            Connection::new(stream, Arc::clone(&self.service), self.token.clone())?;
        connection.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms)?;

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::SeqCst);

        let spawned = thread::Builder::new()
            .name("dakv-conn".to_string())
            .spawn(move || {
                if let Err(e) = connection.handle() {
                    tracing::debug!(peer = connection.peer_addr(), error = %e, "Connection ended with error");
                }
                active.fetch_sub(1, Ordering::SeqCst);
            });

        match spawned {
            Ok(handle) => Ok(handle),
            Err(e) => {
                self.active.fetch_sub(1, Ordering::SeqCst);
                Err(DaError::Io(e))
            }
        }
    }
}
