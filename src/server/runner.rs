//! Server execution logic: bind, accept, shut down.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::select;

use super::broadcast::Broadcaster;
use super::handler;
use super::registry::SessionRegistry;

/// The chat server: a listening socket plus the shared session registry.
pub struct ChatServer {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    next_conn_id: AtomicU64,
}

impl ChatServer {
    /// Bind the listening socket. Port 0 binds an ephemeral port, exposed
    /// via [`local_addr`](Self::local_addr).
    pub async fn bind(host: &str, port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        Ok(Self {
            listener,
            registry: Arc::new(SessionRegistry::new()),
            next_conn_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle to the session registry shared with all connection workers.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept connections until `shutdown` completes.
    ///
    /// Completion of the shutdown future closes the listening socket and
    /// stops intake; it is an expected signal, not an error. Connection
    /// workers already running are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let ChatServer {
            listener,
            registry,
            next_conn_id,
        } = self;
        let broadcaster = Broadcaster::new(Arc::clone(&registry));
        tokio::pin!(shutdown);

        tracing::info!(addr = %listener.local_addr()?, "chat server listening");

        loop {
            select! {
                _ = &mut shutdown => {
                    tracing::info!("listener closed, no longer accepting connections");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn_id = next_conn_id.fetch_add(1, Ordering::Relaxed);
                        tracing::debug!(%peer, conn_id, "accepted connection");
                        tokio::spawn(handler::run_session(
                            stream,
                            conn_id,
                            Arc::clone(&registry),
                            broadcaster.clone(),
                        ));
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
                },
            }
        }

        Ok(())
    }

    /// Run until Ctrl+C.
    pub async fn run_until_ctrl_c(self) -> io::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}
