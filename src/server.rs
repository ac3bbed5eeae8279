//! ChatServer implementation
//!
//! Owns the listening socket and the shared registry, spawns one handler
//! task per accepted connection plus the idle reaper, and tears everything
//! down when the shutdown token is cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::broadcast::Broadcaster;
use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::handle_connection;
use crate::reaper::IdleReaper;
use crate::registry::Registry;

/// The chat server
///
/// Bound on construction so that bind failures surface before any task is
/// spawned, and so callers can learn the actual port when binding to `:0`.
pub struct ChatServer {
    listener: TcpListener,
    broadcaster: Broadcaster,
    config: ServerConfig,
    shutdown: CancellationToken,
    /// Parent of every session's token; cancelled only after the registry
    /// is cleared so departing sessions find nothing to announce
    sessions: CancellationToken,
}

impl ChatServer {
    /// Bind the listening socket
    ///
    /// Rejects a zero reap interval or outbound buffer before binding.
    pub async fn bind(config: ServerConfig) -> Result<Self, AppError> {
        config.validate()?;
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let registry = Arc::new(Registry::new());

        Ok(Self {
            listener,
            broadcaster: Broadcaster::new(registry),
            config,
            shutdown: CancellationToken::new(),
            sessions: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Token that stops the server when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shutdown
    ///
    /// Returns once every session task and the reaper have finished.
    pub async fn run(self) -> Result<(), AppError> {
        info!(
            "Chat server listening on {} (idle timeout {:?})",
            self.listener.local_addr()?,
            self.config.idle_timeout
        );

        let tracker = TaskTracker::new();

        let reaper = IdleReaper::new(
            self.broadcaster.clone(),
            self.config.idle_timeout,
            self.config.reap_interval,
        );
        tracker.spawn(reaper.run(self.shutdown.clone()));

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(
                                "New connection from {} ({} open)",
                                addr,
                                self.broadcaster.registry().connection_count() + 1
                            );
                            let broadcaster = self.broadcaster.clone();
                            let cancel = self.sessions.child_token();
                            let outbound_buffer = self.config.outbound_buffer;

                            tracker.spawn(async move {
                                if let Err(e) =
                                    handle_connection(stream, broadcaster, cancel, outbound_buffer).await
                                {
                                    error!("Connection handler error: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
            }
        }

        info!("Chat server shutting down");

        // Clear before cancelling: sessions that close afterwards find no
        // binding and broadcast no INFO.
        let open = self.broadcaster.registry().clear();
        debug!("Closing {} open sessions", open.len());
        self.sessions.cancel();

        tracker.close();
        tracker.wait().await;

        info!("Chat server stopped");
        Ok(())
    }
}
