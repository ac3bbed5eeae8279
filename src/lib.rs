//! Line-oriented TCP Chat Server Library
//!
//! A chat server speaking a newline-terminated text protocol over plain TCP,
//! built on tokio.
//!
//! # Features
//! - Login with a unique, case-sensitive username
//! - Broadcast messages (`MSG`) that never echo to the sender
//! - Private messages (`DM`)
//! - User listing (`WHO`)
//! - Heartbeat (`PING`/`PONG`)
//! - Idle eviction by a background reaper
//!
//! # Architecture
//! - Each connection runs in its own `handler` task with a separate write
//!   task draining an `mpsc` queue onto the socket
//! - `Registry` is the one piece of shared state, a mutex-guarded map
//!   between usernames and sessions plus each session's last activity
//! - `Broadcaster` fans messages out over registry snapshots and owns the
//!   idempotent disconnect path
//! - `IdleReaper` scans the registry on a fixed interval
//!
//! # Example
//! ```ignore
//! use line_chat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let server = ChatServer::bind(ServerConfig::new("127.0.0.1:4000")).await.unwrap();
//!     let shutdown = server.shutdown_token();
//!     tokio::spawn(async move {
//!         tokio::signal::ctrl_c().await.ok();
//!         shutdown.cancel();
//!     });
//!     server.run().await.unwrap();
//! }
//! ```

pub mod broadcast;
pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod reaper;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use broadcast::Broadcaster;
pub use codec::{CodecError, LineCodec};
pub use config::ServerConfig;
pub use error::{AppError, SendError};
pub use handler::handle_connection;
pub use message::{ClientCommand, ErrorCode, ServerMessage};
pub use reaper::IdleReaper;
pub use registry::Registry;
pub use server::ChatServer;
pub use session::{Session, SessionHandle, SessionState};
pub use types::SessionId;
