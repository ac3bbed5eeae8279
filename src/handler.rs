//! TCP connection handler
//!
//! Runs one client connection: frames incoming lines, feeds them to the
//! dispatcher, and drains the session's outbound queue onto the socket.
//! Whatever ends the connection, the session is removed from the registry
//! and the socket is released.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::codec::{CodecError, LineCodec};
use crate::dispatcher::dispatch;
use crate::error::AppError;
use crate::message::{ClientCommand, ServerMessage};
use crate::session::{Session, SessionHandle};
use crate::types::SessionId;

/// Upper bound on flushing and shutting down the write half
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Handle an accepted TCP connection until it closes
///
/// `cancel` closes the connection from outside: the idle reaper, a failed
/// delivery, or server shutdown.
pub async fn handle_connection(
    stream: TcpStream,
    broadcaster: Broadcaster,
    cancel: CancellationToken,
    outbound_buffer: usize,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let session_id = SessionId::new();
    info!("Session {} opened from {}", session_id, peer_addr);

    let (read_half, write_half) = stream.into_split();
    let mut lines = FramedRead::new(read_half, LineCodec::new());
    let sink = FramedWrite::new(write_half, LineCodec::new());

    // Server -> client queue, drained by the write task
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(outbound_buffer.max(1));
    let handle = SessionHandle::new(session_id, msg_tx, cancel.clone());
    broadcaster.registry().track(handle.clone());
    let mut session = Session::new(handle);

    let write_task = tokio::spawn(write_loop(session_id, sink, msg_rx, cancel.clone()));

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Session {} cancelled", session_id);
                break Ok(());
            }
            frame = lines.next() => {
                match frame {
                    Some(Ok(line)) => {
                        let Some(cmd) = ClientCommand::parse(&line) else {
                            debug!("Ignoring unrecognized line from session {}", session_id);
                            continue;
                        };
                        tokio::select! {
                            outcome = dispatch(&mut session, &broadcaster, cmd) => {
                                if let Err(e) = outcome {
                                    break Err(e);
                                }
                            }
                            _ = cancel.cancelled() => break Ok(()),
                        }
                    }
                    Some(Err(CodecError::Io(e))) => break Err(e.into()),
                    Some(Err(e)) => {
                        warn!("Dropping session {}: {}", session_id, e);
                        break Ok(());
                    }
                    None => {
                        debug!("Session {} reached end of stream", session_id);
                        break Ok(());
                    }
                }
            }
        }
    };

    // Unbind and announce before the socket goes away
    let previous = session.close();
    broadcaster.disconnect(session.handle());
    if let Err(e) = write_task.await {
        warn!("Write task for session {} failed: {}", session_id, e);
    }

    info!(
        "Session {} from {} closed (was {:?})",
        session_id, peer_addr, previous
    );

    result
}

/// Write queued messages until the session is cancelled or the peer is gone
///
/// Messages already queued when cancellation arrives are still written, so
/// an `ERR idle-timeout` reaches the client before the socket closes. A
/// write that would block past cancellation is abandoned.
async fn write_loop(
    session_id: SessionId,
    mut sink: FramedWrite<tokio::net::tcp::OwnedWriteHalf, LineCodec>,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            msg = msg_rx.recv() => {
                let Some(msg) = msg else { break };
                tokio::select! {
                    biased;
                    sent = sink.send(msg) => {
                        if let Err(e) = sent {
                            debug!("Write to session {} failed: {}", session_id, e);
                            break;
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    // A dead writer also ends the read side
    cancel.cancel();
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await;
    debug!("Write task ended for session {}", session_id);
}
