//! Session definition
//!
//! `Session` is the per-connection state machine owned by the connection's
//! handler task. `SessionHandle` is the cheap, cloneable reference that the
//! registry, broadcaster and idle reaper hold to reach that connection.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::SessionId;

/// Session lifecycle states
///
/// Transitions are one-way: `Unauthenticated → Authenticated → Closed`,
/// or straight to `Closed` from `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Closed,
}

/// Non-owning reference to a live connection
///
/// Holds the sending side of the connection's outbound queue and the token
/// that tears the connection down. The socket itself stays with the
/// handler task.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Server → Client message channel
    sender: mpsc::Sender<ServerMessage>,
    /// Cancelled to force the connection closed
    cancel: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        id: SessionId,
        sender: mpsc::Sender<ServerMessage>,
        cancel: CancellationToken,
    ) -> Self {
        Self { id, sender, cancel }
    }

    /// Queue a message, waiting for room in the queue
    ///
    /// Used for replies to the session that issued the command.
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a message without waiting
    ///
    /// Used for deliveries originating from other sessions; a full queue
    /// is reported rather than stalling the caller.
    pub fn try_send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Ask the handler task to close the connection
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the connection has been asked to close
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Per-connection state machine
#[derive(Debug)]
pub struct Session {
    handle: SessionHandle,
    state: SessionState,
    /// Username (None until login succeeds)
    username: Option<String>,
}

impl Session {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            state: SessionState::Unauthenticated,
            username: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.handle.id
    }

    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Move to `Authenticated` under the given name
    ///
    /// Only valid from `Unauthenticated`; returns false otherwise. The caller
    /// must already hold the name in the registry.
    pub fn authenticate(&mut self, username: String) -> bool {
        if self.state != SessionState::Unauthenticated {
            return false;
        }
        self.username = Some(username);
        self.state = SessionState::Authenticated;
        true
    }

    /// Move to `Closed`
    ///
    /// Returns the previous state; closing twice is a no-op returning `Closed`.
    pub fn close(&mut self) -> SessionState {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        self.handle.close();
        previous
    }
}
