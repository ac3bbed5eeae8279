//! Broadcaster
//!
//! Delivers messages to one or many registered sessions and owns the
//! disconnect path. A delivery failure never reaches the sender; it closes
//! the session that could not be written to instead.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::message::ServerMessage;
use crate::registry::Registry;
use crate::session::SessionHandle;
use crate::types::SessionId;

/// Message fan-out over the shared registry
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Send `msg` to every authenticated session except `excluded`
    ///
    /// Returns how many sessions accepted the message. Sessions that could
    /// not take it are disconnected.
    pub fn broadcast_except(&self, msg: ServerMessage, excluded: Option<SessionId>) -> usize {
        let (delivered, failed) = self.fan_out(&msg, excluded);
        self.evict(failed);
        delivered
    }

    /// Send `msg` to a single session
    ///
    /// On failure only the target is disconnected; returns whether the
    /// message was queued.
    pub fn send_to(&self, target: &SessionHandle, msg: ServerMessage) -> bool {
        match target.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!("Delivery to session {} failed: {}", target.id, e);
                self.evict(vec![target.clone()]);
                false
            }
        }
    }

    /// Remove a session and tell everyone else it left
    ///
    /// Closes the connection unconditionally. Only the call that actually
    /// unbinds the session broadcasts `INFO <name> disconnected`, so racing
    /// callers (the session itself and the idle reaper) produce one notice.
    /// Returns the username if this call did the unbinding.
    pub fn disconnect(&self, handle: &SessionHandle) -> Option<String> {
        handle.close();
        let username = self.registry.unbind(handle.id)?;
        info!("User '{}' disconnected", username);

        let (_, failed) = self.fan_out(
            &ServerMessage::Disconnected {
                username: username.clone(),
            },
            None,
        );
        self.evict(failed);
        Some(username)
    }

    /// Deliver to a registry snapshot, collecting the sessions that failed
    fn fan_out(
        &self,
        msg: &ServerMessage,
        excluded: Option<SessionId>,
    ) -> (usize, Vec<SessionHandle>) {
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (username, handle) in self.registry.snapshot_all() {
            if Some(handle.id) == excluded {
                continue;
            }
            match handle.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("Broadcast to '{}' failed: {}", username, e);
                    failed.push(handle);
                }
            }
        }

        (delivered, failed)
    }

    /// Disconnect failed sessions without recursing
    ///
    /// Each disconnect's INFO broadcast may itself fail on further sessions;
    /// those are queued here rather than handled by nested calls.
    fn evict(&self, mut pending: Vec<SessionHandle>) {
        while let Some(handle) = pending.pop() {
            handle.close();
            let Some(username) = self.registry.unbind(handle.id) else {
                continue;
            };
            debug!("Evicted '{}' after failed delivery", username);

            let (_, failed) = self.fan_out(&ServerMessage::Disconnected { username }, None);
            pending.extend(failed);
        }
    }
}
