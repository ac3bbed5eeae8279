//! Idle reaper
//!
//! Background task that periodically scans the registry's activity log and
//! evicts connections that have been silent for longer than the idle
//! threshold. Eviction goes through the same disconnect path as a normal
//! close, so it is safe to race with the session's own cleanup.

use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::message::{ErrorCode, ServerMessage};

/// Shortest scan period; `tokio::time::interval` rejects zero
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic idle-session evictor
#[derive(Debug, Clone)]
pub struct IdleReaper {
    broadcaster: Broadcaster,
    idle_timeout: Duration,
    interval: Duration,
}

impl IdleReaper {
    pub fn new(broadcaster: Broadcaster, idle_timeout: Duration, interval: Duration) -> Self {
        Self {
            broadcaster,
            idle_timeout,
            interval: interval.max(MIN_INTERVAL),
        }
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            "Idle reaper started (timeout {:?}, interval {:?})",
            self.idle_timeout, self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.sweep(Instant::now());
                    if evicted > 0 {
                        debug!("Idle reaper evicted {} sessions", evicted);
                    }
                }
            }
        }

        info!("Idle reaper stopped");
    }

    /// Evict every session idle for longer than the threshold at `now`
    ///
    /// Logged-in users get a best-effort `ERR idle-timeout` first. Returns
    /// the number of connections closed.
    pub fn sweep(&self, now: Instant) -> usize {
        let idle = self
            .broadcaster
            .registry()
            .idle_sessions(now, self.idle_timeout);

        for session in &idle {
            match &session.username {
                Some(username) => {
                    info!("User '{}' timed out (idle)", username);
                    let _ = session
                        .handle
                        .try_send(ServerMessage::Err(ErrorCode::IdleTimeout));
                }
                None => debug!("Closing idle unauthenticated session {}", session.handle.id),
            }
            self.broadcaster.disconnect(&session.handle);
        }

        idle.len()
    }
}
