//! Command dispatcher
//!
//! Applies one parsed command to a session: drives the login transition,
//! mutates the registry and invokes the broadcaster. Protocol errors become
//! an `ERR <reason>` reply to the issuing client; only transport errors are
//! returned to the caller.

use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::error::AppError;
use crate::message::{ClientCommand, ServerMessage};
use crate::session::{Session, SessionState};

/// Handle one command for `session`
///
/// Commands that are not valid in the session's current state are ignored
/// without a reply and without refreshing its activity.
pub async fn dispatch(
    session: &mut Session,
    broadcaster: &Broadcaster,
    cmd: ClientCommand,
) -> Result<(), AppError> {
    let Err(err) = execute(session, broadcaster, cmd).await else {
        return Ok(());
    };

    let reply = ServerMessage::try_from(err)?;
    debug!("Session {} -> {}", session.id(), reply);
    session.handle().send(reply).await?;
    Ok(())
}

async fn execute(
    session: &mut Session,
    broadcaster: &Broadcaster,
    cmd: ClientCommand,
) -> Result<(), AppError> {
    match (session.state(), cmd) {
        (SessionState::Unauthenticated, ClientCommand::Login { username }) => {
            broadcaster.registry().touch(session.id());
            handle_login(session, broadcaster, username).await
        }
        (SessionState::Authenticated, ClientCommand::Msg { text }) => {
            broadcaster.registry().touch(session.id());
            handle_msg(session, broadcaster, text);
            Ok(())
        }
        (SessionState::Authenticated, ClientCommand::Who) => {
            broadcaster.registry().touch(session.id());
            handle_who(session, broadcaster).await
        }
        (SessionState::Authenticated, ClientCommand::Dm { target, text }) => {
            broadcaster.registry().touch(session.id());
            handle_dm(session, broadcaster, target, text)
        }
        (SessionState::Authenticated, ClientCommand::InvalidDm) => {
            broadcaster.registry().touch(session.id());
            Err(AppError::InvalidDmFormat)
        }
        (SessionState::Authenticated, ClientCommand::Ping) => {
            broadcaster.registry().touch(session.id());
            session.handle().send(ServerMessage::Pong).await?;
            Ok(())
        }
        (state, cmd) => {
            debug!("Ignoring {:?} from session {} in state {:?}", cmd, session.id(), state);
            Ok(())
        }
    }
}

/// Handle `LOGIN <name>`
async fn handle_login(
    session: &mut Session,
    broadcaster: &Broadcaster,
    username: String,
) -> Result<(), AppError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::InvalidUsername);
    }

    if !broadcaster.registry().try_bind(username, session.handle()) {
        debug!("Session {} asked for taken name '{}'", session.id(), username);
        return Err(AppError::UsernameTaken(username.to_string()));
    }

    session.authenticate(username.to_string());
    info!("User '{}' logged in on session {}", username, session.id());
    session.handle().send(ServerMessage::Ok).await?;
    Ok(())
}

/// Handle `MSG <text>`
fn handle_msg(session: &Session, broadcaster: &Broadcaster, text: String) {
    if text.is_empty() {
        return;
    }
    let from = session.username().unwrap_or_default().to_string();
    let delivered = broadcaster.broadcast_except(ServerMessage::Msg { from, text }, Some(session.id()));
    debug!("Broadcast from session {} reached {} sessions", session.id(), delivered);
}

/// Handle `WHO`
async fn handle_who(session: &Session, broadcaster: &Broadcaster) -> Result<(), AppError> {
    // Snapshot first, the lock must not be held while awaiting sends
    let users = broadcaster.registry().snapshot_all();
    for (username, _) in users {
        session.handle().send(ServerMessage::User { username }).await?;
    }
    Ok(())
}

/// Handle `DM <user> <text>`
fn handle_dm(
    session: &Session,
    broadcaster: &Broadcaster,
    target: String,
    text: String,
) -> Result<(), AppError> {
    let Some(recipient) = broadcaster.registry().lookup(&target) else {
        return Err(AppError::UserNotFound(target));
    };

    let from = session.username().unwrap_or_default().to_string();
    broadcaster.send_to(&recipient, ServerMessage::Dm { from, text });
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::message::ErrorCode;
    use crate::registry::Registry;
    use crate::session::SessionHandle;
    use crate::types::SessionId;

    fn connect(broadcaster: &Broadcaster) -> (Session, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = SessionHandle::new(SessionId::new(), tx, CancellationToken::new());
        broadcaster.registry().track(handle.clone());
        (Session::new(handle), rx)
    }

    async fn login(
        broadcaster: &Broadcaster,
        name: &str,
    ) -> (Session, mpsc::Receiver<ServerMessage>) {
        let (mut session, mut rx) = connect(broadcaster);
        let cmd = ClientCommand::Login {
            username: name.to_string(),
        };
        dispatch(&mut session, broadcaster, cmd).await.unwrap();
        assert_eq!(rx.recv().await, Some(ServerMessage::Ok));
        (session, rx)
    }

    fn new_broadcaster() -> Broadcaster {
        Broadcaster::new(Arc::new(Registry::new()))
    }

    #[tokio::test]
    async fn test_login_taken_then_retry() {
        let b = new_broadcaster();
        let (_naman, _naman_rx) = login(&b, "Naman").await;

        let (mut other, mut other_rx) = connect(&b);
        let taken = ClientCommand::Login {
            username: "Naman".to_string(),
        };
        dispatch(&mut other, &b, taken).await.unwrap();
        assert_eq!(
            other_rx.recv().await,
            Some(ServerMessage::Err(ErrorCode::UsernameTaken))
        );
        assert_eq!(other.state(), SessionState::Unauthenticated);

        let retry = ClientCommand::Login {
            username: "Yudi".to_string(),
        };
        dispatch(&mut other, &b, retry).await.unwrap();
        assert_eq!(other_rx.recv().await, Some(ServerMessage::Ok));
        assert_eq!(other.username(), Some("Yudi"));
    }

    #[tokio::test]
    async fn test_login_empty_name() {
        let b = new_broadcaster();
        let (mut session, mut rx) = connect(&b);
        let cmd = ClientCommand::Login {
            username: "  ".to_string(),
        };
        dispatch(&mut session, &b, cmd).await.unwrap();
        assert_eq!(rx.recv().await, Some(ServerMessage::Err(ErrorCode::InvalidUsername)));
        assert!(b.registry().is_empty());
    }

    #[tokio::test]
    async fn test_commands_before_login_are_ignored() {
        let b = new_broadcaster();
        let (_bob, mut bob_rx) = login(&b, "Bob").await;
        let (mut anon, mut anon_rx) = connect(&b);

        for cmd in [
            ClientCommand::Ping,
            ClientCommand::Who,
            ClientCommand::Msg {
                text: "hello".to_string(),
            },
        ] {
            dispatch(&mut anon, &b, cmd).await.unwrap();
        }

        assert!(anon_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());
        assert_eq!(anon.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_login_after_login_is_ignored() {
        let b = new_broadcaster();
        let (mut naman, mut rx) = login(&b, "Naman").await;
        let again = ClientCommand::Login {
            username: "Other".to_string(),
        };
        dispatch(&mut naman, &b, again).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert!(b.registry().lookup("Other").is_none());
    }

    #[tokio::test]
    async fn test_msg_not_echoed() {
        let b = new_broadcaster();
        let (mut alice, mut alice_rx) = login(&b, "Alice").await;
        let (_bob, mut bob_rx) = login(&b, "Bob").await;

        let cmd = ClientCommand::Msg {
            text: "hi there".to_string(),
        };
        dispatch(&mut alice, &b, cmd).await.unwrap();

        assert_eq!(
            bob_rx.recv().await,
            Some(ServerMessage::Msg {
                from: "Alice".to_string(),
                text: "hi there".to_string()
            })
        );
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_who_lists_everyone() {
        let b = new_broadcaster();
        let (_naman, _naman_rx) = login(&b, "Naman").await;
        let (mut yudi, mut yudi_rx) = login(&b, "Yudi").await;

        dispatch(&mut yudi, &b, ClientCommand::Who).await.unwrap();

        let mut names = Vec::new();
        for _ in 0..2 {
            match yudi_rx.recv().await {
                Some(ServerMessage::User { username }) => names.push(username),
                other => panic!("unexpected {:?}", other),
            }
        }
        names.sort();
        assert_eq!(names, vec!["Naman", "Yudi"]);
    }

    #[tokio::test]
    async fn test_dm_delivery_and_missing_target() {
        let b = new_broadcaster();
        let (mut alice, mut alice_rx) = login(&b, "Alice").await;
        let (_bob, mut bob_rx) = login(&b, "Bob").await;
        let (_carol, mut carol_rx) = login(&b, "Carol").await;

        let cmd = ClientCommand::Dm {
            target: "Bob".to_string(),
            text: "hello".to_string(),
        };
        dispatch(&mut alice, &b, cmd).await.unwrap();
        assert_eq!(
            bob_rx.recv().await,
            Some(ServerMessage::Dm {
                from: "Alice".to_string(),
                text: "hello".to_string()
            })
        );

        let cmd = ClientCommand::Dm {
            target: "Dave".to_string(),
            text: "hello".to_string(),
        };
        dispatch(&mut alice, &b, cmd).await.unwrap();
        assert_eq!(
            alice_rx.recv().await,
            Some(ServerMessage::Err(ErrorCode::UserNotFound))
        );
        assert!(bob_rx.try_recv().is_err());
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_ping_and_invalid_dm() {
        let b = new_broadcaster();
        let (mut alice, mut rx) = login(&b, "Alice").await;

        dispatch(&mut alice, &b, ClientCommand::Ping).await.unwrap();
        assert_eq!(rx.recv().await, Some(ServerMessage::Pong));

        dispatch(&mut alice, &b, ClientCommand::InvalidDm).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::Err(ErrorCode::InvalidDmFormat))
        );
    }

    #[tokio::test]
    async fn test_reply_to_closed_queue_is_fatal() {
        let b = new_broadcaster();
        let (mut alice, rx) = login(&b, "Alice").await;
        drop(rx);

        let result = dispatch(&mut alice, &b, ClientCommand::Ping).await;
        assert!(matches!(result, Err(AppError::Send(_))));
    }
}
