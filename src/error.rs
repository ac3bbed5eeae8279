//! Error types for the chat server
//!
//! Defines application-level errors and outbound delivery errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both transport errors (the affected session is closed) and
/// protocol errors (an `ERR <reason>` line is sent to the offending client).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal to the session, or to startup when binding)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Outbound queue of this session is gone (fatal to the session)
    #[error("Send error: {0}")]
    Send(#[from] SendError),

    /// Requested username is already bound to another session
    #[error("Username taken: {0}")]
    UsernameTaken(String),

    /// Username empty after trimming
    #[error("Invalid username")]
    InvalidUsername,

    /// DM target is not logged in
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// DM without both a target and a body
    #[error("Invalid DM format")]
    InvalidDmFormat,

    /// Server settings that cannot run (fatal at startup)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Message send errors
///
/// Occurs when a session's outbound queue can no longer accept messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The session's writer task has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// The session is not draining its queue
    #[error("Channel full")]
    ChannelFull,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AppError::UsernameTaken("Naman".into()).to_string(),
            "Username taken: Naman"
        );
        assert_eq!(SendError::ChannelFull.to_string(), "Channel full");
        assert_eq!(
            AppError::InvalidConfig("reap interval must be non-zero").to_string(),
            "Invalid configuration: reap interval must be non-zero"
        );
    }
}
