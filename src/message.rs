//! Message protocol definitions
//!
//! Newline-terminated ASCII protocol with case-sensitive keywords.
//! `ClientCommand` is parsed from one framed line; `ServerMessage` is the
//! transient envelope rendered back as one line.

use std::fmt;

use crate::error::AppError;

/// Client → Server command
///
/// Parsed from a single trimmed line. Lines that match no keyword are not
/// represented here; `parse` returns `None` and the caller ignores them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// `LOGIN <name>`; name may be empty, validated on dispatch
    Login { username: String },
    /// `MSG <text>`
    Msg { text: String },
    /// `WHO`
    Who,
    /// `DM <user> <text>`
    Dm { target: String, text: String },
    /// `DM` missing either the target or the body
    InvalidDm,
    /// `PING`
    Ping,
}

impl ClientCommand {
    /// Parse one line into a command
    ///
    /// Returns `None` for unrecognized input.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (keyword, rest) = match line.split_once(' ') {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (line, ""),
        };

        match keyword {
            "LOGIN" => Some(ClientCommand::Login {
                username: rest.to_string(),
            }),
            "MSG" => Some(ClientCommand::Msg {
                text: rest.to_string(),
            }),
            "WHO" if rest.is_empty() => Some(ClientCommand::Who),
            "PING" if rest.is_empty() => Some(ClientCommand::Ping),
            "DM" => match rest.split_once(' ') {
                Some((target, text)) if !text.trim().is_empty() => Some(ClientCommand::Dm {
                    target: target.to_string(),
                    text: text.trim().to_string(),
                }),
                _ => Some(ClientCommand::InvalidDm),
            },
            _ => None,
        }
    }
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Login accepted
    Ok,
    /// Protocol error for the receiving client
    Err(ErrorCode),
    /// Broadcast delivery
    Msg { from: String, text: String },
    /// Private delivery
    Dm { from: String, text: String },
    /// One logged-in user, in answer to WHO
    User { username: String },
    /// A peer left
    Disconnected { username: String },
    /// Heartbeat reply
    Pong,
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Ok => write!(f, "OK"),
            ServerMessage::Err(code) => write!(f, "ERR {}", code),
            ServerMessage::Msg { from, text } => write!(f, "MSG {} {}", from, text),
            ServerMessage::Dm { from, text } => write!(f, "DM {} {}", from, text),
            ServerMessage::User { username } => write!(f, "USER {}", username),
            ServerMessage::Disconnected { username } => write!(f, "INFO {} disconnected", username),
            ServerMessage::Pong => write!(f, "PONG"),
        }
    }
}

/// Error codes for `ServerMessage::Err`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// LOGIN with a name another session holds
    UsernameTaken,
    /// LOGIN with an empty name
    InvalidUsername,
    /// DM to a name nobody holds
    UserNotFound,
    /// DM without target or text
    InvalidDmFormat,
    /// Evicted for inactivity
    IdleTimeout,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UsernameTaken => "username-taken",
            ErrorCode::InvalidUsername => "invalid-username",
            ErrorCode::UserNotFound => "user-not-found",
            ErrorCode::InvalidDmFormat => "invalid-dm-format",
            ErrorCode::IdleTimeout => "idle-timeout",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Convert a protocol AppError to the `ERR` line for the client
///
/// Transport errors have no client-facing form and are handed back.
impl TryFrom<AppError> for ServerMessage {
    type Error = AppError;

    fn try_from(err: AppError) -> Result<Self, AppError> {
        let code = match err {
            AppError::UsernameTaken(_) => ErrorCode::UsernameTaken,
            AppError::InvalidUsername => ErrorCode::InvalidUsername,
            AppError::UserNotFound(_) => ErrorCode::UserNotFound,
            AppError::InvalidDmFormat => ErrorCode::InvalidDmFormat,
            AppError::Io(_) | AppError::Send(_) | AppError::InvalidConfig(_) => {
                return Err(err)
            }
        };
        Ok(ServerMessage::Err(code))
    }
}
