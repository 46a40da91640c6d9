//! Error taxonomy for the chat client.
//!
//! Transient errors (I/O failures, closed peers, watchdog timeouts, garbled
//! auth replies) drive the reconnect supervisor's backoff. Everything else is
//! fatal and goes straight to the top-level handler.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the connection core
#[derive(Debug, Error)]
pub enum ChatError {
    /// Socket-level failure (DNS, refused, reset, write error)
    #[error("connection error while {context}: {source}")]
    Connection {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The peer closed the stream
    #[error("connection closed by server")]
    ConnectionClosed,

    /// No liveness event arrived within the watchdog window
    #[error("no activity for {0:?}")]
    ConnectionTimeout(Duration),

    /// The server answered the credential line with something that is not JSON
    #[error("malformed server response {line:?}: {source}")]
    MalformedResponse {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    /// The server did not recognise the token
    #[error("invalid token: the server did not recognise it")]
    InvalidToken,

    /// Registration was attempted without a nickname
    #[error("a nickname is required to register")]
    InvalidNickname,

    /// Retry budget consumed
    #[error("gave up after {attempts} connection attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Box<ChatError>,
    },
}

impl ChatError {
    /// Wrap an I/O error with a short description of what was happening
    pub fn connection(context: impl Into<String>, source: io::Error) -> Self {
        ChatError::Connection {
            context: context.into(),
            source,
        }
    }

    /// Whether the supervisor should retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChatError::Connection { .. }
                | ChatError::ConnectionClosed
                | ChatError::ConnectionTimeout(_)
                | ChatError::MalformedResponse { .. }
        )
    }
}
