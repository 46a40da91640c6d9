//! Protocol types for the chat client.
//!
//! Defines the server endpoint, the JSON account line returned by the
//! sending server, the status notifications handed to the UI collaborator,
//! and the session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Server address with one port per direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Server host name or IP
    pub host: String,
    /// Port that accepts the token and outgoing messages
    pub send_port: u16,
    /// Port that streams the chat broadcast
    pub receive_port: u16,
}

/// Account identity returned by the sending server after authorisation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Display name in the chat
    pub nickname: String,
    /// Account token (also used to log in)
    pub account_hash: String,
}

/// Lifecycle of one of the two connections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Attempt cycle started, socket not open yet
    Initiated,
    /// Socket open
    Established,
    /// Socket torn down
    Closed,
}

/// Notification consumed by the status sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Receiving connection changed state
    Read(ConnectionState),
    /// Sending connection changed state
    Send(ConnectionState),
    /// Authorisation resolved the user's nickname
    NicknameReceived(String),
}

/// "The connection is still alive because <reason>"
#[derive(Debug, Clone)]
pub struct LivenessEvent {
    /// When the activity was observed
    pub at: Instant,
    /// Human-readable reason
    pub reason: &'static str,
}

impl LivenessEvent {
    pub fn new(reason: &'static str) -> Self {
        Self {
            at: Instant::now(),
            reason,
        }
    }
}

/// Reconnect schedule for the supervisor
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Retries allowed after the first attempt
    pub max_retries: u32,
    /// Multiplier applied to the delay after each retry
    pub backoff_factor: f64,
    /// A cycle that ran at least this long before failing restores the full budget
    pub healthy_after: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_retries: 3,
            backoff_factor: 1.4,
            healthy_after: Some(Duration::from_secs(30)),
        }
    }
}

/// Configuration for a chat session
#[derive(Debug, Clone)]
pub struct Config {
    /// Where to connect
    pub endpoint: Endpoint,
    /// Reconnect schedule
    pub retry: RetryPolicy,
    /// Watchdog window
    pub watchdog_timeout: Duration,
    /// Delay between keepalive pings on the sending connection
    pub ping_interval: Duration,
    /// Write the token again when the outbound stream starts
    pub resend_token: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                host: "minechat.dvmn.org".to_string(),
                send_port: 5050,
                receive_port: 5000,
            },
            retry: RetryPolicy::default(),
            watchdog_timeout: Duration::from_secs(3),
            ping_interval: Duration::from_secs(1),
            resend_token: true,
        }
    }
}
