//! Connection watchdog.
//!
//! Every component that observes traffic reports a liveness event. The
//! watchdog re-arms its timer on each event and fails the attempt cycle with
//! [`ChatError::ConnectionTimeout`] once the window elapses in silence.

use crate::error::ChatError;
use crate::protocol::LivenessEvent;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Producer handle for liveness events
#[derive(Debug, Clone)]
pub struct Liveness {
    tx: mpsc::UnboundedSender<LivenessEvent>,
}

impl Liveness {
    /// Create a liveness channel for one attempt cycle
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LivenessEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Report activity. Never blocks.
    pub fn alive(&self, reason: &'static str) {
        // The watchdog only goes away when the cycle is being torn down
        let _ = self.tx.send(LivenessEvent::new(reason));
    }
}

/// Watch the liveness stream until it goes quiet for `timeout`.
///
/// Only an elapsed timer counts as a timeout. Dropping this future (sibling
/// failure) simply cancels the wait.
pub async fn watch(
    mut events: mpsc::UnboundedReceiver<LivenessEvent>,
    timeout: Duration,
) -> Result<Infallible, ChatError> {
    loop {
        match tokio::time::timeout(timeout, events.recv()).await {
            Ok(Some(event)) => {
                debug!(
                    "Connection is alive. {} ({:?} ago)",
                    event.reason,
                    event.at.elapsed()
                );
            }
            Ok(None) => {
                // No producer can re-arm us any more; let the window run out
                tokio::time::sleep(timeout).await;
                warn!("{:?} elapsed without connection activity", timeout);
                return Err(ChatError::ConnectionTimeout(timeout));
            }
            Err(_) => {
                warn!("{:?} elapsed without connection activity", timeout);
                return Err(ChatError::ConnectionTimeout(timeout));
            }
        }
    }
}
