//! Queues shared between the connection core and its collaborators.
//!
//! Every queue is unbounded: producers never wait, and each queue has a
//! single consumer. The outbound receiver outlives attempt cycles (messages
//! typed during a reconnect are kept), so it sits behind an async mutex that
//! only the live cycle's writer holds.

use crate::protocol::StatusEvent;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Ends used by the connection core
#[derive(Debug, Clone)]
pub struct CoreQueues {
    /// Decoded chat lines for display
    pub messages: mpsc::UnboundedSender<String>,
    /// Chat lines to append to the history file
    pub history: mpsc::UnboundedSender<String>,
    /// Connection state notifications
    pub status: mpsc::UnboundedSender<StatusEvent>,
    /// User-composed text waiting to be sent
    pub outbound: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl CoreQueues {
    /// Publish a status notification. A closed status sink is ignored.
    pub fn status(&self, event: StatusEvent) {
        let _ = self.status.send(event);
    }
}

/// Ends used by the UI and history collaborators
#[derive(Debug)]
pub struct CollaboratorQueues {
    pub messages: mpsc::UnboundedReceiver<String>,
    pub history: mpsc::UnboundedReceiver<String>,
    pub status: mpsc::UnboundedReceiver<StatusEvent>,
    pub outbound: mpsc::UnboundedSender<String>,
}

/// Build the session's queues
pub fn queues() -> (CoreQueues, CollaboratorQueues) {
    let (messages_tx, messages_rx) = mpsc::unbounded_channel();
    let (history_tx, history_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    (
        CoreQueues {
            messages: messages_tx,
            history: history_tx,
            status: status_tx,
            outbound: Arc::new(Mutex::new(outbound_rx)),
        },
        CollaboratorQueues {
            messages: messages_rx,
            history: history_rx,
            status: status_rx,
            outbound: outbound_tx,
        },
    )
}
