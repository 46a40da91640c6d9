//! Terminal front end: chat lines to stdout, typed lines to the outbound
//! queue, connection status to the log.

use crate::protocol::{ConnectionState, StatusEvent};
use std::io::{self, BufRead};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Read stdin lines on a dedicated thread and queue them for sending.
///
/// The sender is dropped at end of input, which closes the outbound queue.
pub fn spawn_stdin_reader(outbound: mpsc::UnboundedSender<String>) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if outbound.send(line).is_err() {
                break;
            }
        }
        debug!("Stdin closed");
    });
}

/// Print chat lines until the message queue closes
pub async fn print_messages(mut messages: mpsc::UnboundedReceiver<String>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = messages.recv().await {
        let written = async {
            stdout.write_all(message.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        };
        if let Err(e) = written.await {
            warn!("Failed to write to stdout: {}", e);
            break;
        }
    }
}

/// Log status notifications until the status queue closes
pub async fn report_status(mut status: mpsc::UnboundedReceiver<StatusEvent>) {
    while let Some(event) = status.recv().await {
        match event {
            StatusEvent::Read(state) => info!("Receiving connection: {}", describe(state)),
            StatusEvent::Send(state) => info!("Sending connection: {}", describe(state)),
            StatusEvent::NicknameReceived(nickname) => info!("Logged in as {}", nickname),
        }
    }
}

fn describe(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Initiated => "connecting",
        ConnectionState::Established => "established",
        ConnectionState::Closed => "closed",
    }
}
