//! Message streams of one attempt cycle.
//!
//! - Inbound reader: receiving connection -> message sink + history sink
//! - Outbound writer: outbound queue -> sending connection
//! - Keepalive pinger: empty lines on the sending connection
//!
//! All three report liveness to the watchdog and only return on failure.

use crate::error::ChatError;
use crate::transport::{decode_line, LineReader, LineWriter};
use crate::watchdog::Liveness;
use std::convert::Infallible;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Strip literal `\n` escape sequences left by shell quoting.
///
/// Repeats until none remain, so removing one sequence can't expose another.
/// Real newlines are left alone.
pub fn sanitize(text: &str) -> String {
    let mut text = text.to_string();
    while text.contains("\\n") {
        text = text.replace("\\n", "");
    }
    text
}

/// Forward every chat line to both sinks until the server closes the stream
pub async fn read_loop<R: AsyncRead + Unpin>(
    reader: &mut LineReader<R>,
    messages: &mpsc::UnboundedSender<String>,
    history: &mpsc::UnboundedSender<String>,
    liveness: &Liveness,
) -> Result<Infallible, ChatError> {
    loop {
        let raw = reader.read_line().await?;
        if raw.is_empty() {
            info!("Receiving connection closed by server");
            return Err(ChatError::ConnectionClosed);
        }

        let line = decode_line(&raw);
        if messages.send(line.clone()).is_err() {
            debug!("Message sink closed, dropping line");
        }
        if history.send(line).is_err() {
            debug!("History sink closed, dropping line");
        }
        liveness.alive("New message in chat");
    }
}

/// Send queued user messages for as long as the cycle lives.
///
/// When `token` is set it is written once before the first message. Once
/// every producer is gone the writer idles, leaving the connections to the
/// other loops.
pub async fn write_loop<W: AsyncWrite + Unpin>(
    writer: &Mutex<LineWriter<W>>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    liveness: &Liveness,
    token: Option<&str>,
) -> Result<Infallible, ChatError> {
    if let Some(token) = token {
        writer.lock().await.write_line(token.trim()).await?;
    }

    while let Some(message) = outbound.recv().await {
        let mut pending = Undelivered(Some(message.as_str()));

        // Blank line terminates a message
        let line = format!("{}\n", sanitize(&message));
        writer.lock().await.write_line(&line).await?;
        pending.0 = None;

        debug!("Sent {} bytes", line.len() + 1);
        liveness.alive("Message sent");
    }

    info!("Outbound queue closed, no more messages will be sent");
    std::future::pending().await
}

/// Warns about a dequeued message that never made it onto the wire
struct Undelivered<'a>(Option<&'a str>);

impl Drop for Undelivered<'_> {
    fn drop(&mut self) {
        if let Some(message) = self.0 {
            warn!("Message was not delivered: {:?}", message);
        }
    }
}

/// Keep the sending connection busy with empty lines.
///
/// Each ping is answered by one line from the server, which also keeps the
/// sending connection's inbound side drained.
pub async fn ping<R, W>(
    writer: &Mutex<LineWriter<W>>,
    reader: &mut LineReader<R>,
    liveness: &Liveness,
    interval: Duration,
) -> Result<Infallible, ChatError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        writer.lock().await.write_line("").await?;

        if reader.read_line().await?.is_empty() {
            info!("Sending connection closed by server");
            return Err(ChatError::ConnectionClosed);
        }
        liveness.alive("Ping answered");

        tokio::time::sleep(interval).await;
    }
}
