//! Line-oriented TCP transport.
//!
//! Both chat connections speak newline-delimited UTF-8. The reader hands back
//! raw line bytes (empty on graceful close); the writer appends the newline
//! and flushes after every line so nothing lingers in a buffer when a cycle
//! is torn down.

use crate::error::ChatError;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Open a TCP connection and split it into line halves.
///
/// Dropping both halves closes the socket, so a cycle that is cancelled
/// mid-read still releases it. Call [`LineWriter::shutdown`] on the normal
/// path to flush and close the write side first.
pub async fn open(host: &str, port: u16) -> Result<(LineReader, LineWriter), ChatError> {
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| ChatError::connection(format!("connecting to {}:{}", host, port), e))?;

    if let Err(e) = stream.set_nodelay(true) {
        debug!("Failed to set TCP_NODELAY on {}:{}: {}", host, port, e);
    }

    debug!("Connected to {}:{}", host, port);
    let (reader, writer) = stream.into_split();
    Ok((LineReader::new(reader), LineWriter::new(writer)))
}

/// Read half of a line connection
pub struct LineReader<R = OwnedReadHalf> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }

    /// Read up to and including the next `\n`.
    ///
    /// Returns empty bytes when the peer closed the stream. A final line
    /// without a terminator is returned as-is.
    pub async fn read_line(&mut self) -> Result<Vec<u8>, ChatError> {
        let mut line = Vec::new();
        self.inner
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| ChatError::connection("reading line", e))?;
        Ok(line)
    }
}

/// Decode a raw line as UTF-8 (lossy) and strip the line terminator
pub fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// Write half of a line connection
pub struct LineWriter<W = OwnedWriteHalf> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write `text` followed by `\n`, then flush
    pub async fn write_line(&mut self, text: &str) -> Result<(), ChatError> {
        let mut buf = Vec::with_capacity(text.len() + 1);
        buf.extend_from_slice(text.as_bytes());
        buf.push(b'\n');

        self.inner
            .write_all(&buf)
            .await
            .map_err(|e| ChatError::connection("writing line", e))?;
        self.inner
            .flush()
            .await
            .map_err(|e| ChatError::connection("flushing line", e))
    }

    /// Flush and close the write side. Errors are logged, not returned:
    /// the connection is going away either way.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.inner.shutdown().await {
            debug!("Error while closing connection: {}", e);
        }
    }
}
