//! Chat history file.
//!
//! Append-only text, one `[DD.MM.YYYY HH:MM:SS] <message>` entry per line.
//! On startup the existing entries are replayed into the message sink; a
//! missing file is an empty history.

use crate::transport::decode_line;
use chrono::{Local, NaiveDateTime};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const TIMESTAMP_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

/// Render one history entry, newline included
pub fn format_entry(at: &NaiveDateTime, message: &str) -> String {
    format!(
        "[{}] {}\n",
        at.format(TIMESTAMP_FORMAT),
        message.trim_end_matches(['\r', '\n'])
    )
}

/// Stream existing history lines into `messages`. Returns the line count.
pub async fn load(path: &Path, messages: &mpsc::UnboundedSender<String>) -> io::Result<usize> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("No history at {:?}, starting fresh", path);
            return Ok(0);
        }
        Err(e) => return Err(e),
    };

    let mut reader = BufReader::new(file);
    let mut raw = Vec::new();
    let mut count = 0;
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }
        if messages.send(decode_line(&raw)).is_err() {
            debug!("Message sink closed during history replay");
            break;
        }
        count += 1;
    }

    info!("Replayed {} history lines from {:?}", count, path);
    Ok(count)
}

/// Append handle for the history file
pub struct HistoryWriter {
    path: PathBuf,
    file: File,
}

impl HistoryWriter {
    /// Open `path` for appending, creating it if needed
    pub async fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self { path, file })
    }

    /// Append one entry stamped with `at`
    pub async fn append(&mut self, at: &NaiveDateTime, message: &str) -> io::Result<()> {
        self.file.write_all(format_entry(at, message).as_bytes()).await?;
        self.file.flush().await
    }

    /// Drain `lines` into the file, stamping each with the local time.
    ///
    /// Returns once every producer is gone. A failed write is logged and the
    /// line dropped; history must never take the chat down.
    pub async fn run(mut self, mut lines: mpsc::UnboundedReceiver<String>) {
        while let Some(line) = lines.recv().await {
            let now = Local::now().naive_local();
            if let Err(e) = self.append(&now, &line).await {
                warn!("Failed to write history to {:?}: {}", self.path, e);
            }
        }
        debug!("History sink closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 1)
            .unwrap()
    }

    #[test]
    fn test_format_entry() {
        assert_eq!(format_entry(&stamp(), "hi\n"), "[09.03.2024 07:05:01] hi\n");
        assert_eq!(format_entry(&stamp(), "bare"), "[09.03.2024 07:05:01] bare\n");
    }

    #[tokio::test]
    async fn test_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chat.history");

        let mut writer = HistoryWriter::open(&path).await.unwrap();
        writer.append(&stamp(), "a\n").await.unwrap();
        writer.append(&stamp(), "b\n").await.unwrap();
        drop(writer);

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(load(&path, &tx).await.unwrap(), 2);
        assert_eq!(rx.recv().await.unwrap(), "[09.03.2024 07:05:01] a");
        assert_eq!(rx.recv().await.unwrap(), "[09.03.2024 07:05:01] b");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_history() {
        let dir = tempdir().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(load(&dir.path().join("absent"), &tx).await.unwrap(), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_appends_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("chat.history");

        let writer = HistoryWriter::open(&path).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("first".to_string()).unwrap();
        drop(tx);
        writer.run(rx).await;

        let writer = HistoryWriter::open(&path).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send("second".to_string()).unwrap();
        drop(tx);
        writer.run(rx).await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with('[') && lines[0].ends_with("] first"));
        assert!(lines[1].ends_with("] second"));
    }
}
