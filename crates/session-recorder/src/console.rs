//! Console/page-error capture.
//!
//! A bounded channel feeds a single writer task appending to
//! `console-<ts>.log`. Logging is best-effort: when the buffer backs up,
//! entries are dropped and a warning is emitted at most once per minute.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

use crate::errors::RecorderError;
use crate::layout;

const BUFFER: usize = 256;
const DROP_WARN_INTERVAL: Duration = Duration::from_secs(60);

pub struct ConsoleSink {
    tx: mpsc::Sender<String>,
    path: PathBuf,
    dropped: Arc<AtomicU64>,
    last_warn: Mutex<Option<Instant>>,
}

impl ConsoleSink {
    /// Open `console-<ts>.log` in append mode and start the writer task.
    pub fn open(recording_dir: &Path, ts: i64) -> Result<Self, RecorderError> {
        let path = recording_dir.join(layout::console_log_name(ts));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let (tx, mut rx) = mpsc::channel::<String>(BUFFER);
        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if let Err(err) = file.write_all(line.as_bytes()) {
                    warn!(target: "session-recorder", %err, "console log write failed");
                    break;
                }
            }
            let _ = file.flush();
        });

        Ok(Self {
            tx,
            path,
            dropped: Arc::new(AtomicU64::new(0)),
            last_warn: Mutex::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one console entry. Errors and warnings append any stack that
    /// came with the message.
    pub fn log(&self, level: &str, text: &str, stack: Option<&str>) {
        let mut line = format!(
            "{} [{}] {}\n",
            Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            level.to_uppercase(),
            text
        );
        if let Some(stack) = stack {
            line.push_str(stack);
            line.push('\n');
        }
        self.push(line);
    }

    /// Record an uncaught page error.
    pub fn page_error(&self, message: &str, stack: Option<&str>) {
        let mut line = format!(
            "{} [PAGE-ERROR] {}\n",
            Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            message
        );
        if let Some(stack) = stack {
            line.push_str(stack);
            line.push('\n');
        }
        self.push(line);
    }

    fn push(&self, line: String) {
        if self.tx.try_send(line).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            let mut last = self.last_warn.lock();
            let due = last
                .map(|at| at.elapsed() >= DROP_WARN_INTERVAL)
                .unwrap_or(true);
            if due {
                *last = Some(Instant::now());
                warn!(
                    target: "session-recorder",
                    dropped,
                    "console log buffer full; dropping entries"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_tagged_lines() {
        let dir = tempdir().unwrap();
        let sink = ConsoleSink::open(dir.path(), 1_712_000_000_000).unwrap();
        sink.log("log", "hello from the page", None);
        sink.log("error", "boom", Some("    at broken (app.js:1:1)"));
        sink.page_error("Uncaught TypeError", Some("    at main (app.js:9:3)"));

        // Writer task drains asynchronously.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let contents = std::fs::read_to_string(sink.path()).unwrap();
        assert!(contents.contains("[LOG] hello from the page"));
        assert!(contents.contains("[ERROR] boom"));
        assert!(contents.contains("at broken (app.js:1:1)"));
        assert!(contents.contains("[PAGE-ERROR] Uncaught TypeError"));
    }

    #[tokio::test]
    async fn console_file_name_embeds_timestamp() {
        let dir = tempdir().unwrap();
        let sink = ConsoleSink::open(dir.path(), 42).unwrap();
        assert!(sink.path().ends_with("console-42.log"));
    }
}
