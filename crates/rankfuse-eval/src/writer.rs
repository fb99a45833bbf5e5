//! Run directories and the ranking stream.
//!
//! A sweep owns exactly one [`RankingWriter`]: a background task that drains a
//! bounded channel and appends one JSON line per record. Concurrent
//! combinations only ever hold a sender, so lines are never interleaved.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use rankfuse_core::{defaults, Error, RankingRecord, Result};

/// Create a fresh run directory under `root`, named by the UTC timestamp.
///
/// A `-1`, `-2`, ... suffix is appended when a directory with that name
/// already exists; an existing directory is never reused.
pub async fn create_run_dir(root: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    tokio::fs::create_dir_all(root).await?;
    let stamp = now.format(defaults::RUN_DIR_FORMAT).to_string();

    for attempt in 0u32.. {
        let name = if attempt == 0 {
            stamp.clone()
        } else {
            format!("{}-{}", stamp, attempt)
        };
        let candidate = root.join(name);
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => {
                debug!(
                    subsystem = "eval",
                    component = "writer",
                    run_dir = %candidate.display(),
                    "Created run directory"
                );
                return Ok(candidate);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::Internal("exhausted run directory suffixes".to_string()))
}

/// Single-writer append stream of ranking records.
pub struct RankingWriter {
    path: PathBuf,
    sender: mpsc::Sender<RankingRecord>,
    handle: JoinHandle<Result<usize>>,
}

impl RankingWriter {
    /// Create `path` and start the writer task.
    ///
    /// Fails if the file already exists: a ranking stream is never
    /// overwritten or appended to by a second sweep.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => Error::Config(format!(
                    "Refusing to overwrite existing ranking stream {}",
                    path.display()
                )),
                _ => Error::Io(e),
            })?;

        let (sender, receiver) = mpsc::channel(defaults::WRITER_CHANNEL_CAPACITY);
        let handle = tokio::spawn(write_loop(file, receiver));
        Ok(Self {
            path,
            sender,
            handle,
        })
    }

    /// Path of the stream being written.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue one record for writing.
    pub async fn send(&self, record: RankingRecord) -> Result<()> {
        self.sender
            .send(record)
            .await
            .map_err(|_| Error::Internal("ranking writer stopped".to_string()))
    }

    /// Close the channel, wait for every queued record to be flushed, and
    /// return how many lines were written.
    pub async fn finish(self) -> Result<usize> {
        drop(self.sender);
        let written = self
            .handle
            .await
            .map_err(|e| Error::Internal(format!("ranking writer task failed: {}", e)))??;
        info!(
            subsystem = "eval",
            component = "writer",
            path = %self.path.display(),
            record_count = written,
            "Ranking stream closed"
        );
        Ok(written)
    }
}

async fn write_loop(file: File, mut receiver: mpsc::Receiver<RankingRecord>) -> Result<usize> {
    let mut out = BufWriter::new(file);
    let mut written = 0;
    while let Some(record) = receiver.recv().await {
        let mut line = record.to_json_line()?;
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        written += 1;
    }
    out.flush().await?;
    Ok(written)
}

/// Read and validate every record in a ranking stream.
///
/// Blank lines are ignored. Errors name the offending line.
pub async fn read_rankings(path: impl AsRef<Path>) -> Result<Vec<RankingRecord>> {
    let path = path.as_ref();
    let raw = tokio::fs::read_to_string(path).await?;
    let mut records = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = RankingRecord::from_json_line(line).map_err(|e| match e {
            Error::Serialization(msg) => {
                Error::Serialization(format!("{}:{}: {}", path.display(), idx + 1, msg))
            }
            Error::InvalidCandidateList(msg) => {
                Error::InvalidCandidateList(format!("{}:{}: {}", path.display(), idx + 1, msg))
            }
            other => other,
        })?;
        records.push(record);
    }
    debug!(
        subsystem = "eval",
        component = "writer",
        path = %path.display(),
        record_count = records.len(),
        "Read ranking stream"
    );
    Ok(records)
}

/// Write `value` as pretty-printed JSON with a trailing newline.
pub async fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut body = serde_json::to_string_pretty(value)?;
    body.push('\n');
    tokio::fs::write(path, body).await?;
    Ok(())
}
