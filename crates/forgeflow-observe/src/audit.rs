//! JSONL audit trail: one serialized `ForgeEvent` per line.
//!
//! The audit writer is an ordinary bus subscriber, so enabling it never
//! changes engine behavior. Files are opened in append mode; a process
//! restart continues the same trail.

use std::path::{Path, PathBuf};

use forgeflow_core::EventBus;
use forgeflow_types::event::ForgeEvent;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

/// Audit trail failures.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Append-only JSONL writer for lifecycle events.
pub struct AuditWriter {
    path: PathBuf,
    out: BufWriter<tokio::fs::File>,
}

impl AuditWriter {
    /// Open (or create) the audit file in append mode.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            out: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a JSON line.
    pub async fn append(&mut self, event: &ForgeEvent) -> Result<(), AuditError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        self.out.write_all(&line).await?;
        Ok(())
    }

    /// Flush buffered lines to disk.
    pub async fn flush(&mut self) -> Result<(), AuditError> {
        self.out.flush().await?;
        Ok(())
    }
}

/// Subscribe to the bus and append every event to the audit file until
/// the bus is dropped. Returns the number of events written.
///
/// Each event is flushed as it arrives; an audit line exists before the
/// next engine step runs, at the cost of one syscall per event.
pub fn spawn_audit_writer(
    bus: &EventBus,
    path: impl AsRef<Path>,
) -> JoinHandle<Result<u64, AuditError>> {
    let path = path.as_ref().to_path_buf();
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        let mut writer = AuditWriter::open(&path).await?;
        let mut written = 0u64;
        loop {
            match rx.recv().await {
                Ok(event) => {
                    writer.append(&event).await?;
                    writer.flush().await?;
                    written += 1;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, path = %writer.path().display(), "audit writer fell behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
        writer.flush().await?;
        Ok(written)
    })
}

/// Read an audit file back into events, in write order.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<ForgeEvent>, AuditError> {
    let contents = std::fs::read_to_string(path)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(AuditError::from))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
