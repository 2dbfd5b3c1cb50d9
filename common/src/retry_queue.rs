use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::db::Database;
use crate::schema::{NewTransaction, TransactionStatus};

/// A database write owed after a transfer was already confirmed on chain.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum PendingOp {
    SaveTransaction(NewTransaction),
    CompleteRefund {
        transaction_id: i64,
        refund_tx_hash: String,
    },
    ReleaseRefund {
        transaction_id: i64,
    },
}

/// A persistent queue of operations to retry on DB failure
pub struct RetryQueue {
    path: PathBuf,
    ops: Mutex<Vec<PendingOp>>,
}

impl RetryQueue {
    /// Load the retry queue from disk, creating the file if it doesn't exist.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path_buf)
            .await
            .context(format!(
                "Failed to open `{}` for reading",
                path_buf.display()
            ))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await.context(format!(
            "Failed to read contents of `{}`",
            path_buf.display()
        ))?;

        let ops: Vec<PendingOp> = if contents.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&contents)
                .context(format!("Invalid JSON in `{}`", path_buf.display()))?
        };
        if !ops.is_empty() {
            log::warn!(
                "Loaded {} pending database operations from {}",
                ops.len(),
                path_buf.display()
            );
        }

        Ok(RetryQueue {
            path: path_buf,
            ops: Mutex::new(ops),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn len(&self) -> usize {
        self.ops.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ops.lock().await.is_empty()
    }

    pub async fn snapshot(&self) -> Vec<PendingOp> {
        self.ops.lock().await.clone()
    }

    async fn write_to_disk(&self, ops: &[PendingOp]) -> Result<()> {
        let data = serde_json::to_vec_pretty(ops).context("Failed to serialize retry queue")?;

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await
            .context(format!("Could not open file `{}`", self.path.display()))?;

        file.write_all(&data)
            .await
            .context("Failed to write retry queue")?;
        file.flush().await.context("Failed to flush retry queue")?;

        Ok(())
    }

    /// Append a new operation and persist immediately.
    pub async fn push_and_persist(&self, op: PendingOp) -> Result<()> {
        let mut guard = self.ops.lock().await;
        log::warn!("Queueing database operation for retry: {:?}", op);
        guard.push(op);
        self.write_to_disk(&guard)
            .await
            .context("Failed to save retry queue")
    }

    /// Attempt all pending operations, keeping only those that still fail.
    ///
    /// Returns how many operations were applied.
    pub async fn flush(&self, db: &Database) -> Result<usize> {
        let mut guard = self.ops.lock().await;
        if guard.is_empty() {
            return Ok(0);
        }

        let pending_ops = std::mem::take(&mut *guard);
        let total = pending_ops.len();
        let mut remaining = Vec::new();
        for op in pending_ops {
            let outcome = match &op {
                PendingOp::SaveTransaction(tx) => db.save_transaction(tx).await.map(|saved| {
                    log::info!("Recorded queued transaction id={}", saved.id);
                }),
                PendingOp::CompleteRefund {
                    transaction_id,
                    refund_tx_hash,
                } => db
                    .complete_refund(*transaction_id, refund_tx_hash)
                    .await
                    .map(|applied| {
                        if !applied {
                            log::warn!(
                                "Transaction {} was no longer refunding when refund {} was replayed",
                                transaction_id,
                                refund_tx_hash
                            );
                        }
                    }),
                PendingOp::ReleaseRefund { transaction_id } => db
                    .transition_status(
                        *transaction_id,
                        TransactionStatus::Refunding,
                        TransactionStatus::Completed,
                    )
                    .await
                    .map(|_| ()),
            };

            if let Err(e) = outcome {
                log::error!("Operation failed, will retry later: {:#}", e);
                remaining.push(op);
            }
        }

        let applied = total - remaining.len();
        *guard = remaining;
        self.write_to_disk(&guard)
            .await
            .context("Failed to save updated retry queue")?;
        Ok(applied)
    }
}
