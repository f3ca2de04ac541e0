use std::path::{Path, PathBuf};
use std::sync::Arc;

use alloy::primitives::Address;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append-only failure log shared by every wallet task.
///
/// Each record is the failure text followed by the wallet address on its own
/// line. The file is never truncated or rotated.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl ErrorLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Arc::new(path.as_ref().to_path_buf()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Appends one record. Write failures are logged and dropped; the log
    /// must never turn a recorded failure into a second one.
    pub async fn record(
        &self,
        wallet: Address,
        label: &str,
        error: &(dyn std::fmt::Display + Sync),
    ) {
        let entry = format!(
            "\n[{}] {}: {}\n{}\n",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S"),
            label,
            error,
            wallet
        );

        let _guard = self.lock.lock().await;
        let result = async {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path.as_path())
                .await?;
            file.write_all(entry.as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::error!("Failed to append to {}: {e}", self.path.display());
        }
    }
}
