//! Directory-backed interruption queue
//!
//! The queue transport drops one `*.json` file per message into the spool
//! directory. A file is redelivered on every receive until it is deleted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use interruptd_core::queue::{QueueError, QueueProvider, RawQueueMessage};

const MESSAGE_EXTENSION: &str = "json";

pub struct SpoolQueue {
    name: String,
    dir: PathBuf,
    batch_size: usize,
}

impl SpoolQueue {
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn receive_error(&self, reason: impl ToString) -> QueueError {
        QueueError::Receive {
            queue: self.name.clone(),
            reason: reason.to_string(),
        }
    }

    /// Message file names in delivery order
    async fn pending_files(&self) -> Result<Vec<String>, QueueError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.receive_error(format!("reading {:?}: {}", self.dir, e)))?;

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| self.receive_error(e))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(MESSAGE_EXTENSION) {
                continue;
            }
            if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
                files.push(file_name.to_string());
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl QueueProvider for SpoolQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self) -> Result<Vec<RawQueueMessage>, QueueError> {
        let mut messages = Vec::new();

        for file_name in self.pending_files().await? {
            if messages.len() >= self.batch_size {
                break;
            }

            let body = match tokio::fs::read_to_string(self.dir.join(&file_name)).await {
                Ok(body) => body,
                // Deleted between listing and reading
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    warn!(file = %file_name, "Message file is not valid UTF-8");
                    String::new()
                }
                Err(e) => return Err(self.receive_error(format!("reading {}: {}", file_name, e))),
            };

            let id = file_name
                .strip_suffix(&format!(".{}", MESSAGE_EXTENSION))
                .unwrap_or(&file_name)
                .to_string();
            messages.push(RawQueueMessage {
                id,
                receipt_handle: file_name,
                body: Some(body).filter(|body| !body.is_empty()),
                received_at: chrono::Utc::now(),
            });
        }

        debug!(queue = %self.name, count = messages.len(), "Received messages");
        Ok(messages)
    }

    async fn delete(&self, message: &RawQueueMessage) -> Result<(), QueueError> {
        match tokio::fs::remove_file(self.dir.join(&message.receipt_handle)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(QueueError::Delete {
                queue: self.name.clone(),
                id: message.id.clone(),
                reason: e.to_string(),
            }),
        }
    }
}
