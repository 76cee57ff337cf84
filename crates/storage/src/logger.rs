//! Store-embedded logging.
//!
//! Each node of a dataset tree gets a [`StoreLogger`] that appends formatted
//! records to a dated object `logs/YYYYMMDD.log` inside the same store the
//! datasets live in. Records are produced by a bounded queue feeding one
//! dedicated writer thread, which gives strict single-flight ordering: no
//! record is written before the previous one's write completed.
//!
//! Two append strategies exist. Backends that support partial-value writes
//! start on an optimistic byte-append; the first failure demotes the handler
//! permanently to a full read-concatenate-rewrite. Debug and Error records
//! block the caller until flushed; Info and Warning are fire-and-forget.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;
use std::thread::JoinHandle;

use bytes::Bytes;
use chrono::Utc;
use zarrs_storage::{ReadableStorageTraits, StoreKey, StoreKeyOffsetValue, WritableStorageTraits};

use crate::backend::{DynStore, StoreHandle};
use crate::error::{Result, StorageError};

/// Prefix of the log objects inside the store.
const LOG_PREFIX: &str = "logs";

/// Queue depth before producers block.
const QUEUE_DEPTH: usize = 256;

/// Severity of a store log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Diagnostic detail; blocks until written.
    Debug,
    /// Routine progress; fire-and-forget.
    Info,
    /// Advisory problem; fire-and-forget.
    Warning,
    /// Failure; blocks until written.
    Error,
}

impl LogLevel {
    fn label(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Whether a record at this level blocks the caller until it is durable.
    fn blocking(self) -> bool {
        matches!(self, Self::Debug | Self::Error)
    }
}

enum Message {
    Record {
        key: String,
        line: Vec<u8>,
        ack: Option<SyncSender<()>>,
    },
    Flush(SyncSender<()>),
    Shutdown,
}

/// Handler appending records of one node path into its store.
pub struct StoreLogger {
    group_path: String,
    tx: SyncSender<Message>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl StoreLogger {
    /// Create a logger for `group_path` writing into `handle`'s store.
    pub fn new(handle: &StoreHandle, group_path: impl Into<String>) -> Self {
        let group_path = group_path.into();
        let (tx, rx) = sync_channel(QUEUE_DEPTH);
        let mut writer = LogWriter {
            store: handle.store.clone(),
            partial_writes: handle.supports_partial_writes,
            sizes: HashMap::new(),
        };
        let thread = std::thread::Builder::new()
            .name(format!("store-log:{group_path}"))
            .spawn(move || writer.run(rx))
            .expect("spawn store log writer");
        Self {
            group_path,
            tx,
            writer: Mutex::new(Some(thread)),
        }
    }

    /// Append a record; Debug/Error block until the write completed.
    pub fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            LogLevel::Debug => tracing::debug!(node = %self.group_path, "{message}"),
            LogLevel::Info => tracing::info!(node = %self.group_path, "{message}"),
            LogLevel::Warning => tracing::warn!(node = %self.group_path, "{message}"),
            LogLevel::Error => tracing::error!(node = %self.group_path, "{message}"),
        }

        let now = Utc::now();
        let line = format!(
            "{} {:5} [{}] {}\n",
            now.format("%Y-%m-%d %H:%M:%S"),
            level.label(),
            self.group_path,
            message
        )
        .into_bytes();
        let key = format!("{LOG_PREFIX}/{}.log", now.format("%Y%m%d"));

        let (ack_tx, ack_rx) = if level.blocking() {
            let (tx, rx) = sync_channel(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        if self
            .tx
            .send(Message::Record {
                key,
                line,
                ack: ack_tx,
            })
            .is_err()
        {
            tracing::warn!(node = %self.group_path, "store log writer gone, record dropped");
            return;
        }
        if let Some(rx) = ack_rx {
            let _ = rx.recv();
        }
    }

    /// Convenience for [`LogLevel::Debug`].
    pub fn debug(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Debug, message);
    }

    /// Convenience for [`LogLevel::Info`].
    pub fn info(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Info, message);
    }

    /// Convenience for [`LogLevel::Warning`].
    pub fn warning(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Warning, message);
    }

    /// Convenience for [`LogLevel::Error`].
    pub fn error(&self, message: impl AsRef<str>) {
        self.log(LogLevel::Error, message);
    }

    /// Block until every previously queued record has been written.
    pub fn flush(&self) -> Result<()> {
        let (tx, rx) = sync_channel(1);
        self.tx
            .send(Message::Flush(tx))
            .map_err(|_| StorageError::LogWriter("writer thread terminated".to_string()))?;
        rx.recv()
            .map_err(|_| StorageError::LogWriter("writer thread terminated".to_string()))
    }

    /// Flush and stop the writer thread.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Some(thread) = self.writer.lock().expect("logger poisoned").take() {
            let _ = thread.join();
        }
    }
}

impl Drop for StoreLogger {
    fn drop(&mut self) {
        self.close();
    }
}

struct LogWriter {
    store: DynStore,
    /// Optimistic append mode; permanently cleared on the first failure.
    partial_writes: bool,
    /// Bytes known to be stored per log key, to compute append offsets.
    sizes: HashMap<String, u64>,
}

impl LogWriter {
    fn run(&mut self, rx: Receiver<Message>) {
        while let Ok(message) = rx.recv() {
            match message {
                Message::Record { key, line, ack } => {
                    self.append(&key, &line);
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                Message::Flush(ack) => {
                    let _ = ack.send(());
                }
                Message::Shutdown => break,
            }
        }
    }

    fn append(&mut self, key_str: &str, line: &[u8]) {
        let key = match StoreKey::new(key_str) {
            Ok(key) => key,
            Err(e) => {
                tracing::error!(key = key_str, error = %e, "invalid log key");
                return;
            }
        };

        if self.partial_writes {
            match self.append_unsafe(&key, key_str, line) {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(
                        key = key_str,
                        error = %e,
                        "partial log write failed, demoting to rewrite strategy"
                    );
                    self.partial_writes = false;
                }
            }
        }
        if let Err(e) = self.append_safe(&key, key_str, line) {
            tracing::error!(key = key_str, error = %e, "log record lost");
        }
    }

    /// Optimistic partial-value append at the tracked offset.
    fn append_unsafe(&mut self, key: &StoreKey, key_str: &str, line: &[u8]) -> Result<()> {
        let offset = match self.sizes.get(key_str) {
            Some(size) => *size,
            None => {
                // First append this run; an existing object must be re-measured.
                let existing = self.store.get(key)?.map(|b| b.len() as u64).unwrap_or(0);
                if existing == 0 {
                    // First write of the object must be a full set.
                    return self.append_safe(key, key_str, line);
                }
                existing
            }
        };
        self.store
            .set_partial_values(&[StoreKeyOffsetValue::new(key.clone(), offset, line)])?;
        self.sizes.insert(key_str.to_string(), offset + line.len() as u64);
        Ok(())
    }

    /// Full read-concatenate-rewrite fallback.
    fn append_safe(&mut self, key: &StoreKey, key_str: &str, line: &[u8]) -> Result<()> {
        let mut content = match self.store.get(key)? {
            Some(existing) => existing.to_vec(),
            None => Vec::new(),
        };
        content.extend_from_slice(line);
        let size = content.len() as u64;
        self.store.set(key, Bytes::from(content))?;
        self.sizes.insert(key_str.to_string(), size);
        Ok(())
    }
}
