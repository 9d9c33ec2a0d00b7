//! File-backed batch storage.
//!
//! Records are appended as JSON lines to batch files named by their creation
//! time in milliseconds. The writer keeps appending to the newest file while it
//! is younger than `max_file_age_for_write`; the reader only hands out files
//! older than `min_file_age_for_read`. Keeping the read age above the write age
//! guarantees a batch is never read while it can still grow.

use crate::batch::{Batch, BatchId};
use crate::config::StorageConfig;
use crate::context::{Clock, SystemClock};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Error raised by batch storage.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A filesystem operation failed.
    #[error("storage I/O failed for {}", path.display())]
    Io {
        /// Path the operation was performed on.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A record does not fit in a batch file.
    #[error("record of {size} bytes exceeds the {limit} byte batch file limit")]
    RecordTooLarge {
        /// Encoded record size including the line terminator.
        size: u64,
        /// Configured maximum file size.
        limit: u64,
    },

    /// The configured file ages would let a batch be read while it can still grow.
    #[error(
        "min_file_age_for_read ({min_for_read:?}) must be greater than max_file_age_for_write ({max_for_write:?})"
    )]
    InvalidFileAges {
        /// Configured `max_file_age_for_write`.
        max_for_write: Duration,
        /// Configured `min_file_age_for_read`.
        min_for_read: Duration,
    },

    /// A record could not be encoded.
    #[error("failed to encode record")]
    Encode(#[source] serde_json::Error),
}

impl StorageError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Append side of the store, used by the scope tree.
pub trait RecordWriter: Send + Sync {
    /// Appends one serialized record.
    ///
    /// Implementations may block on file I/O; call it from a blocking context.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be persisted.
    fn write(&self, record: &[u8]) -> Result<(), StorageError>;
}

/// Read side of the store, used by the upload worker.
#[async_trait]
pub trait BatchReader: Send + Sync {
    /// Returns the oldest eligible batch, or `None` when there is nothing to read.
    async fn read_next_batch(&self) -> Option<Batch>;

    /// Permanently removes `batch` from future reads.
    async fn mark_batch_as_read(&self, batch: &Batch);
}

struct BatchDirectory {
    path: PathBuf,
    config: StorageConfig,
    clock: Arc<dyn Clock>,
}

impl BatchDirectory {
    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn file_path(&self, created_at_ms: i64) -> PathBuf {
        self.path.join(created_at_ms.to_string())
    }
}

fn parse_batch_name(name: &str) -> Option<i64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

fn duration_ms(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}

/// Opens a batch directory and hands out its writer and reader.
pub struct FileStorage {
    directory: Arc<BatchDirectory>,
    writer: FileWriter,
}

impl FileStorage {
    /// Opens (creating if needed) the configured batch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file ages
    /// are inverted.
    pub fn open(config: StorageConfig) -> Result<Self, StorageError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    /// Opens the batch directory using a custom clock for file ages.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the file ages
    /// are inverted.
    pub fn open_with_clock(
        config: StorageConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        if config.min_file_age_for_read <= config.max_file_age_for_write {
            return Err(StorageError::InvalidFileAges {
                max_for_write: config.max_file_age_for_write,
                min_for_read: config.min_file_age_for_read,
            });
        }

        let path = config.directory.clone();
        std::fs::create_dir_all(&path).map_err(StorageError::io(&path))?;

        let directory = Arc::new(BatchDirectory {
            path,
            config,
            clock,
        });
        let writer = FileWriter {
            directory: Arc::clone(&directory),
            state: Arc::new(Mutex::new(WriterState::default())),
        };

        Ok(Self { directory, writer })
    }

    /// Returns the writer. All clones share the same current batch file.
    pub fn writer(&self) -> FileWriter {
        self.writer.clone()
    }

    /// Returns a reader over the same directory.
    pub fn reader(&self) -> FileReader {
        FileReader {
            directory: Arc::clone(&self.directory),
        }
    }

    /// Returns the batch directory path.
    pub fn path(&self) -> &Path {
        &self.directory.path
    }
}

#[derive(Debug)]
struct WritableFile {
    path: PathBuf,
    created_at_ms: i64,
    size: u64,
    records: usize,
}

#[derive(Debug, Default)]
struct WriterState {
    current: Option<WritableFile>,
    last_created_ms: Option<i64>,
    purged_count: u64,
}

/// Appends records to batch files.
///
/// Writes use blocking `std::fs` calls while holding the shared state lock.
#[derive(Clone)]
pub struct FileWriter {
    directory: Arc<BatchDirectory>,
    state: Arc<Mutex<WriterState>>,
}

impl FileWriter {
    /// Returns how many batch files were purged to respect the directory size limit.
    pub fn purged_count(&self) -> u64 {
        self.state.lock().purged_count
    }

    fn is_reusable(&self, file: &WritableFile, now_ms: i64, needed: u64) -> bool {
        let config = &self.directory.config;
        now_ms - file.created_at_ms < duration_ms(config.max_file_age_for_write)
            && file.size + needed <= config.max_file_size
            && file.records < config.max_items_per_batch
            && file.path.exists()
    }

    fn create_file(&self, state: &mut WriterState, now_ms: i64) -> WritableFile {
        let mut created_at_ms = match state.last_created_ms {
            Some(last) if last >= now_ms => last + 1,
            _ => now_ms,
        };
        while self.directory.file_path(created_at_ms).exists() {
            created_at_ms += 1;
        }
        state.last_created_ms = Some(created_at_ms);

        WritableFile {
            path: self.directory.file_path(created_at_ms),
            created_at_ms,
            size: 0,
            records: 0,
        }
    }

    fn purge_if_needed(&self, state: &mut WriterState) -> Result<(), StorageError> {
        let directory = &self.directory.path;
        let entries = std::fs::read_dir(directory).map_err(StorageError::io(directory))?;

        let mut files = Vec::new();
        let mut total_size = 0u64;
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(created_at_ms) = name.to_str().and_then(parse_batch_name) else {
                continue;
            };
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            total_size += size;
            files.push((created_at_ms, entry.path(), size));
        }
        files.sort_by_key(|(created_at_ms, _, _)| *created_at_ms);

        let limit = self.directory.config.max_directory_size;
        for (_, path, size) in files {
            if total_size <= limit {
                break;
            }
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    total_size = total_size.saturating_sub(size);
                    state.purged_count += 1;
                    tracing::warn!(path = %path.display(), "Batch directory full, purged oldest batch");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to purge batch file");
                }
            }
        }

        Ok(())
    }
}

impl RecordWriter for FileWriter {
    fn write(&self, record: &[u8]) -> Result<(), StorageError> {
        let needed = record.len() as u64 + 1;
        let limit = self.directory.config.max_file_size;
        if needed > limit {
            return Err(StorageError::RecordTooLarge {
                size: needed,
                limit,
            });
        }

        let now_ms = self.directory.now_ms();
        let mut state = self.state.lock();

        let reuse = state
            .current
            .as_ref()
            .is_some_and(|file| self.is_reusable(file, now_ms, needed));
        if !reuse {
            self.purge_if_needed(&mut state)?;
            let file = self.create_file(&mut state, now_ms);
            state.current = Some(file);
        }

        let Some(file) = state.current.as_mut() else {
            return Ok(());
        };

        let mut line = Vec::with_capacity(record.len() + 1);
        line.extend_from_slice(record);
        line.push(b'\n');

        if let Err(e) = append_line(&file.path, &line) {
            tracing::warn!(path = %file.path.display(), "Write failed, abandoning current batch file");
            state.current = None;
            return Err(e);
        }

        file.size += needed;
        file.records += 1;
        Ok(())
    }
}

fn append_line(path: &Path, line: &[u8]) -> Result<(), StorageError> {
    let mut handle = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(StorageError::io(path))?;
    handle.write_all(line).map_err(StorageError::io(path))
}

/// Reads batch files oldest first.
#[derive(Clone)]
pub struct FileReader {
    directory: Arc<BatchDirectory>,
}

impl FileReader {
    async fn list_batch_files(&self) -> io::Result<Vec<(i64, PathBuf)>> {
        let mut entries = match tokio::fs::read_dir(&self.directory.path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            if let Some(created_at_ms) = name.to_str().and_then(parse_batch_name) {
                files.push((created_at_ms, entry.path()));
            }
        }
        files.sort_by_key(|(created_at_ms, _)| *created_at_ms);
        Ok(files)
    }

    async fn delete(&self, path: &Path, reason: &'static str) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), reason, "Deleted batch file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), reason, error = %e, "Failed to delete batch file")
            }
        }
    }
}

#[async_trait]
impl BatchReader for FileReader {
    async fn read_next_batch(&self) -> Option<Batch> {
        let files = match self.list_batch_files().await {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list batch directory");
                return None;
            }
        };

        let config = &self.directory.config;
        let now_ms = self.directory.now_ms();
        let min_age = duration_ms(config.min_file_age_for_read);
        let max_age = duration_ms(config.max_file_age_for_read);

        for (created_at_ms, path) in files {
            let age = now_ms - created_at_ms;
            if age >= max_age {
                self.delete(&path, "obsolete").await;
                continue;
            }
            if age < min_age {
                break;
            }

            match tokio::fs::read(&path).await {
                Ok(data) if data.is_empty() => self.delete(&path, "empty").await,
                Ok(data) => {
                    let id = BatchId::new(created_at_ms.to_string());
                    return Some(Batch::new(id, data));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read batch file");
                    return None;
                }
            }
        }

        None
    }

    async fn mark_batch_as_read(&self, batch: &Batch) {
        let path = self.directory.path.join(batch.id().as_str());
        self.delete(&path, "read").await;
    }
}
