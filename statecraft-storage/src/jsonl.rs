//! Append-only JSON-lines history store.
//!
//! Each record is serialized as one line of JSON. On open, the file is
//! scanned: a torn final line (left by a crash mid-write) is truncated,
//! while an unparseable complete line is reported as corruption.

use crate::error::StorageError;
use parking_lot::Mutex;
use statecraft_core::{CoreError, HistoryRecord, HistoryStore};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// When appended records are fsynced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Fsync after every append (safest, slowest).
    #[default]
    EveryWrite,
    /// Fsync after N appends.
    EveryN(u32),
    /// Flush to the OS only; never fsync automatically.
    Never,
}

/// Result of scanning an existing history file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Complete records found.
    pub records: u64,
    /// Bytes truncated due to a partial final line.
    pub bytes_truncated: u64,
}

struct Writer {
    file: BufWriter<File>,
    records: u64,
    writes_since_sync: u32,
}

/// History store backed by a JSON-lines file.
pub struct JsonlHistoryStore {
    path: PathBuf,
    policy: SyncPolicy,
    writer: Mutex<Writer>,
    recovery: RecoveryResult,
}

impl JsonlHistoryStore {
    /// Opens or creates the history file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_policy(path, SyncPolicy::default())
    }

    pub fn open_with_policy(
        path: impl AsRef<Path>,
        policy: SyncPolicy,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let recovery = recover(&path)?;
        if recovery.bytes_truncated > 0 {
            tracing::warn!(
                path = %path.display(),
                bytes_truncated = recovery.bytes_truncated,
                "truncated partial history record"
            );
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::debug!(path = %path.display(), records = recovery.records, "opened history file");

        Ok(Self {
            writer: Mutex::new(Writer {
                file: BufWriter::new(file),
                records: recovery.records,
                writes_since_sync: 0,
            }),
            path,
            policy,
            recovery,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What the open-time scan found.
    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    /// Number of records in the file.
    pub fn len(&self) -> u64 {
        self.writer.lock().records
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a record, honouring the sync policy.
    pub fn append_record(&self, record: &HistoryRecord) -> Result<(), StorageError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock();
        writer.file.write_all(&line)?;
        writer.file.flush()?;
        writer.records += 1;
        writer.writes_since_sync += 1;

        let sync = match self.policy {
            SyncPolicy::EveryWrite => true,
            SyncPolicy::EveryN(n) => writer.writes_since_sync >= n,
            SyncPolicy::Never => false,
        };
        if sync {
            writer.file.get_ref().sync_data()?;
            writer.writes_since_sync = 0;
        }
        Ok(())
    }

    /// Forces a sync to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        let mut writer = self.writer.lock();
        writer.file.flush()?;
        writer.file.get_ref().sync_data()?;
        writer.writes_since_sync = 0;
        Ok(())
    }

    /// Reads every record, oldest first.
    pub fn read_all(&self) -> Result<Vec<HistoryRecord>, StorageError> {
        self.scan(|_| true)
    }

    fn scan<F>(&self, mut keep: F) -> Result<Vec<HistoryRecord>, StorageError>
    where
        F: FnMut(&HistoryRecord) -> bool,
    {
        // Hold the writer lock so no append interleaves with the read.
        let mut writer = self.writer.lock();
        writer.file.flush()?;

        let reader = BufReader::new(File::open(&self.path)?);
        let mut out = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: HistoryRecord =
                serde_json::from_str(&line).map_err(|e| StorageError::Corruption {
                    path: self.path.clone(),
                    line: index + 1,
                    reason: e.to_string(),
                })?;
            if keep(&record) {
                out.push(record);
            }
        }
        Ok(out)
    }
}

impl HistoryStore for JsonlHistoryStore {
    fn append(&self, record: HistoryRecord) -> Result<(), CoreError> {
        Ok(self.append_record(&record)?)
    }

    fn records_for(
        &self,
        subject_type: &str,
        subject_id: &str,
    ) -> Result<Vec<HistoryRecord>, CoreError> {
        Ok(self.scan(|r| r.is_for(subject_type, subject_id))?)
    }
}

/// Validates an existing file and truncates a torn final line.
fn recover(path: &Path) -> Result<RecoveryResult, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(RecoveryResult::default())
        }
        Err(e) => return Err(e.into()),
    };

    let mut result = RecoveryResult::default();
    let mut offset = 0usize;
    let mut line_no = 0usize;

    while offset < bytes.len() {
        let Some(len) = bytes[offset..].iter().position(|&b| b == b'\n') else {
            // Partial write: no terminating newline
            break;
        };
        line_no += 1;
        let line = &bytes[offset..offset + len];
        if !line.iter().all(u8::is_ascii_whitespace) {
            serde_json::from_slice::<HistoryRecord>(line).map_err(|e| {
                StorageError::Corruption {
                    path: path.to_path_buf(),
                    line: line_no,
                    reason: e.to_string(),
                }
            })?;
            result.records += 1;
        }
        offset += len + 1;
    }

    if offset < bytes.len() {
        result.bytes_truncated = (bytes.len() - offset) as u64;
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(offset as u64)?;
        file.sync_all()?;
    }

    Ok(result)
}
