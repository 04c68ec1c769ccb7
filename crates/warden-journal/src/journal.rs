//! The journal: single appender, many readers, per-day NDJSON files.

use chrono::{NaiveDate, Utc};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::{JournalError, JournalResult};
use crate::record::{JournalRecord, SequencedRecord};
use warden_core::Timestamp;

/// Disk writer state: the open day file and its date.
struct DayFile {
    date: NaiveDate,
    file: File,
}

/// The append-only journal.
///
/// Appends go through one mutex (the single-appender discipline); reads
/// take a shared lock over the in-memory mirror. In disk mode every append
/// is flushed and synced before it becomes visible to readers, so an
/// acknowledged record survives a crash.
pub struct Journal {
    records: RwLock<Vec<SequencedRecord>>,
    appender: Mutex<Option<DayFile>>,
    dir: Option<PathBuf>,
}

impl Journal {
    /// An in-memory journal. Nothing survives a restart; tests and
    /// explicitly ephemeral runs only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            appender: Mutex::new(None),
            dir: None,
        }
    }

    /// Open a disk-backed journal, replaying any existing day files.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or an existing
    /// day file cannot be read.
    pub fn open(dir: impl Into<PathBuf>) -> JournalResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| JournalError::Io {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut records = Vec::new();
        let mut day_files: Vec<PathBuf> = std::fs::read_dir(&dir)
            .map_err(|e| JournalError::Io {
                path: dir.display().to_string(),
                source: e,
            })?
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| ext == "ndjson")
            })
            .collect();
        day_files.sort();

        for path in &day_files {
            let file = File::open(path).map_err(|e| JournalError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            for (line_no, line) in BufReader::new(file).lines().enumerate() {
                let line = line.map_err(|e| JournalError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<SequencedRecord>(&line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        // A torn trailing line after a crash is survivable;
                        // skip it rather than refusing to start.
                        warn!(
                            file = %path.display(),
                            line = line_no.saturating_add(1),
                            error = %e,
                            "skipping unreadable journal line"
                        );
                    },
                }
            }
        }

        records.sort_by_key(|r| r.cursor);
        if !records.is_empty() {
            info!(count = records.len(), "journal replayed");
        }

        Ok(Self {
            records: RwLock::new(records),
            appender: Mutex::new(None),
            dir: Some(dir),
        })
    }

    /// Append a record, returning its cursor.
    ///
    /// # Errors
    ///
    /// Returns an error when the disk write fails; the record is then not
    /// appended to the readable mirror either.
    pub fn append(&self, record: JournalRecord) -> JournalResult<u64> {
        // The appender mutex covers cursor assignment, the disk write, and
        // the mirror push, so cursors are gapless and in order.
        let mut appender = self.appender.lock().unwrap_or_else(|e| e.into_inner());

        let cursor = {
            let records = self.records.read().unwrap_or_else(|e| e.into_inner());
            records.last().map_or(0, |r| r.cursor).saturating_add(1)
        };
        let sequenced = SequencedRecord { cursor, record };

        if let Some(dir) = &self.dir {
            let line = serde_json::to_string(&sequenced)
                .map_err(|e| JournalError::Serialization(e.to_string()))?;
            let file = self.day_file(&mut appender, dir)?;
            writeln!(file, "{line}").map_err(|e| JournalError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
            file.sync_data().map_err(|e| JournalError::Io {
                path: dir.display().to_string(),
                source: e,
            })?;
        }

        self.records
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(sequenced);
        Ok(cursor)
    }

    /// Get or roll the current day's file.
    fn day_file<'a>(
        &self,
        appender: &'a mut Option<DayFile>,
        dir: &Path,
    ) -> JournalResult<&'a mut File> {
        let today = Utc::now().date_naive();
        let needs_roll = appender.as_ref().is_none_or(|day| day.date != today);
        if needs_roll {
            let path = dir.join(format!("{today}.ndjson"));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| JournalError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
            *appender = Some(DayFile { date: today, file });
        }
        // The option was just filled (or already valid).
        appender
            .as_mut()
            .map(|day| &mut day.file)
            .ok_or_else(|| JournalError::Serialization("day file unavailable".to_string()))
    }

    /// The most recent records, newest first, bounded.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<SequencedRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records.iter().rev().take(limit).cloned().collect()
    }

    /// Records with timestamps in `[from, to]`, in append order, bounded.
    #[must_use]
    pub fn range(
        &self,
        from: Timestamp,
        to: Timestamp,
        limit: Option<usize>,
    ) -> Vec<SequencedRecord> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .iter()
            .filter(|r| {
                let ts = r.record.ts();
                ts >= from && ts <= to
            })
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// Records strictly after `cursor`, plus the new cursor to resume from.
    #[must_use]
    pub fn tail(&self, cursor: u64) -> (Vec<SequencedRecord>, u64) {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let newer: Vec<SequencedRecord> = records
            .iter()
            .filter(|r| r.cursor > cursor)
            .cloned()
            .collect();
        let new_cursor = newer.last().map_or(cursor, |r| r.cursor);
        (newer, new_cursor)
    }

    /// Every record, in append order.
    #[must_use]
    pub fn all(&self) -> Vec<SequencedRecord> {
        self.records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the journal holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal")
            .field("records", &self.len())
            .field("disk", &self.dir.is_some())
            .finish()
    }
}
