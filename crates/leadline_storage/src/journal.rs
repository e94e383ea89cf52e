#![forbid(unsafe_code)]

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use leadline_contracts::lead::{LeadId, LeadRecord};
use leadline_contracts::MonotonicTimeNs;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::lead_store::StorageError;

pub const JOURNAL_SCHEMA_VERSION: u32 = 1;

/// A committed mutation of the lead tables. Dispatch claims are in-memory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LeadStoreEvent {
    LeadInserted {
        record: LeadRecord,
        dispatch_due_at: Option<MonotonicTimeNs>,
    },
    DispatchConsumed {
        lead_id: LeadId,
    },
    CallScheduled {
        lead_id: LeadId,
        call_sid: Option<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JournalEntry {
    schema_version: u32,
    #[serde(flatten)]
    event: LeadStoreEvent,
}

#[derive(Debug, Clone)]
pub struct LeadJournal {
    path: PathBuf,
}

impl LeadJournal {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let journal = Self { path: path.into() };
        journal.ensure_ready()?;
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_ready(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| {
                    StorageError::Journal(format!(
                        "failed to create lead journal directory '{}': {}",
                        parent.display(),
                        err
                    ))
                })?;
            }
        }
        if !self.path.exists() {
            File::create(&self.path).map_err(|err| {
                StorageError::Journal(format!(
                    "failed to create lead journal '{}': {}",
                    self.path.display(),
                    err
                ))
            })?;
        }
        Ok(())
    }

    /// Reads every committed event. A torn final line left by a crash mid-append is
    /// truncated away; an unparsable line with entries after it is an error.
    pub fn read_events(&self) -> Result<Vec<LeadStoreEvent>, StorageError> {
        let raw = fs::read(&self.path).map_err(|err| {
            StorageError::Journal(format!(
                "failed to open lead journal '{}': {}",
                self.path.display(),
                err
            ))
        })?;
        let mut events = Vec::new();
        let mut offset = 0usize;
        let mut line_no = 0usize;
        while offset < raw.len() {
            line_no += 1;
            let newline = raw[offset..].iter().position(|b| *b == b'\n');
            let line_end = newline.map_or(raw.len(), |i| offset + i);
            let next = newline.map_or(raw.len(), |i| offset + i + 1);
            let line = &raw[offset..line_end];
            if line.iter().all(u8::is_ascii_whitespace) {
                offset = next;
                continue;
            }
            match serde_json::from_slice::<JournalEntry>(line) {
                Ok(entry) => {
                    if entry.schema_version != JOURNAL_SCHEMA_VERSION {
                        return Err(StorageError::Journal(format!(
                            "unsupported lead journal schema_version={} at line {}",
                            entry.schema_version, line_no
                        )));
                    }
                    events.push(entry.event);
                }
                Err(err) if raw[next..].iter().all(u8::is_ascii_whitespace) => {
                    warn!(
                        journal = %self.path.display(),
                        line = line_no,
                        bytes = raw.len() - offset,
                        error = %err,
                        "dropping torn lead journal tail"
                    );
                    self.truncate_to(offset)?;
                    return Ok(events);
                }
                Err(err) => {
                    return Err(StorageError::Journal(format!(
                        "failed parsing lead journal '{}' at line {}: {}",
                        self.path.display(),
                        line_no,
                        err
                    )));
                }
            }
            offset = next;
        }
        if raw.last().is_some_and(|b| *b != b'\n') {
            // Complete entry without its newline: terminate it so the next append starts clean.
            self.write_synced(b"\n")?;
        }
        Ok(events)
    }

    fn truncate_to(&self, len: usize) -> Result<(), StorageError> {
        OpenOptions::new()
            .write(true)
            .open(&self.path)
            .and_then(|file| {
                file.set_len(len as u64)?;
                file.sync_data()
            })
            .map_err(|err| {
                StorageError::Journal(format!(
                    "failed truncating lead journal '{}': {}",
                    self.path.display(),
                    err
                ))
            })
    }

    pub fn append(&self, event: &LeadStoreEvent) -> Result<(), StorageError> {
        let entry = JournalEntry {
            schema_version: JOURNAL_SCHEMA_VERSION,
            event: event.clone(),
        };
        let json = serde_json::to_string(&entry).map_err(|err| {
            StorageError::Journal(format!("failed to encode lead journal entry: {err}"))
        })?;
        let mut line = json.into_bytes();
        line.push(b'\n');
        self.write_synced(&line)
    }

    fn write_synced(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|err| {
                StorageError::Journal(format!(
                    "failed opening lead journal '{}' for append: {}",
                    self.path.display(),
                    err
                ))
            })?;
        file.write_all(bytes)
            .and_then(|_| file.sync_data())
            .map_err(|err| {
                StorageError::Journal(format!(
                    "failed writing lead journal '{}': {}",
                    self.path.display(),
                    err
                ))
            })
    }
}
