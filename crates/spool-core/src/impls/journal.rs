//! Append-only journal of store mutations.
//!
//! Frame layout: `[u32 LE payload length][u32 LE crc32 of payload][JSON payload]`.
//!
//! On open the journal is scanned from the start. A frame that is cut short or
//! fails its checksum marks a torn tail (the process died mid-write): the file is
//! truncated there and every frame before it is kept. A frame whose checksum
//! passes but whose JSON does not decode is real corruption and is reported.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::{LifecycleState, QueuedRecord, Sequence, StoreError};

const FRAME_HEADER_LEN: u64 = 8;

/// One store mutation. Applying the same op twice is not allowed; the
/// generation check in `FilePacketStore` keeps stale ops out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum JournalOp {
    Insert { records: Vec<QueuedRecord> },
    Mark {
        sequences: Vec<Sequence>,
        state: LifecycleState,
    },
    Remove { sequences: Vec<Sequence> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Snapshot generation this op applies on top of.
    pub generation: u64,
    pub op: JournalOp,
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: File,
    len: u64,
    entries: usize,
}

impl Journal {
    /// Open (or create) the journal and return the entries it holds.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, Vec<JournalEntry>), StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;

        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;

        let (entries, valid_len) = decode_frames(&bytes)?;
        let file_len = bytes.len() as u64;
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                valid_len,
                file_len,
                "truncating torn journal tail"
            );
            file.set_len(valid_len)?;
            file.sync_data()?;
        }

        let journal = Self {
            path,
            file,
            len: valid_len,
            entries: entries.len(),
        };
        Ok((journal, entries))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries currently in the file.
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Append one entry and sync it to disk.
    ///
    /// On failure the file is cut back to its previous length so a partial
    /// frame never sits in front of later entries.
    pub fn append(&mut self, entry: &JournalEntry) -> Result<(), StoreError> {
        let frame = encode_frame(entry)?;
        let result = self
            .file
            .write_all(&frame)
            .and_then(|_| self.file.sync_data());
        if let Err(err) = result {
            if let Err(rollback) = self.file.set_len(self.len) {
                warn!(path = %self.path.display(), error = %rollback, "journal rollback failed");
            }
            return Err(err.into());
        }
        self.len += frame.len() as u64;
        self.entries += 1;
        Ok(())
    }

    /// Drop every entry (after they were folded into a snapshot).
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.file.set_len(0)?;
        self.file.sync_data()?;
        self.len = 0;
        self.entries = 0;
        Ok(())
    }
}

pub fn checksum(payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    hasher.finalize()
}

fn encode_frame(entry: &JournalEntry) -> Result<Vec<u8>, StoreError> {
    let payload = serde_json::to_vec(entry)?;
    let len = u32::try_from(payload.len()).map_err(|_| StoreError::Corrupt {
        offset: 0,
        reason: format!("journal entry too large: {} bytes", payload.len()),
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN as usize + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&checksum(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Decode the valid prefix of `bytes`; returns the entries and the prefix length.
fn decode_frames(bytes: &[u8]) -> Result<(Vec<JournalEntry>, u64), StoreError> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    while offset + FRAME_HEADER_LEN as usize <= bytes.len() {
        let header = &bytes[offset..offset + FRAME_HEADER_LEN as usize];
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let start = offset + FRAME_HEADER_LEN as usize;
        let Some(end) = start.checked_add(len).filter(|end| *end <= bytes.len()) else {
            break;
        };
        let payload = &bytes[start..end];
        if checksum(payload) != crc {
            break;
        }

        let entry = serde_json::from_slice::<JournalEntry>(payload).map_err(|err| {
            StoreError::Corrupt {
                offset: offset as u64,
                reason: format!("undecodable journal entry: {err}"),
            }
        })?;
        entries.push(entry);
        offset = end;
    }

    Ok((entries, offset as u64))
}
