//! FilePacketStore - ディレクトリに永続化するストア
//!
//! # ファイル構成
//! - `snapshot.json`: store id, generation, next sequence, 全レコード
//!   （一時ファイルに書いて rename するので、常に完全な版が残る）
//! - `journal.log`: snapshot 以降の変更（`Journal` のフレーム形式, 1 変更ごとに fsync）
//! - `LOCK`: 排他ロック（`StoreLock`）。同じディレクトリを開けるのは 1 インスタンスだけ
//!
//! # 再起動時の復元
//! 1. snapshot を読む
//! 2. 同じ generation の journal エントリを順に適用する
//! 3. 古い generation のエントリは snapshot に畳み込み済みなので無視する
//!
//! compaction は「新しい generation の snapshot を書く → journal を空にする」の順。
//! その間でプロセスが落ちても、journal のエントリは古い generation として無視される。
//! rename はディレクトリを fsync してから確定とみなす（journal を空にするのはその後）。

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::store_lock::StoreLock;
use super::RecordTable;
use super::journal::{Journal, JournalEntry, JournalOp};
use crate::domain::{
    LifecycleState, QueuedRecord, Sequence, StoreError, StoreId, StoreTotals,
};
use crate::ports::{IdGenerator, PacketStore, SystemClock, UlidGenerator};

const SNAPSHOT_FILE: &str = "snapshot.json";
const JOURNAL_FILE: &str = "journal.log";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStoreOptions {
    /// Fold the journal into a new snapshot once it holds this many entries.
    pub compact_after_entries: usize,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            compact_after_entries: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    store_id: StoreId,
    generation: u64,
    next_sequence: Sequence,
    records: Vec<QueuedRecord>,
}

#[derive(Debug)]
pub struct FilePacketStore {
    dir: PathBuf,
    store_id: StoreId,
    generation: u64,
    table: RecordTable,
    journal: Journal,
    options: FileStoreOptions,
    _lock: StoreLock,
}

impl FilePacketStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(dir, FileStoreOptions::default())
    }

    /// Open the store in `dir`, creating it if the directory holds none.
    ///
    /// Fails with `StoreError::Locked` while another instance has `dir` open.
    pub fn open_with(dir: impl AsRef<Path>, options: FileStoreOptions) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        if let Some(parent) = dir.parent() {
            sync_dir(parent)?;
        }
        let lock = StoreLock::acquire(&dir)?;

        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let snapshot = match load_snapshot(&snapshot_path)? {
            Some(snapshot) => snapshot,
            None => {
                let snapshot = Snapshot {
                    store_id: UlidGenerator::new(SystemClock).generate_store_id(),
                    generation: 0,
                    next_sequence: Sequence::FIRST,
                    records: Vec::new(),
                };
                write_snapshot(&snapshot_path, &snapshot)?;
                info!(store_id = %snapshot.store_id, dir = %dir.display(), "created packet store");
                snapshot
            }
        };

        let (journal, entries) = Journal::open(dir.join(JOURNAL_FILE))?;
        sync_dir(&dir)?;
        let mut table = RecordTable::from_parts(snapshot.records, snapshot.next_sequence);

        let mut replayed = 0usize;
        for entry in entries {
            if entry.generation < snapshot.generation {
                continue;
            }
            if entry.generation > snapshot.generation {
                return Err(StoreError::Corrupt {
                    offset: 0,
                    reason: format!(
                        "journal generation {} is ahead of snapshot generation {}",
                        entry.generation, snapshot.generation
                    ),
                });
            }
            apply(&mut table, entry.op)?;
            replayed += 1;
        }

        let mut store = Self {
            dir,
            store_id: snapshot.store_id,
            generation: snapshot.generation,
            table,
            journal,
            options,
            _lock: lock,
        };

        info!(
            store_id = %store.store_id,
            records = store.table.len(),
            replayed,
            "opened packet store"
        );

        if store.journal.entries() >= store.options.compact_after_entries {
            store.compact()?;
        }
        Ok(store)
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Write every record into a fresh snapshot and empty the journal.
    pub fn compact(&mut self) -> Result<(), StoreError> {
        let snapshot = Snapshot {
            store_id: self.store_id,
            generation: self.generation + 1,
            next_sequence: self.table.next_sequence(),
            records: self.table.iter().cloned().collect(),
        };
        write_snapshot(&self.dir.join(SNAPSHOT_FILE), &snapshot)?;
        self.generation = snapshot.generation;
        self.journal.reset()?;
        debug!(
            store_id = %self.store_id,
            generation = self.generation,
            records = snapshot.records.len(),
            "compacted packet store"
        );
        Ok(())
    }

    /// Journal `op`, then apply it. Callers validate first, so a journaled op
    /// always applies.
    fn commit(&mut self, op: JournalOp) -> Result<(), StoreError> {
        let entry = JournalEntry {
            generation: self.generation,
            op,
        };
        self.journal.append(&entry)?;
        apply(&mut self.table, entry.op)?;

        // The op is durable already; a failed compaction is retried on the next commit.
        if self.journal.entries() >= self.options.compact_after_entries
            && let Err(err) = self.compact()
        {
            warn!(store_id = %self.store_id, error = %err, "compaction failed");
        }
        Ok(())
    }
}

fn apply(table: &mut RecordTable, op: JournalOp) -> Result<(), StoreError> {
    match op {
        JournalOp::Insert { records } => table.insert_all(records),
        JournalOp::Mark { sequences, state } => table.mark_states(&sequences, state),
        JournalOp::Remove { sequences } => {
            table.remove_all(&sequences);
            Ok(())
        }
    }
}

impl PacketStore for FilePacketStore {
    fn next_sequence(&self) -> Sequence {
        self.table.next_sequence()
    }

    fn insert_all(&mut self, records: Vec<QueuedRecord>) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        self.table.check_insert(&records)?;
        self.commit(JournalOp::Insert { records })
    }

    fn mark_states(
        &mut self,
        sequences: &[Sequence],
        state: LifecycleState,
    ) -> Result<(), StoreError> {
        if sequences.is_empty() {
            return Ok(());
        }
        self.table.check_transitions(sequences, state)?;
        self.commit(JournalOp::Mark {
            sequences: sequences.to_vec(),
            state,
        })
    }

    fn remove_where(
        &mut self,
        predicate: &dyn Fn(&QueuedRecord) -> bool,
    ) -> Result<Vec<QueuedRecord>, StoreError> {
        let doomed = self.table.matching(predicate);
        if doomed.is_empty() {
            return Ok(Vec::new());
        }
        let removed: Vec<QueuedRecord> = doomed
            .iter()
            .filter_map(|sequence| self.table.get(*sequence).cloned())
            .collect();
        self.commit(JournalOp::Remove { sequences: doomed })?;
        Ok(removed)
    }

    fn select_ordered(
        &self,
        limit_count: usize,
        limit_bytes: u64,
        state: LifecycleState,
    ) -> Result<Vec<QueuedRecord>, StoreError> {
        Ok(self.table.select_ordered(limit_count, limit_bytes, state))
    }

    fn totals_by_state(&self) -> Result<StoreTotals, StoreError> {
        Ok(self.table.totals())
    }

    fn sequences_in_state(&self, state: LifecycleState) -> Result<Vec<Sequence>, StoreError> {
        Ok(self.table.sequences_in_state(state))
    }

    fn sequences_where(
        &self,
        predicate: &dyn Fn(&QueuedRecord) -> bool,
    ) -> Result<Vec<Sequence>, StoreError> {
        Ok(self.table.matching(predicate))
    }

    fn get(&self, sequence: Sequence) -> Result<Option<QueuedRecord>, StoreError> {
        Ok(self.table.get(sequence).cloned())
    }
}

fn load_snapshot(path: &Path) -> Result<Option<Snapshot>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("tmp");
    let bytes = serde_json::to_vec(snapshot)?;
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    if let Some(dir) = path.parent() {
        sync_dir(dir)?;
    }
    Ok(())
}

/// Make renames and new entries in `dir` durable.
fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    File::open(dir)?.sync_all()?;
    Ok(())
}
