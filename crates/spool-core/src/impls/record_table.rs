//! RecordTable - ストア実装が共有するインメモリ索引
//!
//! `InMemoryPacketStore` と `FilePacketStore` の両方がこれを持つ。
//! FilePacketStore は journal に書いてから同じ変更をこの表に適用する。
//!
//! # 不変条件
//! - `records` は sequence 昇順（BTreeMap）
//! - `totals` は `records` の状態別集計と常に一致する
//! - `next_sequence` は過去に採番したどの sequence よりも大きい

use std::collections::BTreeMap;

use crate::domain::{
    LifecycleState, QueuedRecord, Sequence, StoreError, StoreTotals,
};

#[derive(Debug, Clone)]
pub struct RecordTable {
    records: BTreeMap<Sequence, QueuedRecord>,
    totals: StoreTotals,
    next_sequence: Sequence,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordTable {
    pub fn new() -> Self {
        Self {
            records: BTreeMap::new(),
            totals: StoreTotals::default(),
            next_sequence: Sequence::FIRST,
        }
    }

    /// Rebuild from persisted records; `next_sequence` never moves backwards.
    pub fn from_parts(records: Vec<QueuedRecord>, next_sequence: Sequence) -> Self {
        let mut table = Self::new();
        table.next_sequence = next_sequence;
        for record in records {
            table.put(record);
        }
        table
    }

    pub fn next_sequence(&self) -> Sequence {
        self.next_sequence
    }

    pub fn totals(&self) -> StoreTotals {
        self.totals
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, sequence: Sequence) -> Option<&QueuedRecord> {
        self.records.get(&sequence)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedRecord> {
        self.records.values()
    }

    /// Check that `records` can be inserted as one unit.
    pub fn check_insert(&self, records: &[QueuedRecord]) -> Result<(), StoreError> {
        let mut expected = self.next_sequence;
        for record in records {
            if self.records.contains_key(&record.sequence) {
                return Err(StoreError::DuplicateSequence(record.sequence));
            }
            if record.sequence < expected {
                return Err(StoreError::DuplicateSequence(record.sequence));
            }
            expected = record.sequence.next();
        }
        Ok(())
    }

    pub fn insert_all(&mut self, records: Vec<QueuedRecord>) -> Result<(), StoreError> {
        self.check_insert(&records)?;
        for record in records {
            self.put(record);
        }
        Ok(())
    }

    /// Check that every listed record exists and may move to `state`.
    pub fn check_transitions(
        &self,
        sequences: &[Sequence],
        state: LifecycleState,
    ) -> Result<(), StoreError> {
        for sequence in sequences {
            let record = self
                .records
                .get(sequence)
                .ok_or(StoreError::UnknownSequence(*sequence))?;
            if !record.state.can_transition_to(state) {
                return Err(StoreError::InvalidTransition {
                    sequence: *sequence,
                    from: record.state,
                    to: state,
                });
            }
        }
        Ok(())
    }

    pub fn mark_states(
        &mut self,
        sequences: &[Sequence],
        state: LifecycleState,
    ) -> Result<(), StoreError> {
        self.check_transitions(sequences, state)?;
        for sequence in sequences {
            if let Some(record) = self.records.get_mut(sequence) {
                let from = record.state;
                let size = record.size_bytes;
                if record.transition(state).is_ok() {
                    let old = self.totals.get_mut(from);
                    old.count -= 1;
                    old.bytes -= size;
                    self.totals.get_mut(state).add(size);
                }
            }
        }
        Ok(())
    }

    /// Sequences of the records matching `predicate`, ascending.
    pub fn matching(&self, predicate: &dyn Fn(&QueuedRecord) -> bool) -> Vec<Sequence> {
        self.records
            .values()
            .filter(|record| predicate(record))
            .map(|record| record.sequence)
            .collect()
    }

    pub fn remove_all(&mut self, sequences: &[Sequence]) -> Vec<QueuedRecord> {
        let mut removed = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            if let Some(record) = self.records.remove(sequence) {
                let totals = self.totals.get_mut(record.state);
                totals.count -= 1;
                totals.bytes -= record.size_bytes;
                removed.push(record);
            }
        }
        removed
    }

    /// Records in `state` sorted by (priority, sequence).
    ///
    /// Stops at `limit_count` records, or before the record that would push the
    /// cumulative size past `limit_bytes`. The first record is always taken so an
    /// oversized packet cannot stall the queue.
    pub fn select_ordered(
        &self,
        limit_count: usize,
        limit_bytes: u64,
        state: LifecycleState,
    ) -> Vec<QueuedRecord> {
        if limit_count == 0 {
            return Vec::new();
        }

        let mut candidates: Vec<&QueuedRecord> = self
            .records
            .values()
            .filter(|record| record.state == state)
            .collect();
        candidates.sort_by_key(|record| record.order_key());

        let mut selected = Vec::new();
        let mut bytes = 0u64;
        for record in candidates {
            if selected.len() >= limit_count {
                break;
            }
            if !selected.is_empty() && bytes + record.size_bytes > limit_bytes {
                break;
            }
            bytes += record.size_bytes;
            selected.push(record.clone());
        }
        selected
    }

    pub fn sequences_in_state(&self, state: LifecycleState) -> Vec<Sequence> {
        self.matching(&|record: &QueuedRecord| record.state == state)
    }

    fn put(&mut self, record: QueuedRecord) {
        if record.sequence >= self.next_sequence {
            self.next_sequence = record.sequence.next();
        }
        self.totals.get_mut(record.state).add(record.size_bytes);
        if let Some(previous) = self.records.insert(record.sequence, record) {
            let totals = self.totals.get_mut(previous.state);
            totals.count -= 1;
            totals.bytes -= previous.size_bytes;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::domain::{DataPacket, QueuedRecord, Sequence};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    pub fn record(seq: u64, priority: i64, size: usize) -> QueuedRecord {
        QueuedRecord::new(
            Sequence::new(seq),
            DataPacket::from_payload(vec![b'x'; size]).with_attribute("name", format!("p{seq}")),
            priority,
            t0(),
            t0() + Duration::seconds(60),
        )
    }
}
