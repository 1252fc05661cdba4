//! InMemoryPacketStore - 開発・テスト用のストア
//!
//! プロセスが終了すると中身は消える。永続化が必要なら `FilePacketStore` を使う。

use super::RecordTable;
use crate::domain::{LifecycleState, QueuedRecord, Sequence, StoreError, StoreTotals};
use crate::ports::PacketStore;

#[derive(Debug, Default)]
pub struct InMemoryPacketStore {
    table: RecordTable,
}

impl InMemoryPacketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PacketStore for InMemoryPacketStore {
    fn next_sequence(&self) -> Sequence {
        self.table.next_sequence()
    }

    fn insert_all(&mut self, records: Vec<QueuedRecord>) -> Result<(), StoreError> {
        self.table.insert_all(records)
    }

    fn mark_states(
        &mut self,
        sequences: &[Sequence],
        state: LifecycleState,
    ) -> Result<(), StoreError> {
        self.table.mark_states(sequences, state)
    }

    fn remove_where(
        &mut self,
        predicate: &dyn Fn(&QueuedRecord) -> bool,
    ) -> Result<Vec<QueuedRecord>, StoreError> {
        let doomed = self.table.matching(predicate);
        Ok(self.table.remove_all(&doomed))
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


#[cfg(test)]
pub(crate) mod test_support {
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::InMemoryPacketStore;
    use crate::domain::{LifecycleState, QueuedRecord, Sequence, StoreError, StoreTotals};
    use crate::ports::PacketStore;

    /// Switches shared between a test and the `FaultyStore` it handed to a client.
    #[derive(Debug, Default)]
    pub struct Faults {
        fail_inserts: AtomicBool,
        fail_marks_to: Mutex<Vec<LifecycleState>>,
        gets: AtomicUsize,
    }

    impl Faults {
        pub fn fail_inserts(&self, failing: bool) {
            self.fail_inserts.store(failing, Ordering::SeqCst);
        }

        /// Fail every `mark_states` call that targets `state`.
        pub fn fail_marks_to(&self, state: LifecycleState) {
            self.fail_marks_to.lock().unwrap().push(state);
        }

        pub fn heal(&self) {
            self.fail_inserts(false);
            self.fail_marks_to.lock().unwrap().clear();
        }

        pub fn gets(&self) -> usize {
            self.gets.load(Ordering::SeqCst)
        }
    }

    fn disk_error() -> StoreError {
        StoreError::Io(io::Error::other("disk unavailable"))
    }

    /// In-memory store whose writes fail on demand, like a disk going away.
    #[derive(Debug, Default)]
    pub struct FaultyStore {
        inner: InMemoryPacketStore,
        faults: Arc<Faults>,
    }

    impl FaultyStore {
        pub fn new() -> (Self, Arc<Faults>) {
            let store = Self::default();
            let faults = Arc::clone(&store.faults);
            (store, faults)
        }
    }

    impl PacketStore for FaultyStore {
        fn next_sequence(&self) -> Sequence {
            self.inner.next_sequence()
        }

        fn insert_all(&mut self, records: Vec<QueuedRecord>) -> Result<(), StoreError> {
            if self.faults.fail_inserts.load(Ordering::SeqCst) {
                return Err(disk_error());
            }
            self.inner.insert_all(records)
        }

        fn mark_states(
            &mut self,
            sequences: &[Sequence],
            state: LifecycleState,
        ) -> Result<(), StoreError> {
            if self.faults.fail_marks_to.lock().unwrap().contains(&state) {
                return Err(disk_error());
            }
            self.inner.mark_states(sequences, state)
        }

        fn remove_where(
            &mut self,
            predicate: &dyn Fn(&QueuedRecord) -> bool,
        ) -> Result<Vec<QueuedRecord>, StoreError> {
            self.inner.remove_where(predicate)
        }

        fn select_ordered(
            &self,
            limit_count: usize,
            limit_bytes: u64,
            state: LifecycleState,
        ) -> Result<Vec<QueuedRecord>, StoreError> {
            self.inner.select_ordered(limit_count, limit_bytes, state)
        }

        fn totals_by_state(&self) -> Result<StoreTotals, StoreError> {
            self.inner.totals_by_state()
        }

        fn sequences_in_state(&self, state: LifecycleState) -> Result<Vec<Sequence>, StoreError> {
            self.inner.sequences_in_state(state)
        }

        fn sequences_where(
            &self,
            predicate: &dyn Fn(&QueuedRecord) -> bool,
        ) -> Result<Vec<Sequence>, StoreError> {
            self.inner.sequences_where(predicate)
        }

        fn get(&self, sequence: Sequence) -> Result<Option<QueuedRecord>, StoreError> {
            self.faults.gets.fetch_add(1, Ordering::SeqCst);
            self.inner.get(sequence)
        }
    }
}
