//! PacketStore port - キューの正本（source of truth）
//!
//! PacketStore は以下を管理します：
//! - レコード（packet + priority + deadline + size）
//! - ライフサイクル状態（Queued / InFlight / SentPendingCleanup / Expired）
//! - シーケンス番号の採番（ストアの寿命を通して単調増加）
//!
//! # 実装
//! - `InMemoryPacketStore`: テスト・一時利用
//! - `FilePacketStore`: ディレクトリに永続化（再起動後も同じ状態が見える）
//!
//! # 設計原則
//! - 各メソッドは全体として成功するか、何も変更しないかのどちらか
//! - 排他制御は呼び出し側（client の Mutex）が担う。store 自体は `&mut self`

use crate::domain::{LifecycleState, QueuedRecord, Sequence, StoreError, StoreTotals};

pub trait PacketStore: Send {
    /// Sequence the next inserted record must carry.
    fn next_sequence(&self) -> Sequence;

    fn insert(&mut self, record: QueuedRecord) -> Result<(), StoreError> {
        self.insert_all(vec![record])
    }

    /// Insert several records in one atomic write.
    fn insert_all(&mut self, records: Vec<QueuedRecord>) -> Result<(), StoreError>;

    fn mark_state(&mut self, sequence: Sequence, state: LifecycleState) -> Result<(), StoreError> {
        self.mark_states(&[sequence], state)
    }

    /// Transition several records in one atomic write.
    ///
    /// Every transition is validated before any is applied.
    fn mark_states(
        &mut self,
        sequences: &[Sequence],
        state: LifecycleState,
    ) -> Result<(), StoreError>;

    /// Delete every record matching `predicate`; returns the removed records.
    fn remove_where(
        &mut self,
        predicate: &dyn Fn(&QueuedRecord) -> bool,
    ) -> Result<Vec<QueuedRecord>, StoreError>;

    /// Records in `state`, ordered by (priority, sequence), capped by count and
    /// cumulative bytes.
    fn select_ordered(
        &self,
        limit_count: usize,
        limit_bytes: u64,
        state: LifecycleState,
    ) -> Result<Vec<QueuedRecord>, StoreError>;

    fn totals_by_state(&self) -> Result<StoreTotals, StoreError>;

    /// Sequences of the records currently in `state`, ascending.
    fn sequences_in_state(&self, state: LifecycleState) -> Result<Vec<Sequence>, StoreError>;

    /// Sequences of the records matching `predicate`, ascending.
    ///
    /// Records are borrowed in place, so scans over large queues copy no payloads.
    fn sequences_where(
        &self,
        predicate: &dyn Fn(&QueuedRecord) -> bool,
    ) -> Result<Vec<Sequence>, StoreError>;

    fn get(&self, sequence: Sequence) -> Result<Option<QueuedRecord>, StoreError>;
}
