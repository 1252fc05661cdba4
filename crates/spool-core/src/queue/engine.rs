//! Queue engine: admission, expiry, batching and reconciliation over a store.
//!
//! The engine is not thread-safe on its own; the client keeps it behind a
//! single mutex so every method runs as one unit against the store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{Batch, Capacity};
use crate::config::QueueConfig;
use crate::domain::{
    DataPacket, LifecycleState, PurgeCount, QueueError, QueuedRecord, Sequence, StoreError,
    StoreTotals,
};
use crate::ports::{Clock, IdGenerator, PacketStore, UlidGenerator};

/// TTLs are clamped so deadlines stay inside the range chrono can format.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// How the transaction sender finished with a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmissionOutcome {
    Committed,
    Failed,
}

pub struct QueueEngine {
    store: Box<dyn PacketStore>,
    clock: Arc<dyn Clock>,
    ids: UlidGenerator<Arc<dyn Clock>>,
}

impl QueueEngine {
    pub fn new(store: Box<dyn PacketStore>, clock: Arc<dyn Clock>) -> Self {
        let ids = UlidGenerator::new(Arc::clone(&clock));
        Self { store, clock, ids }
    }

    pub fn store(&self) -> &dyn PacketStore {
        self.store.as_ref()
    }

    pub fn totals(&self) -> Result<StoreTotals, StoreError> {
        self.store.totals_by_state()
    }

    /// Move every queued record whose deadline has passed to `Expired`.
    ///
    /// In-flight records are left alone: their batch is still being
    /// transmitted, and a failed batch is swept on the next pass.
    pub fn sweep_expired(&mut self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let expired = self.store.sequences_where(&|record: &QueuedRecord| {
            record.state == LifecycleState::Queued && record.is_expired_at(now)
        })?;
        if !expired.is_empty() {
            self.store.mark_states(&expired, LifecycleState::Expired)?;
            debug!(count = expired.len(), "expired queued packets");
        }
        Ok(expired.len())
    }

    pub fn admit(
        &mut self,
        config: &QueueConfig,
        packet: DataPacket,
    ) -> Result<Sequence, QueueError> {
        let sequence = self.store.next_sequence();
        self.admit_all(config, vec![packet])?;
        Ok(sequence)
    }

    /// Admit every packet or none of them.
    pub fn admit_all(
        &mut self,
        config: &QueueConfig,
        packets: Vec<DataPacket>,
    ) -> Result<Vec<Sequence>, QueueError> {
        if packets.is_empty() {
            return Ok(Vec::new());
        }
        self.sweep_expired()?;

        let now = self.clock.now();
        let prioritizer = config.prioritizer();
        let mut sequence = self.store.next_sequence();
        let mut records = Vec::with_capacity(packets.len());
        let mut requested_bytes = 0u64;
        for packet in packets {
            let priority = prioritizer.priority_for(&packet);
            let deadline = expiry_deadline(now, prioritizer.ttl_for(&packet));
            let record = QueuedRecord::new(sequence, packet, priority, now, deadline);
            requested_bytes += record.size_bytes;
            records.push(record);
            sequence = sequence.next();
        }

        let totals = self.store.totals_by_state()?;
        Capacity::from_config(config).check(&totals, records.len(), requested_bytes)?;

        let sequences: Vec<Sequence> = records.iter().map(|r| r.sequence).collect();
        self.store.insert_all(records)?;
        debug!(
            count = sequences.len(),
            bytes = requested_bytes,
            "admitted packets"
        );
        Ok(sequences)
    }

    /// Select the next batch and mark it in flight. Empty when nothing is queued.
    pub fn build_batch(&mut self, config: &QueueConfig) -> Result<Batch, QueueError> {
        self.sweep_expired()?;
        let records = self.store.select_ordered(
            config.preferred_batch_count,
            config.preferred_batch_size,
            LifecycleState::Queued,
        )?;
        let batch = Batch::from_records(self.ids.generate_batch_id(), records);
        if !batch.is_empty() {
            self.store
                .mark_states(batch.sequences(), LifecycleState::InFlight)?;
        }
        Ok(batch)
    }

    /// Apply a transmission outcome to every record of `batch`.
    pub fn reconcile(
        &mut self,
        batch: &Batch,
        outcome: TransmissionOutcome,
    ) -> Result<(), StoreError> {
        let next = match outcome {
            TransmissionOutcome::Committed => LifecycleState::SentPendingCleanup,
            TransmissionOutcome::Failed => LifecycleState::Queued,
        };
        self.store.mark_states(batch.sequences(), next)
    }

    /// Sweep expired records, then delete every sent or expired record.
    pub fn purge_terminal(&mut self) -> Result<PurgeCount, StoreError> {
        self.sweep_expired()?;
        let removed = self
            .store
            .remove_where(&|record: &QueuedRecord| record.state.is_terminal())?;
        let mut purge = PurgeCount::default();
        for record in &removed {
            match record.state {
                LifecycleState::SentPendingCleanup => purge.sent += 1,
                LifecycleState::Expired => purge.expired += 1,
                LifecycleState::Queued | LifecycleState::InFlight => {}
            }
        }
        Ok(purge)
    }

    /// Return records left in flight by an interrupted process to the queue.
    ///
    /// The outcome of their transaction is unknown, so they are sent again;
    /// the batch id lets the remote side drop the duplicate.
    ///
    /// This is also the only way out of `InFlight` for a batch whose outcome
    /// could not be written: until the next build it holds capacity and is
    /// not selected again.
    pub fn recover_in_flight(&mut self) -> Result<usize, StoreError> {
        let stranded = self.store.sequences_in_state(LifecycleState::InFlight)?;
        if !stranded.is_empty() {
            self.store.mark_states(&stranded, LifecycleState::Queued)?;
            warn!(
                count = stranded.len(),
                "requeued packets left in flight by an interrupted process"
            );
        }
        Ok(stranded.len())
    }
}

fn expiry_deadline(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    let ttl = chrono::Duration::from_std(ttl.min(MAX_TTL)).unwrap_or(chrono::Duration::zero());
    now.checked_add_signed(ttl).unwrap_or(now)
}
