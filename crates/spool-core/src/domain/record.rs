//! Queued record: metadata + packet.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DataPacket, LifecycleState, Sequence};

/// Metadata + packet for one entry of the packet store.
///
/// Design:
/// - This is the single source of truth for a packet's progress.
/// - Batches and journal entries refer to records by `Sequence` only.
/// - The state field is only changed through `transition`, which enforces
///   the lifecycle state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRecord {
    pub sequence: Sequence,

    /// Rank from the prioritizer; lower is more urgent.
    pub priority: i64,

    pub enqueued_at: DateTime<Utc>,

    /// Absolute deadline: enqueue time + TTL.
    pub expiry_deadline: DateTime<Utc>,

    pub size_bytes: u64,

    pub state: LifecycleState,

    pub packet: DataPacket,
}

impl QueuedRecord {
    pub fn new(
        sequence: Sequence,
        packet: DataPacket,
        priority: i64,
        enqueued_at: DateTime<Utc>,
        expiry_deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            sequence,
            priority,
            enqueued_at,
            expiry_deadline,
            size_bytes: packet.size_bytes(),
            state: LifecycleState::Queued,
            packet,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry_deadline
    }

    /// Ordering key for batch selection: priority, then arrival.
    pub fn order_key(&self) -> (i64, Sequence) {
        (self.priority, self.sequence)
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// Returns the previous state on failure so callers can report it.
    pub fn transition(&mut self, next: LifecycleState) -> Result<(), LifecycleState> {
        if !self.state.can_transition_to(next) {
            return Err(self.state);
        }
        self.state = next;
        Ok(())
    }
}
