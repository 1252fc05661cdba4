//! Result values returned by the queue operations.

use serde::{Deserialize, Serialize};

use super::{BatchId, LifecycleState};

/// What the transaction sender reports after committing a batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionResult {
    pub packets_transferred: usize,
    pub bytes_transferred: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TransactionResult {
    pub fn new(packets_transferred: usize, bytes_transferred: u64) -> Self {
        Self {
            packets_transferred,
            bytes_transferred,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of one `process` call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    /// `None` when there was nothing to send.
    pub batch_id: Option<BatchId>,
    pub packet_count: usize,
    pub byte_count: u64,
    pub sent: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionResult>,
}

impl BatchOutcome {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Records removed by one `cleanup` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PurgeCount {
    pub sent: usize,
    pub expired: usize,
}

impl PurgeCount {
    pub fn total(&self) -> usize {
        self.sent + self.expired
    }
}

/// Count and byte size of the records in one lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StateTotals {
    pub count: usize,
    pub bytes: u64,
}

impl StateTotals {
    pub fn add(&mut self, bytes: u64) {
        self.count += 1;
        self.bytes += bytes;
    }
}

/// Per-state totals of a packet store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreTotals {
    pub queued: StateTotals,
    pub in_flight: StateTotals,
    pub sent_pending_cleanup: StateTotals,
    pub expired: StateTotals,
}

impl StoreTotals {
    pub fn get(&self, state: LifecycleState) -> StateTotals {
        match state {
            LifecycleState::Queued => self.queued,
            LifecycleState::InFlight => self.in_flight,
            LifecycleState::SentPendingCleanup => self.sent_pending_cleanup,
            LifecycleState::Expired => self.expired,
        }
    }

    pub fn get_mut(&mut self, state: LifecycleState) -> &mut StateTotals {
        match state {
            LifecycleState::Queued => &mut self.queued,
            LifecycleState::InFlight => &mut self.in_flight,
            LifecycleState::SentPendingCleanup => &mut self.sent_pending_cleanup,
            LifecycleState::Expired => &mut self.expired,
        }
    }

    /// Records that occupy capacity (`Queued` + `InFlight`).
    pub fn live_count(&self) -> usize {
        self.queued.count + self.in_flight.count
    }

    pub fn live_bytes(&self) -> u64 {
        self.queued.bytes + self.in_flight.bytes
    }

    pub fn total_count(&self) -> usize {
        LifecycleState::ALL
            .iter()
            .map(|state| self.get(*state).count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_totals_ignore_terminal_states() {
        let mut totals = StoreTotals::default();
        totals.get_mut(LifecycleState::Queued).add(10);
        totals.get_mut(LifecycleState::InFlight).add(5);
        totals.get_mut(LifecycleState::SentPendingCleanup).add(100);
        totals.get_mut(LifecycleState::Expired).add(1000);

        assert_eq!(totals.live_count(), 2);
        assert_eq!(totals.live_bytes(), 15);
        assert_eq!(totals.total_count(), 4);
    }

    #[test]
    fn purge_count_total() {
        let purge = PurgeCount { sent: 3, expired: 2 };
        assert_eq!(purge.total(), 5);
    }
}
