//! Record lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle of a queued record.
///
/// State transitions:
/// - Queued -> InFlight -> SentPendingCleanup
/// - Queued -> InFlight -> Queued (transmission failed, or recovered after a crash)
/// - Queued -> Expired, InFlight -> Expired (deadline passed)
/// - SentPendingCleanup / Expired -> (deleted by cleanup)
///
/// `InFlight -> Expired` is a legal store transition, but `QueueEngine` never
/// takes it: an in-flight batch waits for its outcome, and a failed batch is
/// expired by the next sweep once it is back in `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Waiting to be selected into a batch.
    Queued,

    /// Part of the batch currently being transmitted.
    InFlight,

    /// Transaction committed; kept until cleanup purges it.
    SentPendingCleanup,

    /// Deadline passed before the packet was sent.
    Expired,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 4] = [
        LifecycleState::Queued,
        LifecycleState::InFlight,
        LifecycleState::SentPendingCleanup,
        LifecycleState::Expired,
    ];

    /// No further transitions; only removal follows.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LifecycleState::SentPendingCleanup | LifecycleState::Expired
        )
    }

    /// Does a record in this state occupy queue capacity?
    pub fn counts_toward_capacity(self) -> bool {
        matches!(self, LifecycleState::Queued | LifecycleState::InFlight)
    }

    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Queued, InFlight)
                | (Queued, Expired)
                | (InFlight, SentPendingCleanup)
                | (InFlight, Queued)
                | (InFlight, Expired)
        )
    }
}
