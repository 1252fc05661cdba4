//! Admission decisions against the two capacity ceilings.

use crate::config::QueueConfig;
use crate::domain::{QueueError, StoreTotals};

/// Count and byte ceilings for records that are queued or in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capacity {
    pub max_count: usize,
    pub max_bytes: u64,
}

impl Capacity {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            max_count: config.max_queued_packet_count,
            max_bytes: config.max_queued_packet_size,
        }
    }

    /// Can `requested_count` records totalling `requested_bytes` join the
    /// live records in `totals`? All or nothing.
    pub fn check(
        &self,
        totals: &StoreTotals,
        requested_count: usize,
        requested_bytes: u64,
    ) -> Result<(), QueueError> {
        let queued_count = totals.live_count();
        let queued_bytes = totals.live_bytes();

        let count_fits = queued_count
            .checked_add(requested_count)
            .is_some_and(|n| n <= self.max_count);
        let bytes_fit = queued_bytes
            .checked_add(requested_bytes)
            .is_some_and(|n| n <= self.max_bytes);

        if count_fits && bytes_fit {
            return Ok(());
        }
        Err(QueueError::CapacityExceeded {
            requested_count,
            requested_bytes,
            queued_count,
            queued_bytes,
            max_count: self.max_count,
            max_bytes: self.max_bytes,
        })
    }
}
