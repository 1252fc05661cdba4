//! Status - キューの状態スナップショット
//!
//! CLI の `status` や運用ログ向け。状態ごとの件数・バイト数と設定上の上限を並べる。

use serde::{Deserialize, Serialize};

use crate::config::QueueConfig;
use crate::domain::StoreTotals;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    #[serde(flatten)]
    pub totals: StoreTotals,
    pub max_queued_packet_count: usize,
    pub max_queued_packet_size: u64,
    pub preferred_batch_count: usize,
    pub preferred_batch_size: u64,
}

impl QueueStatus {
    pub fn new(totals: StoreTotals, config: &QueueConfig) -> Self {
        Self {
            totals,
            max_queued_packet_count: config.max_queued_packet_count,
            max_queued_packet_size: config.max_queued_packet_size,
            preferred_batch_count: config.preferred_batch_count,
            preferred_batch_size: config.preferred_batch_size,
        }
    }

    /// Packets that can still be admitted before the count ceiling.
    pub fn remaining_count(&self) -> usize {
        self.max_queued_packet_count
            .saturating_sub(self.totals.live_count())
    }

    pub fn remaining_bytes(&self) -> u64 {
        self.max_queued_packet_size
            .saturating_sub(self.totals.live_bytes())
    }

    /// Records waiting for `cleanup`.
    pub fn pending_cleanup(&self) -> usize {
        self.totals.sent_pending_cleanup.count + self.totals.expired.count
    }
}
