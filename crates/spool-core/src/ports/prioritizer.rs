//! DataPacketPrioritizer port - 優先度と TTL の決定
//!
//! アプリ固有のビジネスロジック（どのパケットを先に送るか、いつ捨てるか）を
//! キューの外から差し込むための capability。
//!
//! # 設計原則
//! - 純粋関数（同じパケットには常に同じ答えを返す）
//! - キューは何回呼んでもよい
//! - 小さい値ほど優先度が高い（0 は 1 より先、1 は 10 より先）

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::DataPacket;

pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

pub trait DataPacketPrioritizer: Send + Sync {
    /// Priority rank; lower values are sent first.
    fn priority_for(&self, packet: &DataPacket) -> i64;

    /// Time-to-live, relative to the moment the packet is queued.
    fn ttl_for(&self, packet: &DataPacket) -> Duration;
}

/// Same priority for every packet, fixed TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoOpPrioritizer {
    ttl: Duration,
}

impl NoOpPrioritizer {
    /// Priority 0, TTL 1s.
    pub fn new() -> Self {
        Self { ttl: DEFAULT_TTL }
    }

    pub fn with_fixed_ttl(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl Default for NoOpPrioritizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DataPacketPrioritizer for NoOpPrioritizer {
    fn priority_for(&self, _packet: &DataPacket) -> i64 {
        0
    }

    fn ttl_for(&self, _packet: &DataPacket) -> Duration {
        self.ttl
    }
}

/// Reads priority and TTL (milliseconds) from packet attributes.
///
/// Missing or unparsable attributes fall back to the defaults, so the answer
/// for a given packet never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePrioritizer {
    #[serde(default = "default_priority_attribute")]
    pub priority_attribute: String,

    #[serde(default = "default_ttl_attribute")]
    pub ttl_attribute: String,

    #[serde(default)]
    pub default_priority: i64,

    #[serde(default = "default_ttl_millis")]
    pub default_ttl_millis: u64,
}

fn default_priority_attribute() -> String {
    "priority".to_string()
}

fn default_ttl_attribute() -> String {
    "ttl.millis".to_string()
}

fn default_ttl_millis() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

impl Default for AttributePrioritizer {
    fn default() -> Self {
        Self {
            priority_attribute: default_priority_attribute(),
            ttl_attribute: default_ttl_attribute(),
            default_priority: 0,
            default_ttl_millis: default_ttl_millis(),
        }
    }
}

impl DataPacketPrioritizer for AttributePrioritizer {
    fn priority_for(&self, packet: &DataPacket) -> i64 {
        packet
            .attribute(&self.priority_attribute)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.default_priority)
    }

    fn ttl_for(&self, packet: &DataPacket) -> Duration {
        let millis = packet
            .attribute(&self.ttl_attribute)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.default_ttl_millis);
        Duration::from_millis(millis)
    }
}
