//! Errors - エラー型と分類
//!
//! - `StoreError`: 永続化レイヤーの失敗（I/O, 破損, 不正な状態遷移）
//! - `TransferError`: transaction sender の失敗（ports::transaction_sender で定義）
//! - `QueueError`: 呼び出し側に返す分類済みエラー
//!
//! どのエラーでもストアの不変条件は保たれる。失敗した操作はストアを変更しない。

use thiserror::Error;

use super::{LifecycleState, Sequence};
use crate::config::ConfigError;
use crate::ports::TransferError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("corrupt store data at offset={offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("no record with sequence {0}")]
    UnknownSequence(Sequence),

    #[error("record with sequence {0} already exists")]
    DuplicateSequence(Sequence),

    #[error("record {sequence} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        sequence: Sequence,
        from: LifecycleState,
        to: LifecycleState,
    },

    #[error("store directory {} is in use by another instance", .0.display())]
    Locked(std::path::PathBuf),

    #[error("store lock poisoned by a panicking thread")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(
        "queue capacity exceeded: adding {requested_count} packet(s) / {requested_bytes} bytes to \
         {queued_count} packet(s) / {queued_bytes} bytes would exceed {max_count} packets / {max_bytes} bytes"
    )]
    CapacityExceeded {
        requested_count: usize,
        requested_bytes: u64,
        queued_count: usize,
        queued_bytes: u64,
        max_count: usize,
        max_bytes: u64,
    },

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("transmission failed: {0}")]
    TransmissionFailed(#[from] TransferError),

    #[error("another process call is already in progress")]
    ConcurrentProcessInProgress,

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

impl QueueError {
    /// Worth retrying later without changing anything?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            QueueError::CapacityExceeded { .. }
                | QueueError::TransmissionFailed(_)
                | QueueError::ConcurrentProcessInProgress
        )
    }
}
