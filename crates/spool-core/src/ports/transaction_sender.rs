//! TransactionSender port - リモートの ingest endpoint への送信
//!
//! 転送プロトコル自体（handshake, peer 選択, framing, flow control）はこの trait の向こう側。
//! キューから見えるのは「順序付きのバッチを 1 トランザクションで送る」ことだけ。
//!
//! # 契約
//! - 与えられた順序でパケットを処理する
//! - all-or-nothing（部分的なコミットはしない）
//! - 同じ `batch_id` での再送は安全（重複排除は sender 側の責務）
//! - ネットワーク I/O のタイムアウト・キャンセルも sender 側の設定で行う

use std::time::Duration;

use thiserror::Error;

use crate::domain::{BatchId, DataPacket, TransactionResult};

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("transfer I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote rejected the transaction: {reason}")]
    Rejected { reason: String },

    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote endpoint unavailable: {0}")]
    Unavailable(String),
}

pub trait TransactionSender: Send + Sync {
    fn send(
        &self,
        batch_id: BatchId,
        packets: &[DataPacket],
    ) -> Result<TransactionResult, TransferError>;
}

impl<S: TransactionSender + ?Sized> TransactionSender for std::sync::Arc<S> {
    fn send(
        &self,
        batch_id: BatchId,
        packets: &[DataPacket],
    ) -> Result<TransactionResult, TransferError> {
        (**self).send(batch_id, packets)
    }
}
