//! JsonLinesSender - ファイルへ書き出すローカルの送信先
//!
//! 1 トランザクション = 1 行の JSON。行全体をメモリ上で組み立ててから
//! 1 回の `write_all` + `sync_data` で書くので、トランザクションは all-or-nothing。
//! CLI や動作確認で、実際のリモート endpoint の代わりに使う。

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;

use crate::domain::{BatchId, DataPacket, TransactionResult};
use crate::ports::{TransactionSender, TransferError};

#[derive(Debug, Serialize)]
struct TransactionLine<'a> {
    batch_id: BatchId,
    packets: &'a [DataPacket],
}

#[derive(Debug)]
pub struct JsonLinesSender {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSender {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, TransferError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TransactionSender for JsonLinesSender {
    fn send(
        &self,
        batch_id: BatchId,
        packets: &[DataPacket],
    ) -> Result<TransactionResult, TransferError> {
        let line = TransactionLine { batch_id, packets };
        let mut bytes = serde_json::to_vec(&line).map_err(|e| TransferError::Rejected {
            reason: format!("cannot encode batch: {e}"),
        })?;
        bytes.push(b'\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| TransferError::Unavailable("sender lock poisoned".to_string()))?;
        file.write_all(&bytes)?;
        file.sync_data()?;

        let payload_bytes = packets.iter().map(DataPacket::size_bytes).sum();
        Ok(TransactionResult::new(packets.len(), payload_bytes)
            .with_message(format!("appended to {}", self.path.display())))
    }
}
