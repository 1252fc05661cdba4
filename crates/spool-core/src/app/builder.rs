//! ClientBuilder - クライアントの構築とワイヤリング
//!
//! # 起動時検証（Fail-fast）
//! - `build()` で設定を検証し、不正なら `QueueError::InvalidConfig`
//! - ストアを開けなければ `QueueError::StoreUnavailable`
//! - 前回のプロセスが送信途中で止まっていた場合、`InFlight` のレコードを `Queued` に戻す
//!   （再送になる。重複排除は batch id を使って sender 側で行う）

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;

use super::QueuedSiteToSiteClient;
use crate::config::QueueConfig;
use crate::domain::QueueError;
use crate::impls::{FilePacketStore, FileStoreOptions, InMemoryPacketStore};
use crate::ports::{Clock, PacketStore, SystemClock, TransactionSender};
use crate::queue::QueueEngine;

enum StoreChoice {
    InMemory,
    Directory(PathBuf, FileStoreOptions),
    Custom(Box<dyn PacketStore>),
}

/// # 使用例
/// ```ignore
/// let client = ClientBuilder::new(Arc::new(sender))
///     .config(QueueConfig::default().with_preferred_batch_count(50))
///     .file_store("/var/lib/spool")
///     .build()?;
/// ```
pub struct ClientBuilder {
    config: QueueConfig,
    store: StoreChoice,
    sender: Arc<dyn TransactionSender>,
    clock: Arc<dyn Clock>,
}

impl ClientBuilder {
    /// In-memory store, default config and the system clock.
    pub fn new(sender: Arc<dyn TransactionSender>) -> Self {
        Self {
            config: QueueConfig::default(),
            store: StoreChoice::InMemory,
            sender,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.store = StoreChoice::InMemory;
        self
    }

    pub fn file_store(self, dir: impl Into<PathBuf>) -> Self {
        self.file_store_with(dir, FileStoreOptions::default())
    }

    pub fn file_store_with(mut self, dir: impl Into<PathBuf>, options: FileStoreOptions) -> Self {
        self.store = StoreChoice::Directory(dir.into(), options);
        self
    }

    pub fn store(mut self, store: Box<dyn PacketStore>) -> Self {
        self.store = StoreChoice::Custom(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> Result<QueuedSiteToSiteClient, QueueError> {
        self.config.validate()?;

        let store: Box<dyn PacketStore> = match self.store {
            StoreChoice::InMemory => Box::new(InMemoryPacketStore::new()),
            StoreChoice::Directory(dir, options) => {
                let store = FilePacketStore::open_with(&dir, options)?;
                info!(store_id = %store.store_id(), dir = %dir.display(), "opened packet store");
                Box::new(store)
            }
            StoreChoice::Custom(store) => store,
        };

        let mut engine = QueueEngine::new(store, Arc::clone(&self.clock));
        engine.recover_in_flight()?;

        Ok(QueuedSiteToSiteClient::from_parts(
            engine,
            self.config,
            self.sender,
            self.clock,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::test_support::{RecordingSender, packet};
    use crate::config::ConfigError;
    use crate::domain::LifecycleState;

    #[test]
    fn invalid_config_fails_fast() {
        let result = ClientBuilder::new(Arc::new(RecordingSender::default()))
            .config(QueueConfig::default().with_preferred_batch_count(0))
            .build();
        assert!(matches!(
            result,
            Err(QueueError::InvalidConfig(ConfigError::Zero {
                field: "preferred_batch_count"
            }))
        ));
    }

    #[test]
    fn build_requeues_records_left_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let config = QueueConfig::default();
        {
            let store = FilePacketStore::open(dir.path()).unwrap();
            let mut engine = QueueEngine::new(Box::new(store), Arc::new(SystemClock));
            engine.admit(&config, packet("a", 0)).unwrap();
            engine.build_batch(&config).unwrap();
            assert_eq!(engine.totals().unwrap().in_flight.count, 1);
        }

        let client = ClientBuilder::new(Arc::new(RecordingSender::default()))
            .file_store(dir.path())
            .build()
            .unwrap();
        let status = client.status().unwrap();
        assert_eq!(status.totals.get(LifecycleState::Queued).count, 1);
        assert_eq!(status.totals.in_flight.count, 0);
    }
}
