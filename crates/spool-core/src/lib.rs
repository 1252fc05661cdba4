//! spool-core
//!
//! Store-and-forward queue for site-to-site transfers: packets are persisted
//! locally, sent in prioritized batches when a peer is reachable, and expire
//! when their TTL runs out.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, packet, record, state, outcome, errors）
//! - **ports**: 抽象化レイヤー（PacketStore, TransactionSender, DataPacketPrioritizer, Clock, IdGenerator）
//! - **impls**: 実装（InMemoryPacketStore, FilePacketStore, JsonLinesSender）
//! - **queue**: キューエンジン（容量判定, バッチ選択, 状態遷移の適用）
//! - **app**: 公開 API（client, builder, service, driver, status）
//! - **config**: QueueConfig

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod queue;

pub use app::{ClientBuilder, QueueStatus, QueuedSiteToSiteClient, SiteToSiteService};
pub use config::QueueConfig;
pub use domain::{DataPacket, QueueError};
