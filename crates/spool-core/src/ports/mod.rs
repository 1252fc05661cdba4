//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部（永続化, 転送プロトコル, 時刻, アプリ固有ポリシー）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! - PacketStore がキューの正本
//! - TransactionSender は不透明な送信 capability
//! - DataPacketPrioritizer は呼び出し側が差し込むポリシー

pub mod clock;
pub mod id_generator;
pub mod packet_store;
pub mod prioritizer;
pub mod transaction_sender;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::packet_store::PacketStore;
pub use self::prioritizer::{AttributePrioritizer, DataPacketPrioritizer, NoOpPrioritizer};
pub use self::transaction_sender::{TransactionSender, TransferError};
