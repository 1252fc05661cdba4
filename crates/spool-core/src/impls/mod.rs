//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **RecordTable**: ストア実装が共有するインメモリ索引（順序付け・集計・状態遷移の検証）
//! - **InMemoryPacketStore**: 開発・テスト用のストア
//! - **FilePacketStore**: snapshot + journal による永続ストア
//! - **StoreLock**: ストアディレクトリの排他ロック（1 ディレクトリ 1 インスタンス）
//! - **JsonLinesSender**: ファイルに書き出すローカルの送信先

pub mod file_store;
pub mod inmem_store;
pub mod journal;
pub mod json_lines_sender;
pub mod record_table;
pub mod store_lock;

// 主要な型を再エクスポート
pub use self::file_store::{FilePacketStore, FileStoreOptions};
pub use self::inmem_store::InMemoryPacketStore;
pub use self::json_lines_sender::JsonLinesSender;
pub use self::record_table::RecordTable;
pub use self::store_lock::StoreLock;
