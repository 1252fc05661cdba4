//! App - アプリケーション層
//!
//! engine / store / sender を組み合わせて、呼び出し側に見せる API を提供します。
//!
//! # 主要コンポーネント
//! - **QueuedSiteToSiteClient**: enqueue / process / cleanup / status（同期・スレッドセーフ）
//! - **ClientBuilder**: 設定検証とワイヤリング
//! - **SiteToSiteService**: tokio 上の async ラッパー
//! - **Driver**: process / cleanup の定期実行
//! - **QueueStatus**: 状態スナップショット

pub mod builder;
pub mod client;
pub mod driver;
pub mod service;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::ClientBuilder;
pub use self::client::QueuedSiteToSiteClient;
pub use self::driver::{Driver, DriverIntervals};
pub use self::service::{ServiceError, SiteToSiteService};
pub use self::status::QueueStatus;
