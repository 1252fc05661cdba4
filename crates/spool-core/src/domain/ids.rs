//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID
//! - `BatchId`: 送信トランザクション 1 回ごとの ID（sender 側の冪等トークン）
//! - `StoreId`: 永続ストアの識別子（snapshot に保存され、ログのフィールドに使う）
//!
//! `Sequence` だけは ULID ではなく単調増加の `u64`。順序付け（同一優先度内の FIFO）に使うため、
//! ストアの寿命を通して一意かつ厳密に増加する必要がある。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"batch-", "store-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// `T` は PhantomData で、実行時にはメモリを消費しませんが、
/// コンパイル時に型安全性を提供します（`BatchId` と `StoreId` は混同できない）。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Batch {}

impl IdMarker for Batch {
    fn prefix() -> &'static str {
        "batch-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Store {}

impl IdMarker for Store {
    fn prefix() -> &'static str {
        "store-"
    }
}

/// Identifier of one transmission attempt (one batch, one transaction).
pub type BatchId = Id<Batch>;

/// Identifier of a durable packet store.
pub type StoreId = Id<Store>;

/// Insertion index of a queued record.
///
/// Assigned by the store, starting at 1. Never reused, even after the record is purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(u64);

impl Sequence {
    pub const FIRST: Sequence = Sequence(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let batch = BatchId::from_ulid(Ulid::new());
        let store = StoreId::from_ulid(Ulid::new());

        assert!(batch.to_string().starts_with("batch-"));
        assert!(store.to_string().starts_with("store-"));
        // let _: BatchId = store; // <- does not compile
    }

    #[test]
    fn ids_serialize_as_plain_ulid() {
        let ulid = Ulid::new();
        let id = BatchId::from_ulid(ulid);

        let serialized = serde_json::to_string(&id).unwrap();
        assert_eq!(serialized, format!("\"{ulid}\""));

        let deserialized: BatchId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(id, deserialized);
    }

    #[test]
    fn sequences_are_ordered() {
        let first = Sequence::FIRST;
        let second = first.next();
        assert!(first < second);
        assert_eq!(second.get(), 2);
        assert_eq!(second.to_string(), "#2");
    }
}
