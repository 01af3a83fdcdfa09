//! Domain identifiers (strongly-typed IDs).
//!
//! # 2 種類の ID
//! - **ClId**: コードレビュー側が採番する CL の数値 ID（外部から与えられる）
//! - **RunId**: Project Manager が Run 作成時に採番する ULID ベースの ID
//!
//! ## ULID の特性
//! - **時刻でソート可能**: Component 内の Run 参照は ID 順に並べて保持する
//! - **分散生成可能**: 調整なしで複数ノードで生成できる
//!
//! ## Phantom Type パターン
//! `Id<T>` というジェネリック型で共通実装を提供しつつ、
//! `T` はコンパイル時の型安全性のためだけに使うマーカー型です。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// ClId はプロジェクト横断で一意な CL の ID
///
/// PCL・Component はこの ID の昇順で並べて保持します。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClId(pub u64);

impl fmt::Display for ClId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cl-{}", self.0)
    }
}

impl From<u64> for ClId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"run-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
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

/// Run のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Identifier of a Run (verification execution over one or more CLs).
pub type RunId = Id<Run>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_sort_by_timestamp() {
        let a = RunId::from_ulid(Ulid::from_parts(1, 0));
        let b = RunId::from_ulid(Ulid::from_parts(2, 0));
        assert!(a < b);
        assert!(a.to_string().starts_with("run-"));
    }

    #[test]
    fn ids_serialize_transparently() {
        let clid = ClId(42);
        assert_eq!(serde_json::to_string(&clid).unwrap(), "42");

        let run = RunId::from_ulid(Ulid::from_parts(7, 9));
        let json = serde_json::to_string(&run).unwrap();
        assert_eq!(json, format!("\"{}\"", run.as_ulid()));
        let back: RunId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<RunId>(), size_of::<Ulid>());
    }

    #[test]
    fn clid_display() {
        assert_eq!(ClId(101).to_string(), "cl-101");
    }
}
