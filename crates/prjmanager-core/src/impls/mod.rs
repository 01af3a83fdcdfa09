//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の in-memory 実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryClStore**: CL ストア
//! - **InMemoryConfigSource**: 設定の履歴
//! - **FakeRunSubsystem**: 呼び出しを記録する Run サブシステム
//! - **RecordingPurger / RecordingTriggerer**: 投票変更の依頼を記録
//! - **InMemoryScheduler**: (project, eta) で重複を除く pass 予約
//! - **SequentialIdGenerator**: テスト用の連番 Run ID
//! - **InMemorySnapshotStore**: ProjectSnapshot の保存先

pub mod cl_store;
pub mod config_source;
pub mod runs;
pub mod cl_mutator;
pub mod scheduler;
pub mod id_generator;
pub mod snapshot_store;

pub use self::cl_store::InMemoryClStore;
pub use self::config_source::InMemoryConfigSource;
pub use self::runs::{FakeRunSubsystem, RunCall};
pub use self::cl_mutator::{RecordingPurger, RecordingTriggerer};
pub use self::scheduler::InMemoryScheduler;
pub use self::id_generator::SequentialIdGenerator;
pub use self::snapshot_store::InMemorySnapshotStore;
