//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部コラボレーター（CL ストア、設定、Run サブシステム、
//! purge/trigger 実行系、タスクスケジューラ、スナップショットの保存先）へのインターフェースです。
//!
//! # 設計原則
//! - State の正本は呼び出し側のトランザクションで保存される
//! - 副作用（通知・予約）はコミット後に実行され、operation_id で冪等にする

pub mod clock;
pub mod id_generator;
pub mod cl_store;
pub mod config_source;
pub mod run_subsystem;
pub mod cl_mutator;
pub mod scheduler;
pub mod triage;
pub mod snapshot_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{DigestIdGenerator, IdGenerator};
pub use self::cl_store::ClStore;
pub use self::config_source::ConfigSource;
pub use self::run_subsystem::RunSubsystem;
pub use self::cl_mutator::{ClPurger, ClTriggerer};
pub use self::scheduler::Scheduler;
pub use self::triage::ComponentTriage;
pub use self::snapshot_store::SnapshotStore;
