//! prjmanager-core
//!
//! Per-project reconciliation engine for a code-review verification service.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, CL, PCL, Component, 操作記録, ProjectSnapshot, events, errors）
//! - **ports**: 抽象化レイヤー（ClStore, ConfigSource, RunSubsystem, ClPurger/ClTriggerer, Scheduler, など）
//! - **state**: エンジン本体（分類, repartition, triage と実行, 副作用, イベントハンドラ）
//! - **triager**: 既定の Component triage
//! - **app**: アプリケーション層（ProjectManager, builder, EngineConfig）
//! - **impls**: 実装（in-memory の開発用・テスト用 port 実装）
//! - **observability**: プロジェクト状態の集計

pub mod domain;
pub mod ports;
pub mod state;
pub mod triager;
pub mod app;
pub mod impls;
pub mod observability;
