//! Domain - ドメインモデル
//!
//! # モジュール構成
//! - **ids**: ClId, RunId
//! - **cl**: CL ストアから受け取る CL スナップショット
//! - **config**: プロジェクト設定のメタ情報と config group
//! - **pcl**: プロジェクトから見た CL (PCL) と投票取り消し理由
//! - **component**: 依存グラフの連結成分
//! - **operation**: 進行中の purge / trigger 操作
//! - **run**: Run 作成依頼
//! - **state**: 永続化されるプロジェクト状態
//! - **decision**: Component triage の結果
//! - **view**: triage 用の読み取り専用ビュー
//! - **events**: mailbox に届くイベント
//! - **errors**: エラー型と分類

pub mod ids;
pub mod cl;
pub mod config;
pub mod pcl;
pub mod component;
pub mod operation;
pub mod run;
pub mod state;
pub mod decision;
pub mod view;
pub mod events;
pub mod errors;

pub use ids::{ClId, RunId};
pub use cl::{ChangeStatus, ClSnapshot, Changelist, Dep, DepKind, RunMode, Trigger};
pub use config::{CombineCls, ConfigGroup, ConfigMeta, ConfigStatus};
pub use pcl::{ClError, InvalidDeps, Pcl, PclStatus};
pub use component::{Component, RunRef};
pub use operation::{PurgeClTask, PurgingCl, TriggerClTask, TriggeringCl};
pub use run::{RunCl, RunKey, RunSpec};
pub use state::{CowList, LogReason, ProjectSnapshot, ProjectStatus, cow_list};
pub use decision::{PurgeDraft, RunDraft, TriageDecision, TriggerDraft};
pub use view::ProjectView;
pub use events::{ClUpdate, Event};
pub use errors::{EngineError, ErrorKind, PortError};
