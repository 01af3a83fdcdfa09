//! Events - プロジェクトの mailbox に届くイベント
//!
//! 外部のディスパッチ層が 1 プロジェクト分のイベントをまとめて
//! `ProjectManager::process` に渡します。

use crate::domain::component::RunRef;
use crate::domain::ids::{ClId, RunId};
use serde::{Deserialize, Serialize};

/// ClUpdate は CL ストアで CL が更新されたことの通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClUpdate {
    pub clid: ClId,
    pub eversion: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// 設定が更新された（可能性がある）
    UpdateConfig,
    /// 定期的な健全性チェック
    Poke,
    ClsUpdated { cls: Vec<ClUpdate> },
    RunsCreated { runs: Vec<RunRef> },
    RunsFinished { run_ids: Vec<RunId> },
    PurgesCompleted { operation_ids: Vec<String> },
    TriggeringClsCompleted {
        #[serde(default)]
        succeeded: Vec<String>,
        #[serde(default)]
        failed: Vec<String>,
        #[serde(default)]
        skipped: Vec<String>,
    },
}
