//! ProjectSnapshot - プロジェクトごとに永続化される状態
//!
//! # ProjectStatus 遷移図
//! ```text
//! Unspecified ──(設定が有効)──> Started ──(設定が無効/削除, Run 残あり)──> Stopping
//!                                  ^                                          │
//!                                  └────────────(設定が再び有効)───────────────┤
//!                                                                             │ (全 Run 終了)
//!                                                                             v
//!                                                                          Stopped
//! ```
//!
//! # Copy-on-write
//! リスト系のフィールドはすべて `Arc<Vec<Arc<T>>>` です。
//! `ProjectSnapshot::clone()` は Arc の複製だけで済み、変更したリストだけを
//! 新しい Vec に差し替えます。古いスナップショットは決して書き換わりません。

use crate::domain::component::{Component, RunRef};
use crate::domain::operation::{PurgingCl, TriggeringCl};
use crate::domain::pcl::Pcl;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 要素単位で共有されるリスト
pub type CowList<T> = Arc<Vec<Arc<T>>>;

pub fn cow_list<T>(items: Vec<T>) -> CowList<T> {
    Arc::new(items.into_iter().map(Arc::new).collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    #[default]
    Unspecified,
    Started,
    Stopping,
    Stopped,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Unspecified => "UNSPECIFIED",
            ProjectStatus::Started => "STARTED",
            ProjectStatus::Stopping => "STOPPING",
            ProjectStatus::Stopped => "STOPPED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub project: String,
    pub status: ProjectStatus,
    pub config_hash: String,
    #[serde(default)]
    pub config_group_names: Arc<Vec<String>>,
    /// clid の昇順
    #[serde(default)]
    pub pcls: CowList<Pcl>,
    #[serde(default)]
    pub components: CowList<Component>,
    /// まだ Component に取り込まれていない新規 Run
    #[serde(default)]
    pub created_runs: CowList<RunRef>,
    #[serde(default)]
    pub purging_cls: CowList<PurgingCl>,
    #[serde(default)]
    pub triggering_cls: CowList<TriggeringCl>,
    pub next_eval_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub repartition_required: bool,
}

impl ProjectSnapshot {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }

    /// 全リストが同じ Arc を共有しているか（ポインタ比較）
    ///
    /// ハンドラが何も変更しなかったことを確認するのに使います。
    pub fn shares_storage_with(&self, other: &ProjectSnapshot) -> bool {
        self.status == other.status
            && self.config_hash == other.config_hash
            && self.next_eval_time == other.next_eval_time
            && self.repartition_required == other.repartition_required
            && Arc::ptr_eq(&self.config_group_names, &other.config_group_names)
            && Arc::ptr_eq(&self.pcls, &other.pcls)
            && Arc::ptr_eq(&self.components, &other.components)
            && Arc::ptr_eq(&self.created_runs, &other.created_runs)
            && Arc::ptr_eq(&self.purging_cls, &other.purging_cls)
            && Arc::ptr_eq(&self.triggering_cls, &other.triggering_cls)
    }
}

/// LogReason は State を変更した理由（ログ用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogReason {
    ConfigChanged,
    StatusChanged,
    ClsUpdated,
    RunsCreated,
    RunsFinished,
    PurgesCompleted,
    TriggeringClsCompleted,
    PokeRequested,
    PurgeClsScheduled,
    TriggerClsScheduled,
    TriageComponents,
    NextEvalTimeChanged,
}
