//! CL snapshot model - CL ストアから受け取るデータ
//!
//! ここにある型は外部（CL ストア・poller）が所有するデータの写しです。
//! Project Manager はこれを読み取り、プロジェクト固有の PCL に変換します。

use crate::domain::ids::ClId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// RunMode は Trigger が要求する検証の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMode {
    /// 検証のみ
    DryRun,
    /// 検証してから submit
    FullRun,
    /// 軽量な検証のみ
    QuickDryRun,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunMode::DryRun => "DRY_RUN",
            RunMode::FullRun => "FULL_RUN",
            RunMode::QuickDryRun => "QUICK_DRY_RUN",
        };
        f.write_str(s)
    }
}

/// Trigger は CL に付いた検証要求の投票
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub email: String,
    pub account_id: u64,
    pub mode: RunMode,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepKind {
    /// 親 CL（同じ git 履歴上の依存）
    Hard,
    /// CL 記述中の Cq-Depend などによる依存
    Soft,
}

/// Dep は依存辺（依存先の CL ID + 種類）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dep {
    pub clid: ClId,
    pub kind: DepKind,
}

impl Dep {
    pub fn hard(clid: impl Into<ClId>) -> Self {
        Self {
            clid: clid.into(),
            kind: DepKind::Hard,
        }
    }

    pub fn soft(clid: impl Into<ClId>) -> Self {
        Self {
            clid: clid.into(),
            kind: DepKind::Soft,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeStatus {
    New,
    Abandoned,
    Merged,
}

/// ClSnapshot はある時点での CL の中身
///
/// `project` は「どのプロジェクトのために取得したスナップショットか」を表します。
/// 別プロジェクト向けのスナップショットは、このプロジェクト向けに取り直すまで使えません。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClSnapshot {
    pub project: String,
    pub repo: String,
    pub git_ref: String,
    pub status: ChangeStatus,
    pub owner_email: Option<String>,
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub deps: Vec<Dep>,
}

/// Changelist は CL ストアが返すレコード
///
/// # フィールド
/// - `eversion`: 更新のたびに増える版数（重複イベントの除去に使う）
/// - `watched_by`: この CL を監視しているプロジェクト（設定から導出）
/// - `snapshot`: まだ取得していない、またはアクセスできない場合は None
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changelist {
    pub id: ClId,
    pub eversion: u64,
    #[serde(default)]
    pub watched_by: Vec<String>,
    pub snapshot: Option<ClSnapshot>,
}
