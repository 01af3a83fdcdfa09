//! In-flight CL operations - 投票の取り消し (purge) / 付与 (trigger)
//!
//! どちらも idempotency 用の operation_id と deadline を持ちます。
//! 完了イベントで消えるか、deadline + 猶予を過ぎると期限切れとして消えます。

use crate::domain::cl::{RunMode, Trigger};
use crate::domain::ids::ClId;
use crate::domain::pcl::ClError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgingCl {
    pub clid: ClId,
    pub operation_id: String,
    pub deadline: DateTime<Utc>,
    /// 取り消す対象の投票
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub reasons: Vec<ClError>,
}

impl PurgingCl {
    pub fn new(clid: ClId, deadline: DateTime<Utc>) -> Self {
        Self {
            clid,
            operation_id: format!("{}-{}", deadline.timestamp(), clid.0),
            deadline,
            trigger: None,
            reasons: Vec::new(),
        }
    }

    pub fn with_purged(mut self, trigger: Option<Trigger>, reasons: Vec<ClError>) -> Self {
        self.trigger = trigger;
        self.reasons = reasons;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.deadline + grace < now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggeringCl {
    pub clid: ClId,
    /// 投票を必要としている依存元の CL
    pub origin_clid: ClId,
    pub operation_id: String,
    pub deadline: DateTime<Utc>,
    pub mode: RunMode,
}

impl TriggeringCl {
    pub fn new(clid: ClId, origin_clid: ClId, mode: RunMode, deadline: DateTime<Utc>) -> Self {
        Self {
            clid,
            origin_clid,
            operation_id: format!("{}-{}-{}", deadline.timestamp(), clid.0, origin_clid.0),
            deadline,
            mode,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.deadline + grace < now
    }
}

/// PurgeClTask は purge 実行系に渡す依頼（投票と理由は記録側に載っている）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeClTask {
    pub project: String,
    pub purging: PurgingCl,
}

/// TriggerClTask は trigger 実行系に渡す依頼
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerClTask {
    pub project: String,
    pub triggering: TriggeringCl,
}
