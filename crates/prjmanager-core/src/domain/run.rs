//! RunSpec - Run サブシステムに渡す Run 作成依頼

use crate::domain::cl::{RunMode, Trigger};
use crate::domain::ids::{ClId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// RunCl は Run に含める CL（作成時点の版数付き）
///
/// Run サブシステムは eversion が古くなっていれば作成を拒否できます。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCl {
    pub clid: ClId,
    pub eversion: u64,
    pub trigger: Trigger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSpec {
    pub id: RunId,
    pub project: String,
    pub config_group_index: usize,
    pub config_group_name: String,
    pub mode: RunMode,
    pub cls: Vec<RunCl>,
    pub created_at: DateTime<Utc>,
}

impl RunSpec {
    pub fn clids(&self) -> Vec<ClId> {
        let mut ids: Vec<ClId> = self.cls.iter().map(|c| c.clid).collect();
        ids.sort();
        ids
    }
}

/// RunKey は Run ID を決める入力
///
/// 同じプロジェクト・config group・mode で、同じ CL を同じ版数と投票で
/// 検証する Run は同じ ID になります。CL の並びは問いません。
#[derive(Debug, Clone, Copy)]
pub struct RunKey<'a> {
    pub project: &'a str,
    pub config_group_name: &'a str,
    pub mode: RunMode,
    pub cls: &'a [RunCl],
}

impl RunKey<'_> {
    pub fn digest(&self) -> [u8; 32] {
        let mut cls: Vec<&RunCl> = self.cls.iter().collect();
        cls.sort_by_key(|c| c.clid);
        let mut h = Sha256::new();
        h.update(self.project.as_bytes());
        h.update([0]);
        h.update(self.config_group_name.as_bytes());
        h.update([0]);
        h.update(self.mode.to_string().as_bytes());
        for c in cls {
            h.update([0]);
            h.update(c.clid.0.to_be_bytes());
            h.update(c.eversion.to_be_bytes());
            h.update(c.trigger.time.timestamp_micros().to_be_bytes());
            h.update(c.trigger.account_id.to_be_bytes());
            h.update(c.trigger.mode.to_string().as_bytes());
        }
        h.finalize().into()
    }

    /// 最後に付いた投票の時刻
    pub fn latest_trigger_time(&self) -> Option<DateTime<Utc>> {
        self.cls.iter().map(|c| c.trigger.time).max()
    }
}
