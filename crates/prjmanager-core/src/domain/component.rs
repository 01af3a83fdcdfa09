//! Component - 依存グラフの連結成分（triage の単位）
//!
//! # 不変条件
//! - active な CL はちょうど 1 つの Component に属する
//! - `clids` と `pruns` はそれぞれ clid / Run ID の昇順

use crate::domain::ids::{ClId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// RunRef は進行中の Run（ID + 対象 CL）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRef {
    pub id: RunId,
    pub clids: Vec<ClId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub clids: Vec<ClId>,
    #[serde(default)]
    pub pruns: Vec<RunRef>,
    /// 次の triage で必ず評価し直す
    #[serde(default)]
    pub triage_required: bool,
    /// この時刻を過ぎたら評価し直す
    #[serde(default)]
    pub decision_time: Option<DateTime<Utc>>,
}

impl Component {
    pub fn needs_triage(&self, now: DateTime<Utc>) -> bool {
        self.triage_required || self.decision_time.is_some_and(|t| t <= now)
    }

    pub fn contains(&self, clid: ClId) -> bool {
        self.clids.binary_search(&clid).is_ok()
    }

    /// clid に触れている進行中の Run があるか
    pub fn has_run_for(&self, clid: ClId) -> bool {
        self.pruns.iter().any(|r| r.clids.contains(&clid))
    }

    /// ログ用の短い表記（例: "cl-1+3"）
    pub fn label(&self) -> String {
        match self.clids.split_first() {
            None => "empty".to_string(),
            Some((first, rest)) => {
                let mut s = first.to_string();
                for c in rest {
                    s.push('+');
                    s.push_str(&c.0.to_string());
                }
                s
            }
        }
    }
}
