//! EngineConfig - reconciliation engine の設定
//!
//! JSON から読み込めるように、時間はすべて秒またはミリ秒の整数で持ちます。
//! 省略されたフィールドは既定値になります。

use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// triage / Run 作成 / CL 読み込み / 通知の並列数
    pub concurrency: usize,
    pub max_purging_cl_secs: i64,
    pub max_triggering_cl_secs: i64,
    /// deadline を過ぎた操作記録を消すまでの猶予
    pub operation_grace_secs: i64,
    /// これより古い投票は無視する
    pub max_trigger_age_secs: i64,
    /// 次の pass の予約単位
    pub tick_interval_ms: i64,
    pub clock_drift_ms: i64,
    pub max_allowed_deps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            max_purging_cl_secs: 10 * 60,
            max_triggering_cl_secs: 10 * 60,
            operation_grace_secs: 60,
            max_trigger_age_secs: 7 * 24 * 60 * 60,
            tick_interval_ms: 1000,
            clock_drift_ms: 100,
            max_allowed_deps: 240,
        }
    }
}

impl EngineConfig {
    pub fn max_purging_cl_duration(&self) -> Duration {
        Duration::seconds(self.max_purging_cl_secs)
    }

    pub fn max_triggering_cl_duration(&self) -> Duration {
        Duration::seconds(self.max_triggering_cl_secs)
    }

    pub fn operation_grace(&self) -> Duration {
        Duration::seconds(self.operation_grace_secs)
    }

    pub fn max_trigger_age(&self) -> Duration {
        Duration::seconds(self.max_trigger_age_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::milliseconds(self.tick_interval_ms)
    }

    pub fn clock_drift(&self) -> Duration {
        Duration::milliseconds(self.clock_drift_ms)
    }

    /// 値の妥当性を検査し、問題のあるフィールド名を返す
    pub fn invalid_fields(&self) -> Vec<&'static str> {
        let mut bad = Vec::new();
        if self.concurrency == 0 {
            bad.push("concurrency");
        }
        if self.tick_interval_ms <= 0 {
            bad.push("tick_interval_ms");
        }
        if self.clock_drift_ms < 0 {
            bad.push("clock_drift_ms");
        }
        if self.max_purging_cl_secs <= 0 {
            bad.push("max_purging_cl_secs");
        }
        if self.max_triggering_cl_secs <= 0 {
            bad.push("max_triggering_cl_secs");
        }
        if self.operation_grace_secs < 0 {
            bad.push("operation_grace_secs");
        }
        bad
    }
}
