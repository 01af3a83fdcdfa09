use crate::domain::{ProjectSnapshot, ProjectStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// ProjectCounts はプロジェクト状態の集計（ログ・ダッシュボード用）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCounts {
    pub status: ProjectStatus,
    pub pcls: usize,
    pub triggered_pcls: usize,
    pub components: usize,
    pub components_awaiting_triage: usize,
    pub incomplete_runs: usize,
    pub purging_cls: usize,
    pub triggering_cls: usize,
    pub next_eval_time: Option<DateTime<Utc>>,
}

impl ProjectCounts {
    pub fn from_snapshot(s: &ProjectSnapshot) -> Self {
        let runs: BTreeSet<_> = s
            .components
            .iter()
            .flat_map(|c| c.pruns.iter().map(|r| r.id))
            .chain(s.created_runs.iter().map(|r| r.id))
            .collect();
        Self {
            status: s.status,
            pcls: s.pcls.len(),
            triggered_pcls: s.pcls.iter().filter(|p| p.trigger.is_some()).count(),
            components: s.components.len(),
            components_awaiting_triage: s.components.iter().filter(|c| c.triage_required).count(),
            incomplete_runs: runs.len(),
            purging_cls: s.purging_cls.len(),
            triggering_cls: s.triggering_cls.len(),
            next_eval_time: s.next_eval_time,
        }
    }
}
