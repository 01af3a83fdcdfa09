//! Triager - 標準の Component triage
//!
//! # 手順
//! 1. **cls**: Component 内の CL ごとに ready / purge / wait を決める
//! 2. **stage**: ready な CL から作るべき Run を組み立てる
//! 3. 最も早い再評価時刻を新しい Component の decision_time にする
//!
//! 副作用は持たず、結果は TriageDecision として返します。

mod cls;
mod deps;
mod stage;

use crate::domain::{
    ClId, Component, EngineError, ProjectView, PurgeDraft, TriageDecision, TriggerDraft,
};
use crate::ports::ComponentTriage;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// DefaultTriager は config group の設定に従って CL を Run にまとめる
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTriager;

impl ComponentTriage for DefaultTriager {
    fn triage(
        &self,
        component: &Component,
        view: &ProjectView,
        now: DateTime<Utc>,
    ) -> Result<TriageDecision, EngineError> {
        let mut verdicts = BTreeMap::new();
        for &clid in &component.clids {
            verdicts.insert(clid, cls::triage_cl(clid, component, view, now)?);
        }

        let mut next: Option<DateTime<Utc>> = None;
        let mut cls_to_purge = Vec::new();
        let mut cls_to_trigger: Vec<TriggerDraft> = Vec::new();
        let mut trigger_targets: BTreeSet<ClId> = BTreeSet::new();
        for (&clid, v) in &verdicts {
            if let Some(t) = v.wait_until {
                next = Some(next.map_or(t, |n| n.min(t)));
            }
            if !v.purge.is_empty() {
                cls_to_purge.push(PurgeDraft {
                    clid,
                    reasons: v.purge.clone(),
                });
            }
            // 同じ依存を複数の CL が必要としても投票は 1 回
            for t in &v.triggers {
                if trigger_targets.insert(t.clid) {
                    cls_to_trigger.push(t.clone());
                }
            }
        }

        let (runs_to_create, staged_next) = stage::stage_new_runs(component, view, &verdicts, now)?;
        if let Some(t) = staged_next {
            next = Some(next.map_or(t, |n| n.min(t)));
        }

        let new_value = Arc::new(Component {
            triage_required: false,
            decision_time: next,
            ..component.clone()
        });
        Ok(TriageDecision {
            new_value: Some(new_value),
            runs_to_create,
            cls_to_purge,
            cls_to_trigger,
        })
    }
}
