//! Per-CL triage.
//!
//! Component 内の各 CL について「Run にできる / purge すべき / 待つ」を決めます。

use crate::domain::{ClError, ClId, Component, EngineError, PclStatus, ProjectView, RunMode, TriggerDraft};
use crate::triager::deps::triage_deps;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ClVerdict {
    /// Run に含められる
    pub ready: bool,
    /// 空でなければ投票を取り消す
    pub purge: Vec<ClError>,
    /// この時刻に評価し直す
    pub wait_until: Option<DateTime<Utc>>,
    pub triggers: Vec<TriggerDraft>,
}

pub(crate) fn triage_cl(
    clid: ClId,
    c: &Component,
    view: &ProjectView,
    now: DateTime<Utc>,
) -> Result<ClVerdict, EngineError> {
    // 未読み込みの依存、投票の無い CL は判断の対象外
    let Some(pcl) = view.pcl(clid) else {
        return Ok(ClVerdict::default());
    };
    let Some(trigger) = pcl.trigger.as_ref() else {
        return Ok(ClVerdict::default());
    };
    if pcl.status != PclStatus::Ok || c.has_run_for(clid) || view.purging_cl(clid).is_some() {
        return Ok(ClVerdict::default());
    }

    let mut reasons = pcl.errors.clone();
    let cg_index = match pcl.config_group_indexes.as_slice() {
        [i] => *i,
        [] => {
            return Err(EngineError::Invariant(format!(
                "{clid} is triggered but matches no config group"
            )));
        }
        many => {
            if !reasons.iter().any(|r| matches!(r, ClError::WatchedByManyConfigGroups { .. })) {
                reasons.push(ClError::WatchedByManyConfigGroups {
                    groups: many
                        .iter()
                        .filter_map(|&i| view.config_group(i).map(|g| g.name.clone()))
                        .collect(),
                });
            }
            return Ok(ClVerdict {
                purge: reasons,
                ..Default::default()
            });
        }
    };
    let cg = view.config_group(cg_index).ok_or_else(|| {
        EngineError::Invariant(format!("{clid} refers to unknown config group {cg_index}"))
    })?;

    let deps = triage_deps(pcl, cg_index, view)?;
    if !deps.invalid.is_empty() {
        // combinable では投票が出揃うまで purge を待つ
        if let Some(combine) = &cg.combine_cls
            && pcl.errors.is_empty()
        {
            let last = deps.last_triggered.map_or(trigger.time, |t| t.max(trigger.time));
            let stable_at = last + combine.stabilization_delay();
            if now < stable_at {
                return Ok(ClVerdict {
                    wait_until: Some(stable_at),
                    ..Default::default()
                });
            }
        }
        reasons.push(ClError::InvalidDeps(deps.invalid));
    }
    if !reasons.is_empty() {
        return Ok(ClVerdict {
            purge: reasons,
            ..Default::default()
        });
    }
    if !deps.not_yet_loaded.is_empty() {
        return Ok(ClVerdict::default());
    }
    if !deps.needs_trigger.is_empty() || !deps.awaiting_submission.is_empty() {
        let triggers = deps
            .needs_trigger
            .iter()
            .map(|&d| TriggerDraft {
                clid: d,
                origin_clid: clid,
                mode: RunMode::FullRun,
            })
            .collect();
        return Ok(ClVerdict {
            triggers,
            ..Default::default()
        });
    }
    Ok(ClVerdict {
        ready: true,
        ..Default::default()
    })
}
