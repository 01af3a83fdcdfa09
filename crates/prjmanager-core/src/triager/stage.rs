//! Run staging.
//!
//! - single-CL の config group: ready な CL ごとに 1 Run
//! - combinable の config group: 依存で繋がった投票済み CL をまとめて 1 Run。
//!   全員が ready で mode が揃い、最後の投票から stabilization_delay が経過したら作る

use crate::domain::{ClId, Component, EngineError, ProjectView, RunDraft, RunMode};
use crate::state::graph::ClGraph;
use crate::triager::cls::ClVerdict;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) fn stage_new_runs(
    c: &Component,
    view: &ProjectView,
    verdicts: &BTreeMap<ClId, ClVerdict>,
    now: DateTime<Utc>,
) -> Result<(Vec<RunDraft>, Option<DateTime<Utc>>), EngineError> {
    let is_ready = |clid: &ClId| verdicts.get(clid).is_some_and(|v| v.ready);
    let mut drafts = Vec::new();
    let mut next: Option<DateTime<Utc>> = None;

    let mut graph = ClGraph::new();
    let mut combinable: BTreeSet<ClId> = BTreeSet::new();
    for &clid in &c.clids {
        let Some(pcl) = view.pcl(clid) else { continue };
        let (Some(mode), [cg_index]) = (pcl.mode(), pcl.config_group_indexes.as_slice()) else {
            continue;
        };
        if pcl.submitted {
            continue;
        }
        let Some(cg) = view.config_group(*cg_index) else { continue };
        if cg.combine_cls.is_some() {
            combinable.insert(clid);
            for d in &pcl.deps {
                if c.contains(d.clid) {
                    graph.add_dependency(clid, d.clid);
                }
            }
        } else if is_ready(&clid) {
            drafts.push(RunDraft {
                config_group_index: *cg_index,
                mode,
                clids: vec![clid],
            });
        }
    }

    for members in graph.connected_components(&combinable) {
        if !members.iter().any(is_ready) || !members.iter().all(is_ready) {
            continue;
        }
        let mut modes: BTreeSet<RunMode> = BTreeSet::new();
        let mut cg_indexes: BTreeSet<usize> = BTreeSet::new();
        let mut last_trigger: Option<DateTime<Utc>> = None;
        for clid in &members {
            let pcl = view
                .pcl(*clid)
                .ok_or_else(|| EngineError::Invariant(format!("ready {clid} has no PCL")))?;
            let trigger = pcl
                .trigger
                .as_ref()
                .ok_or_else(|| EngineError::Invariant(format!("ready {clid} is not triggered")))?;
            modes.insert(trigger.mode);
            cg_indexes.extend(pcl.config_group_indexes.iter().copied());
            last_trigger = Some(last_trigger.map_or(trigger.time, |t| t.max(trigger.time)));
        }
        let (Some(&cg_index), Some(last_trigger)) = (cg_indexes.first(), last_trigger) else {
            continue;
        };
        let delay = view
            .config_group(cg_index)
            .and_then(|g| g.combine_cls.as_ref())
            .map(|cc| cc.stabilization_delay())
            .unwrap_or_default();
        let stable_at = last_trigger + delay;
        if modes.len() != 1 || cg_indexes.len() != 1 || now < stable_at {
            // 投票が揃っていないので Run は作らず、窓が閉じたら評価し直す
            next = Some(next.map_or(stable_at, |n| n.min(stable_at)));
            continue;
        }
        let Some(&mode) = modes.first() else { continue };
        drafts.push(RunDraft {
            config_group_index: cg_index,
            mode,
            clids: members,
        });
    }
    Ok((drafts, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil::*;
    use crate::triager::cls::triage_cl;
    use chrono::Duration;

    fn stage(
        pcls: Vec<crate::domain::Pcl>,
        groups: Vec<crate::domain::ConfigGroup>,
        ids: &[u64],
        now: DateTime<Utc>,
    ) -> (Vec<RunDraft>, Option<DateTime<Utc>>) {
        let snap = snapshot_with(pcls, vec![]);
        let v = view(&snap, groups);
        let c = component(ids, true);
        let verdicts = c
            .clids
            .iter()
            .map(|&clid| (clid, triage_cl(clid, &c, &v, now).unwrap()))
            .collect();
        stage_new_runs(&c, &v, &verdicts, now).unwrap()
    }

    #[test]
    fn single_mode_creates_one_run_per_ready_cl() {
        let (drafts, next) = stage(
            vec![
                pcl_ok(1).trig(RunMode::DryRun).deps(&[2]),
                pcl_ok(2).trig(RunMode::QuickDryRun),
            ],
            vec![group("g0")],
            &[1, 2],
            t0(),
        );
        assert_eq!(
            drafts,
            vec![
                RunDraft { config_group_index: 0, mode: RunMode::DryRun, clids: clids(&[1]) },
                RunDraft { config_group_index: 0, mode: RunMode::QuickDryRun, clids: clids(&[2]) },
            ]
        );
        assert_eq!(next, None);
    }

    #[test]
    fn combinable_group_waits_for_stabilization() {
        let pcls = vec![
            pcl_ok(1).trig(RunMode::FullRun).deps(&[2]),
            pcl_ok(2).trig_at(RunMode::FullRun, t0() + Duration::seconds(30)),
        ];
        let (drafts, next) = stage(pcls.clone(), vec![combinable_group("g0", 60)], &[1, 2], t0() + Duration::seconds(60));
        assert!(drafts.is_empty());
        assert_eq!(next, Some(t0() + Duration::seconds(90)));

        let (drafts, next) = stage(pcls, vec![combinable_group("g0", 60)], &[1, 2], t0() + Duration::seconds(90));
        assert_eq!(
            drafts,
            vec![RunDraft { config_group_index: 0, mode: RunMode::FullRun, clids: clids(&[1, 2]) }]
        );
        assert_eq!(next, None);
    }

    #[test]
    fn combinable_group_with_unready_member_creates_nothing() {
        // 3 は 2 と mode が違うので 2 -> 3 は不正、2 は ready にならない
        let (drafts, _) = stage(
            vec![
                pcl_ok(1).trig(RunMode::DryRun).deps(&[2]),
                pcl_ok(2).trig(RunMode::DryRun).deps(&[3]),
                pcl_ok(3).trig(RunMode::FullRun),
            ],
            vec![combinable_group("g0", 0)],
            &[1, 2, 3],
            t0() + Duration::seconds(1),
        );
        assert!(drafts.is_empty());
    }

    #[test]
    fn submitted_deps_are_not_bundled() {
        let (drafts, _) = stage(
            vec![pcl_ok(1).trig(RunMode::DryRun).deps(&[2]), pcl_ok(2).submitted()],
            vec![combinable_group("g0", 0)],
            &[1, 2],
            t0(),
        );
        assert_eq!(
            drafts,
            vec![RunDraft { config_group_index: 0, mode: RunMode::DryRun, clids: clids(&[1]) }]
        );
    }
}
