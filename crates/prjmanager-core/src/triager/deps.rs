//! Dependency triage.
//!
//! CL の依存先を submitted / 未読み込み / 不正（4 カテゴリ + unwatched）に分けます。

use crate::domain::{ClId, EngineError, InvalidDeps, Pcl, PclStatus, ProjectView, RunMode};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct TriagedDeps {
    /// 依存先の投票のうち最も新しい時刻
    pub last_triggered: Option<DateTime<Utc>>,
    pub submitted: Vec<ClId>,
    pub not_yet_loaded: Vec<ClId>,
    pub invalid: InvalidDeps,
    /// trigger_deps: FULL_RUN の投票を付けに行く依存
    pub needs_trigger: Vec<ClId>,
    /// trigger_deps: 投票済み（または投票中）で submit を待っている依存
    pub awaiting_submission: Vec<ClId>,
}

impl TriagedDeps {
    fn record_trigger(&mut self, at: DateTime<Utc>) {
        self.last_triggered = Some(self.last_triggered.map_or(at, |t| t.max(at)));
    }
}

/// `pcl` は config group `cg_index` に属する投票済みの CL
pub(crate) fn triage_deps(
    pcl: &Pcl,
    cg_index: usize,
    view: &ProjectView,
) -> Result<TriagedDeps, EngineError> {
    let cg = view.config_group(cg_index).ok_or_else(|| {
        EngineError::Invariant(format!("{} refers to unknown config group {cg_index}", pcl.clid))
    })?;
    let mode = pcl.mode();
    let mut out = TriagedDeps::default();

    for dep in &pcl.deps {
        let Some(d) = view.pcl(dep.clid) else {
            out.not_yet_loaded.push(dep.clid);
            continue;
        };
        match d.status {
            PclStatus::Unknown => {
                out.not_yet_loaded.push(dep.clid);
                continue;
            }
            PclStatus::Unwatched | PclStatus::Deleted => {
                out.invalid.unwatched.push(dep.clid);
                continue;
            }
            PclStatus::Ok => {}
        }
        if let Some(t) = &d.trigger {
            out.record_trigger(t.time);
        }
        if d.submitted {
            out.submitted.push(dep.clid);
            continue;
        }
        match d.config_group_indexes.as_slice() {
            [] => {
                return Err(EngineError::Invariant(format!(
                    "{} has OK status but matches no config group",
                    d.clid
                )));
            }
            [i] if *i == cg_index => {}
            _ => {
                out.invalid.wrong_config_group.push(dep.clid);
                continue;
            }
        }

        if cg.combine_cls.is_some() {
            match d.mode() {
                None => out.invalid.combinable_untriggered.push(dep.clid),
                Some(m) if Some(m) == mode => {}
                Some(_) => out.invalid.combinable_mismatched_mode.push(dep.clid),
            }
            continue;
        }
        if mode != Some(RunMode::FullRun) {
            continue;
        }
        if !cg.trigger_deps {
            out.invalid.single_full_deps.push(dep.clid);
        } else if d.mode() == Some(RunMode::FullRun) || view.triggering_cl(dep.clid).is_some() {
            out.awaiting_submission.push(dep.clid);
        } else {
            out.needs_trigger.push(dep.clid);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Pcl, TriggeringCl};
    use crate::state::testutil::*;
    use chrono::Duration;
    use rstest::rstest;

    fn triage(pcls: Vec<Pcl>, groups: Vec<crate::domain::ConfigGroup>) -> TriagedDeps {
        let snap = snapshot_with(pcls, vec![]);
        let v = view(&snap, groups);
        triage_deps(v.pcl(ClId(1)).unwrap(), 0, &v).unwrap()
    }

    #[test]
    fn unloaded_unknown_and_submitted() {
        let d = triage(
            vec![
                pcl_ok(1).trig(RunMode::FullRun).deps(&[2, 3, 4]),
                Pcl::bare(ClId(3), 1, PclStatus::Unknown),
                pcl_ok(4).submitted(),
            ],
            vec![group("g0")],
        );
        assert_eq!(d.not_yet_loaded, clids(&[2, 3]));
        assert_eq!(d.submitted, clids(&[4]));
        assert!(d.invalid.is_empty());
    }

    #[rstest]
    #[case::unwatched(PclStatus::Unwatched)]
    #[case::deleted(PclStatus::Deleted)]
    fn invalid_status_is_unwatched(#[case] status: PclStatus) {
        let d = triage(
            vec![pcl_ok(1).trig(RunMode::DryRun).deps(&[2]), Pcl::bare(ClId(2), 1, status)],
            vec![group("g0")],
        );
        assert_eq!(d.invalid.unwatched, clids(&[2]));
    }

    #[test]
    fn wrong_config_group() {
        let d = triage(
            vec![
                pcl_ok(1).trig(RunMode::DryRun).deps(&[2, 3]),
                pcl_ok(2).group(1),
                Pcl {
                    config_group_indexes: vec![0, 1],
                    ..pcl_ok(3)
                },
            ],
            vec![group("g0"), group("g1")],
        );
        assert_eq!(d.invalid.wrong_config_group, clids(&[2, 3]));
    }

    #[test]
    fn dep_without_config_group_is_invariant_violation() {
        let snap = snapshot_with(
            vec![
                pcl_ok(1).trig(RunMode::DryRun).deps(&[2]),
                Pcl {
                    config_group_indexes: vec![],
                    ..pcl_ok(2)
                },
            ],
            vec![],
        );
        let v = view(&snap, vec![group("g0")]);
        let err = triage_deps(v.pcl(ClId(1)).unwrap(), 0, &v).unwrap_err();
        assert!(matches!(err, EngineError::Invariant(_)));
    }

    #[rstest]
    #[case::dry_run_is_fine(RunMode::DryRun, vec![])]
    #[case::quick_dry_run_is_fine(RunMode::QuickDryRun, vec![])]
    #[case::full_run_needs_submitted_deps(RunMode::FullRun, vec![2])]
    fn single_mode(#[case] mode: RunMode, #[case] expected: Vec<u64>) {
        let d = triage(
            vec![pcl_ok(1).trig(mode).deps(&[2]), pcl_ok(2).trig(RunMode::FullRun)],
            vec![group("g0")],
        );
        assert_eq!(d.invalid.single_full_deps, clids(&expected));
    }

    #[test]
    fn combinable_mode() {
        let later = t0() + Duration::minutes(3);
        let d = triage(
            vec![
                pcl_ok(1).trig(RunMode::FullRun).deps(&[2, 3, 4]),
                pcl_ok(2).trig(RunMode::FullRun),
                pcl_ok(3).trig_at(RunMode::DryRun, later),
                pcl_ok(4),
            ],
            vec![combinable_group("g0", 300)],
        );
        assert_eq!(d.invalid.combinable_mismatched_mode, clids(&[3]));
        assert_eq!(d.invalid.combinable_untriggered, clids(&[4]));
        assert!(d.invalid.single_full_deps.is_empty());
        assert_eq!(d.last_triggered, Some(later));
    }

    #[test]
    fn trigger_deps_asks_for_votes_instead_of_purging() {
        let mut g = group("g0");
        g.trigger_deps = true;
        let mut snap = snapshot_with(
            vec![
                pcl_ok(1).trig(RunMode::FullRun).deps(&[2, 3, 4]),
                pcl_ok(2),
                pcl_ok(3).trig(RunMode::FullRun),
                pcl_ok(4).trig(RunMode::DryRun),
            ],
            vec![],
        );
        snap.triggering_cls = crate::domain::cow_list(vec![TriggeringCl::new(
            ClId(4),
            ClId(1),
            RunMode::FullRun,
            t0(),
        )]);
        let v = view(&snap, vec![g]);
        let d = triage_deps(v.pcl(ClId(1)).unwrap(), 0, &v).unwrap();
        assert!(d.invalid.is_empty());
        assert_eq!(d.needs_trigger, clids(&[2]));
        assert_eq!(d.awaiting_submission, clids(&[3, 4]));
    }
}
