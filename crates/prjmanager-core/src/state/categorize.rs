//! CL Categorizer
//!
//! State 内の CL を 4 つの互いに素な集合に分類します。
//! - **active**: 単独で投票済み（Ok + trigger）の PCL、または進行中の Run が触れている CL
//! - **deps**: active な CL の依存先のうち active でないもの
//! - **unused**: どちらでもない PCL（repartition で捨てられる）
//! - **unloaded**: active / deps として参照されているのに PCL が無い CL
//!
//! 分類そのものはデータを読みに行きません。読み込みは `load_active_into_pcls` が行います。

use crate::domain::{ClId, EngineError, Pcl};
use crate::state::pcls::make_pcl;
use crate::state::{Handler, State};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Categorized {
    pub active: BTreeSet<ClId>,
    pub deps: BTreeSet<ClId>,
    pub unused: BTreeSet<ClId>,
    pub unloaded: BTreeSet<ClId>,
}

impl State {
    pub fn categorize(&self) -> Categorized {
        let mut cat = Categorized::default();
        let add_active = |cat: &mut Categorized, clid: ClId| {
            if cat.active.insert(clid) && self.pcl(clid).is_none() {
                cat.unloaded.insert(clid);
            }
        };
        for r in self.pb.created_runs.iter() {
            for &clid in &r.clids {
                add_active(&mut cat, clid);
            }
        }
        for c in self.pb.components.iter() {
            for r in &c.pruns {
                for &clid in &r.clids {
                    add_active(&mut cat, clid);
                }
            }
        }
        for p in self.pb.pcls.iter() {
            if p.is_standalone_active() {
                cat.active.insert(p.clid);
            }
        }

        for &clid in &cat.active {
            let Some(p) = self.pcl(clid) else { continue };
            for d in &p.deps {
                if cat.active.contains(&d.clid) {
                    continue;
                }
                if cat.deps.insert(d.clid) && self.pcl(d.clid).is_none() {
                    cat.unloaded.insert(d.clid);
                }
            }
        }

        for p in self.pb.pcls.iter() {
            if !cat.active.contains(&p.clid) && !cat.deps.contains(&p.clid) {
                cat.unused.insert(p.clid);
            }
        }
        cat
    }
}

impl Handler {
    /// unloaded な CL を 1 ラウンドだけ読み込み、PCL にする
    ///
    /// 読み込んだ CL が単独で active なら active に昇格し、その依存先を 1 段だけ
    /// deps に加えます（依存先の読み込みは次の pass）。
    /// 戻った時点で active な CL には必ず PCL があります。
    pub(crate) async fn load_active_into_pcls(
        &self,
        s: &mut State,
        cat: &mut Categorized,
    ) -> Result<(), EngineError> {
        if cat.unloaded.is_empty() {
            return Ok(());
        }
        let config = self.load_config(s).await?;
        let ids: Vec<ClId> = cat.unloaded.iter().copied().collect();
        let fetched = self.fetch_cls(&ids).await?;
        let project = s.pb.project.clone();
        let ctx = self.pcl_context(&project, &config);
        let loaded: Vec<Pcl> = ids
            .iter()
            .map(|&clid| make_pcl(clid, fetched.get(&clid).and_then(Option::as_ref), &ctx))
            .collect();

        for p in &loaded {
            cat.unloaded.remove(&p.clid);
            if !cat.active.contains(&p.clid) && p.is_standalone_active() {
                cat.deps.remove(&p.clid);
                cat.active.insert(p.clid);
            }
        }
        for p in &loaded {
            if !cat.active.contains(&p.clid) {
                continue;
            }
            for d in &p.deps {
                if cat.active.contains(&d.clid) || !cat.deps.insert(d.clid) {
                    continue;
                }
                if !cat.unused.remove(&d.clid) && s.pcl(d.clid).is_none() && !loaded.iter().any(|l| l.clid == d.clid) {
                    cat.unloaded.insert(d.clid);
                }
            }
        }
        debug!(
            project = %project,
            loaded = loaded.len(),
            still_unloaded = cat.unloaded.len(),
            "loaded CLs referenced by active CLs"
        );
        s.upsert_pcls(loaded);

        if let Some(&clid) = cat.active.iter().find(|&&c| cat.unloaded.contains(&c)) {
            return Err(EngineError::ActiveClNotLoaded(clid));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Component, RunMode, cow_list};
    use crate::state::testutil::*;

    fn set(ids: &[u64]) -> BTreeSet<ClId> {
        clids(ids).into_iter().collect()
    }

    #[test]
    fn empty_state() {
        let s = State::new(snapshot_with(vec![], vec![]));
        assert_eq!(s.categorize(), Categorized::default());
    }

    #[test]
    fn classifies_active_deps_unused_and_unloaded() {
        // 1 は投票済みで 2 と 9 に依存、3 は投票なし、4 は Run が触れているが未読み込み
        let mut snap = snapshot_with(
            vec![pcl_ok(1).trig(RunMode::DryRun).deps(&[2, 9]), pcl_ok(2), pcl_ok(3)],
            vec![],
        );
        snap.components = cow_list(vec![Component {
            pruns: vec![run_ref(1, &[4])],
            ..component(&[4], false)
        }]);
        let cat = State::new(snap).categorize();
        assert_eq!(cat.active, set(&[1, 4]));
        assert_eq!(cat.deps, set(&[2, 9]));
        assert_eq!(cat.unused, set(&[3]));
        assert_eq!(cat.unloaded, set(&[4, 9]));
    }

    #[test]
    fn created_runs_make_cls_active() {
        let mut snap = snapshot_with(vec![pcl_ok(1), pcl_ok(2).deps(&[1])], vec![]);
        snap.created_runs = cow_list(vec![run_ref(7, &[2])]);
        let cat = State::new(snap).categorize();
        assert_eq!(cat.active, set(&[2]));
        assert_eq!(cat.deps, set(&[1]));
        assert!(cat.unused.is_empty());
        assert!(cat.unloaded.is_empty());
    }

    #[test]
    fn active_dep_is_not_listed_as_dep() {
        let snap = snapshot_with(
            vec![
                pcl_ok(1).trig(RunMode::FullRun).deps(&[2]),
                pcl_ok(2).trig(RunMode::FullRun),
            ],
            vec![],
        );
        let cat = State::new(snap).categorize();
        assert_eq!(cat.active, set(&[1, 2]));
        assert!(cat.deps.is_empty());
    }
}
