//! Component Partitioner (repartition)
//!
//! active ∪ deps の CL をノード、依存辺を無向辺として連結成分を求め、
//! Component のリストを作り直します。
//!
//! # 手順
//! 1. unused な PCL を捨てる（GC）
//! 2. 依存辺と、進行中の Run が跨ぐ CL 同士の辺でグラフを作る
//!    （1 つの Run が 2 つの Component に跨る場合は強制的にマージされる）
//! 3. 連結成分ごとに Component を作る
//! 4. 以前の Component と CL 集合も Run も同じなら、その Component をそのまま使う。
//!    それ以外（分割・統合・縮小・新規 Run）は triage_required にする

use crate::domain::{ClId, Component, RunId, RunRef};
use crate::state::graph::ClGraph;
use crate::state::{Categorized, State, component_index, cow};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

impl State {
    pub fn repartition(&mut self, cat: &Categorized) {
        if !cat.unused.is_empty()
            && let Some(pcls) = cow::remove_where(&self.pb.pcls, |p| cat.unused.contains(&p.clid))
        {
            self.set_pcls(pcls);
        }

        let nodes: BTreeSet<ClId> = cat.active.union(&cat.deps).copied().collect();
        let mut graph = ClGraph::new();
        for &clid in &nodes {
            if let Some(p) = self.pcl(clid) {
                for d in &p.deps {
                    if nodes.contains(&d.clid) {
                        graph.add_dependency(clid, d.clid);
                    }
                }
            }
        }

        let old_components = self.pb.components.clone();
        let mut runs: BTreeMap<RunId, RunRef> = BTreeMap::new();
        for c in old_components.iter() {
            for r in &c.pruns {
                runs.insert(r.id, r.clone());
            }
        }
        let created: HashSet<RunId> = self.pb.created_runs.iter().map(|r| r.id).collect();
        for r in self.pb.created_runs.iter() {
            runs.insert(r.id, r.as_ref().clone());
        }
        for r in runs.values() {
            for pair in r.clids.windows(2) {
                graph.add_dependency(pair[0], pair[1]);
            }
        }

        let groups = graph.connected_components(&nodes);
        let group_of: HashMap<ClId, usize> = groups
            .iter()
            .enumerate()
            .flat_map(|(i, g)| g.iter().map(move |&c| (c, i)))
            .collect();
        let mut pruns_by_group: Vec<Vec<RunRef>> = vec![Vec::new(); groups.len()];
        for r in runs.into_values() {
            if let Some(&gi) = r.clids.first().and_then(|c| group_of.get(c)) {
                // runs は RunId 順に取り出しているので並びは保たれる
                pruns_by_group[gi].push(r);
            }
        }

        let old_index = component_index(&old_components);
        let mut components = Vec::with_capacity(groups.len());
        for (clids, pruns) in groups.into_iter().zip(pruns_by_group) {
            let overlapping: BTreeSet<usize> = clids.iter().filter_map(|c| old_index.get(c).copied()).collect();
            let touched_by_new_run = pruns.iter().any(|r| created.contains(&r.id));
            let reusable = match (overlapping.len(), overlapping.first()) {
                (1, Some(&i)) if !touched_by_new_run => {
                    let old = &old_components[i];
                    (old.clids == clids && old.pruns == pruns).then(|| Arc::clone(old))
                }
                _ => None,
            };
            components.push(reusable.unwrap_or_else(|| {
                Arc::new(Component {
                    clids,
                    pruns,
                    triage_required: true,
                    decision_time: None,
                })
            }));
        }

        let index = component_index(&components);
        self.set_components(Arc::new(components), Some(index));
        if !self.pb.created_runs.is_empty() {
            self.pb.created_runs = Arc::default();
        }
        self.pb.repartition_required = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunMode, cow_list};
    use crate::state::testutil::*;

    fn repartitioned(pcls: Vec<crate::domain::Pcl>, components: Vec<Component>, created: Vec<RunRef>) -> (State, State) {
        let mut snap = snapshot_with(pcls, components);
        snap.created_runs = cow_list(created);
        snap.repartition_required = true;
        let mut s0 = State::new(snap);
        let mut s1 = s0.clone_shallow(&[]).unwrap();
        let cat = s1.categorize();
        s1.repartition(&cat);
        (s0, s1)
    }

    fn shape(s: &State) -> Vec<(Vec<ClId>, bool)> {
        s.snapshot()
            .components
            .iter()
            .map(|c| (c.clids.clone(), c.triage_required))
            .collect()
    }

    #[test]
    fn totally_empty() {
        let (_, s1) = repartitioned(vec![], vec![], vec![]);
        assert!(s1.snapshot().components.is_empty());
        assert!(!s1.snapshot().repartition_required);
    }

    #[test]
    fn unchanged_component_is_reused() {
        let (s0, s1) = repartitioned(
            vec![pcl_ok(1).trig(RunMode::DryRun)],
            vec![component(&[1], false)],
            vec![],
        );
        assert_eq!(shape(&s1), vec![(clids(&[1]), false)]);
        assert!(Arc::ptr_eq(&s0.snapshot().components[0], &s1.snapshot().components[0]));
    }

    #[test]
    fn unused_pcls_are_collected() {
        let (_, s1) = repartitioned(
            vec![pcl_ok(1).trig(RunMode::DryRun), pcl_ok(2), pcl_ok(3)],
            vec![component(&[1], false), component(&[3], false)],
            vec![],
        );
        let ids: Vec<ClId> = s1.snapshot().pcls.iter().map(|p| p.clid).collect();
        assert_eq!(ids, clids(&[1]));
        assert_eq!(shape(&s1), vec![(clids(&[1]), false)]);
    }

    #[test]
    fn shrunk_component_becomes_dirty() {
        // 2 の投票が外れたので {1,2} は {1} に縮む
        let (_, s1) = repartitioned(
            vec![pcl_ok(1).trig(RunMode::DryRun), pcl_ok(2)],
            vec![component(&[1, 2], false)],
            vec![],
        );
        assert_eq!(shape(&s1), vec![(clids(&[1]), true)]);
    }

    #[test]
    fn new_components_are_dirty() {
        let (_, s1) = repartitioned(
            vec![pcl_ok(1).trig(RunMode::DryRun), pcl_ok(2).trig(RunMode::DryRun).deps(&[3]), pcl_ok(3)],
            vec![],
            vec![],
        );
        assert_eq!(shape(&s1), vec![(clids(&[1]), true), (clids(&[2, 3]), true)]);
    }

    #[test]
    fn crossing_over() {
        // {1,2},{3,4} => {1,3},{2,4}
        let (_, s1) = repartitioned(
            vec![
                pcl_ok(1).trig(RunMode::DryRun).deps(&[3]),
                pcl_ok(2).trig(RunMode::DryRun),
                pcl_ok(3).trig(RunMode::DryRun),
                pcl_ok(4).trig(RunMode::DryRun).deps(&[2]),
            ],
            vec![component(&[1, 2], false), component(&[3, 4], false)],
            vec![],
        );
        assert_eq!(shape(&s1), vec![(clids(&[1, 3]), true), (clids(&[2, 4]), true)]);
    }

    #[test]
    fn created_runs_are_moved_into_components() {
        let (_, s1) = repartitioned(
            vec![pcl_ok(1).trig(RunMode::DryRun), pcl_ok(2).trig(RunMode::DryRun)],
            vec![component(&[1], false), component(&[2], false)],
            vec![run_ref(5, &[2]), run_ref(3, &[2])],
        );
        let comps = &s1.snapshot().components;
        assert_eq!(shape(&s1), vec![(clids(&[1]), false), (clids(&[2]), true)]);
        assert_eq!(comps[1].pruns, vec![run_ref(3, &[2]), run_ref(5, &[2])]);
        assert!(s1.snapshot().created_runs.is_empty());
    }

    #[test]
    fn run_spanning_two_components_forces_merge() {
        let c1 = Component {
            pruns: vec![run_ref(1, &[1])],
            ..component(&[1], false)
        };
        let c2 = Component {
            pruns: vec![run_ref(2, &[2])],
            ..component(&[2], false)
        };
        let (_, s1) = repartitioned(vec![pcl_ok(1), pcl_ok(2)], vec![c1, c2], vec![run_ref(12, &[1, 2])]);
        let comps = &s1.snapshot().components;
        assert_eq!(shape(&s1), vec![(clids(&[1, 2]), true)]);
        assert_eq!(
            comps[0].pruns,
            vec![run_ref(1, &[1]), run_ref(2, &[2]), run_ref(12, &[1, 2])]
        );
    }

    #[test]
    fn components_with_unrelated_run_merge_with_deps() {
        // {A,B} と {C}、C と B に跨る Run で 1 つになる
        let (_, s1) = repartitioned(
            vec![
                pcl_ok(1).trig(RunMode::DryRun).deps(&[2]),
                pcl_ok(2),
                pcl_ok(3).trig(RunMode::DryRun),
            ],
            vec![component(&[1, 2], false), component(&[3], false)],
            vec![run_ref(9, &[1, 3])],
        );
        assert_eq!(shape(&s1), vec![(clids(&[1, 2, 3]), true)]);
    }

    #[test]
    fn old_state_is_untouched() {
        let (s0, s1) = repartitioned(
            vec![pcl_ok(1).trig(RunMode::DryRun), pcl_ok(2)],
            vec![component(&[1, 2], false)],
            vec![run_ref(4, &[1])],
        );
        assert_eq!(s0.snapshot().pcls.len(), 2);
        assert_eq!(s0.snapshot().created_runs.len(), 1);
        assert!(s0.snapshot().repartition_required);
        assert_eq!(s1.snapshot().pcls.len(), 1);
    }

    #[test]
    fn partition_invariant_holds() {
        let (_, s1) = repartitioned(
            vec![
                pcl_ok(1).trig(RunMode::DryRun).deps(&[2]),
                pcl_ok(2).deps(&[5]),
                pcl_ok(3).trig(RunMode::FullRun).deps(&[2, 4]),
                pcl_ok(4),
                pcl_ok(6).trig(RunMode::DryRun),
            ],
            vec![],
            vec![],
        );
        let cat = s1.categorize();
        let comps = &s1.snapshot().components;
        for clid in cat.active.iter().chain(cat.deps.iter()) {
            let owners = comps.iter().filter(|c| c.contains(*clid)).count();
            assert_eq!(owners, 1, "{clid} must belong to exactly one component");
        }
        for c in comps.iter() {
            for clid in &c.clids {
                if let Some(p) = s1.pcl(*clid) {
                    for d in &p.deps {
                        if cat.active.contains(&d.clid) || cat.deps.contains(&d.clid) {
                            assert!(c.contains(d.clid));
                        }
                    }
                }
            }
        }
        assert_eq!(comps.len(), 2);
    }
}
