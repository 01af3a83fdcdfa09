//! CL dependency graph.
//!
//! Design:
//! - Forward edges: CL -> CLs it depends on
//! - Reverse edges: CL -> CLs that depend on it
//! - Invariant: edges and reverse_edges must be kept in sync
//!
//! 連結成分は辺の向きを無視して求めます。

use crate::domain::ClId;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

#[derive(Debug, Default)]
pub struct ClGraph {
    /// Forward edges: CL -> CLs it depends on
    edges: HashMap<ClId, HashSet<ClId>>,
    /// Reverse edges: CL -> CLs that depend on it
    reverse_edges: HashMap<ClId, HashSet<ClId>>,
}

impl ClGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `cl` depends on `depends_on`.
    pub fn add_dependency(&mut self, cl: ClId, depends_on: ClId) {
        if cl == depends_on {
            return;
        }
        self.edges.entry(cl).or_default().insert(depends_on);
        self.reverse_edges.entry(depends_on).or_default().insert(cl);
    }

    pub fn dependencies(&self, cl: ClId) -> impl Iterator<Item = ClId> + '_ {
        self.edges.get(&cl).into_iter().flatten().copied()
    }

    pub fn dependents(&self, cl: ClId) -> impl Iterator<Item = ClId> + '_ {
        self.reverse_edges.get(&cl).into_iter().flatten().copied()
    }

    /// nodes を連結成分に分ける
    ///
    /// 辺は nodes の内側だけを辿ります。各成分は昇順、成分同士は先頭の clid 順です。
    pub fn connected_components(&self, nodes: &BTreeSet<ClId>) -> Vec<Vec<ClId>> {
        let mut seen: HashSet<ClId> = HashSet::with_capacity(nodes.len());
        let mut out = Vec::new();
        for &start in nodes {
            if !seen.insert(start) {
                continue;
            }
            let mut members = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(cl) = queue.pop_front() {
                for next in self.dependencies(cl).chain(self.dependents(cl)) {
                    if nodes.contains(&next) && seen.insert(next) {
                        members.push(next);
                        queue.push_back(next);
                    }
                }
            }
            members.sort();
            out.push(members);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testutil::clids;

    fn nodes(ids: &[u64]) -> BTreeSet<ClId> {
        clids(ids).into_iter().collect()
    }

    #[test]
    fn edges_are_kept_in_sync() {
        let mut g = ClGraph::new();
        g.add_dependency(ClId(2), ClId(1));
        assert_eq!(g.dependencies(ClId(2)).collect::<Vec<_>>(), vec![ClId(1)]);
        assert_eq!(g.dependents(ClId(1)).collect::<Vec<_>>(), vec![ClId(2)]);
        assert_eq!(g.dependents(ClId(2)).count(), 0);
    }

    #[test]
    fn components_ignore_direction_and_outside_nodes() {
        let mut g = ClGraph::new();
        g.add_dependency(ClId(2), ClId(1));
        g.add_dependency(ClId(3), ClId(1));
        // 5 -> 9 -> 4: 9 は nodes に含まれないので 4 と 5 は繋がらない
        g.add_dependency(ClId(5), ClId(9));
        g.add_dependency(ClId(9), ClId(4));
        let comps = g.connected_components(&nodes(&[1, 2, 3, 4, 5]));
        assert_eq!(comps, vec![clids(&[1, 2, 3]), clids(&[4]), clids(&[5])]);
    }

    #[test]
    fn self_loops_are_ignored() {
        let mut g = ClGraph::new();
        g.add_dependency(ClId(1), ClId(1));
        assert_eq!(g.dependencies(ClId(1)).count(), 0);
    }
}
