//! In-flight Run bookkeeping.

use crate::domain::{Component, RunId, RunRef};
use crate::state::{State, cow};
use std::collections::{BTreeSet, HashSet};
impl State {
    /// Component に取り込み済みのものと新規のもの、すべての進行中 Run
    pub fn incomplete_runs(&self) -> Vec<RunId> {
        let ids: BTreeSet<RunId> = self
            .pb
            .components
            .iter()
            .flat_map(|c| c.pruns.iter().map(|r| r.id))
            .chain(self.pb.created_runs.iter().map(|r| r.id))
            .collect();
        ids.into_iter().collect()
    }

    pub(crate) fn known_run_ids(&self) -> HashSet<RunId> {
        self.incomplete_runs().into_iter().collect()
    }

    /// 次の repartition で Component に取り込む Run を追加する
    pub(crate) fn add_created_runs(&mut self, runs: Vec<RunRef>) {
        if runs.is_empty() {
            return;
        }
        self.pb.created_runs = cow::append_sorted(&self.pb.created_runs, runs, |r| r.id);
    }

    /// 終了した Run を取り除き、残っている進行中 Run の数を返す
    ///
    /// Run が外れた Component は triage_required になります。
    pub(crate) fn remove_finished_runs(&mut self, finished: &HashSet<RunId>) -> usize {
        let components = cow::update(&self.pb.components, |c| {
            if !c.pruns.iter().any(|r| finished.contains(&r.id)) {
                return cow::Change::Keep;
            }
            cow::Change::Replace(Component {
                pruns: c
                    .pruns
                    .iter()
                    .filter(|r| !finished.contains(&r.id))
                    .cloned()
                    .collect(),
                triage_required: true,
                ..c.clone()
            })
        });
        if let Some(components) = components {
            self.pb.components = components;
        }
        if let Some(created) = cow::remove_where(&self.pb.created_runs, |r| finished.contains(&r.id)) {
            self.pb.created_runs = created;
        }
        self.incomplete_runs().len()
    }
}

pub(crate) fn dedup_runs(runs: &[RunRef], known: &HashSet<RunId>) -> Vec<RunRef> {
    let mut seen = HashSet::new();
    runs.iter()
        .filter(|r| !known.contains(&r.id) && seen.insert(r.id))
        .map(|r| RunRef {
            id: r.id,
            clids: {
                let mut ids = r.clids.clone();
                ids.sort();
                ids.dedup();
                ids
            },
        })
        .collect()
}
