//! Test fixtures shared by the engine tests.

use crate::domain::*;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use ulid::Ulid;

pub(crate) const PROJECT: &str = "chromium";

pub(crate) fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
}

pub(crate) fn trigger(mode: RunMode, at: DateTime<Utc>) -> Trigger {
    Trigger {
        email: "dev@example.com".to_string(),
        account_id: 1,
        mode,
        time: at,
    }
}

pub(crate) fn pcl_ok(clid: u64) -> Pcl {
    Pcl {
        config_group_indexes: vec![0],
        ..Pcl::bare(ClId(clid), 1, PclStatus::Ok)
    }
}

pub(crate) trait PclExt {
    fn trig(self, mode: RunMode) -> Self;
    fn trig_at(self, mode: RunMode, at: DateTime<Utc>) -> Self;
    fn deps(self, deps: &[u64]) -> Self;
    fn group(self, index: usize) -> Self;
    fn submitted(self) -> Self;
    fn eversion(self, ev: u64) -> Self;
}

impl PclExt for Pcl {
    fn trig(self, mode: RunMode) -> Self {
        self.trig_at(mode, t0())
    }

    fn trig_at(mut self, mode: RunMode, at: DateTime<Utc>) -> Self {
        self.trigger = Some(trigger(mode, at));
        self
    }

    fn deps(mut self, deps: &[u64]) -> Self {
        self.deps = deps.iter().map(|&d| Dep::hard(d)).collect();
        self
    }

    fn group(mut self, index: usize) -> Self {
        self.config_group_indexes = vec![index];
        self
    }

    fn submitted(mut self) -> Self {
        self.submitted = true;
        self.trigger = None;
        self
    }

    fn eversion(mut self, ev: u64) -> Self {
        self.eversion = ev;
        self
    }
}

/// このプロジェクトが監視している repo/a の CL
pub(crate) fn changelist(clid: u64, eversion: u64, mode: Option<RunMode>, deps: &[u64]) -> Changelist {
    Changelist {
        id: ClId(clid),
        eversion,
        watched_by: vec![PROJECT.to_string()],
        snapshot: Some(ClSnapshot {
            project: PROJECT.to_string(),
            repo: "repo/a".to_string(),
            git_ref: "refs/heads/main".to_string(),
            status: ChangeStatus::New,
            owner_email: Some("owner@example.com".to_string()),
            trigger: mode.map(|m| trigger(m, t0())),
            deps: deps.iter().map(|&d| Dep::hard(d)).collect(),
        }),
    }
}

pub(crate) fn clids(ids: &[u64]) -> Vec<ClId> {
    ids.iter().map(|&i| ClId(i)).collect()
}

pub(crate) fn run_id(n: u64) -> RunId {
    RunId::from_ulid(Ulid::from_parts(n, 0))
}

pub(crate) fn run_ref(n: u64, ids: &[u64]) -> RunRef {
    RunRef {
        id: run_id(n),
        clids: clids(ids),
    }
}

pub(crate) fn component(ids: &[u64], dirty: bool) -> Component {
    Component {
        clids: clids(ids),
        pruns: Vec::new(),
        triage_required: dirty,
        decision_time: None,
    }
}

pub(crate) fn group(name: &str) -> ConfigGroup {
    ConfigGroup {
        name: name.to_string(),
        repos: vec!["repo/a".to_string()],
        ref_prefixes: vec!["refs/heads/".to_string()],
        fallback: false,
        combine_cls: None,
        trigger_deps: false,
    }
}

pub(crate) fn combinable_group(name: &str, delay_secs: i64) -> ConfigGroup {
    ConfigGroup {
        combine_cls: Some(CombineCls {
            stabilization_delay_secs: delay_secs,
        }),
        ..group(name)
    }
}

pub(crate) fn config_meta(hash: &str, groups: Vec<ConfigGroup>) -> ConfigMeta {
    ConfigMeta {
        project: PROJECT.to_string(),
        status: ConfigStatus::Enabled,
        hash: hash.to_string(),
        eversion: 1,
        config_groups: groups,
    }
}

pub(crate) fn snapshot_with(pcls: Vec<Pcl>, components: Vec<Component>) -> ProjectSnapshot {
    ProjectSnapshot {
        project: PROJECT.to_string(),
        status: ProjectStatus::Started,
        config_hash: "h1".to_string(),
        config_group_names: Arc::new(vec!["g0".to_string()]),
        pcls: cow_list(pcls),
        components: cow_list(components),
        ..Default::default()
    }
}

pub(crate) fn view(snapshot: &ProjectSnapshot, groups: Vec<ConfigGroup>) -> ProjectView {
    ProjectView::new(snapshot, Arc::new(config_meta(&snapshot.config_hash, groups)))
}
