//! ProjectView - triage 用の読み取り専用ビュー
//!
//! 並列に走る triage タスク間で `Arc<ProjectView>` として共有します。

use crate::domain::config::{ConfigGroup, ConfigMeta};
use crate::domain::ids::ClId;
use crate::domain::operation::{PurgingCl, TriggeringCl};
use crate::domain::pcl::Pcl;
use crate::domain::state::{CowList, ProjectSnapshot};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ProjectView {
    pub project: String,
    pub config: Arc<ConfigMeta>,
    pcls: CowList<Pcl>,
    pcl_index: HashMap<ClId, usize>,
    purging: HashMap<ClId, Arc<PurgingCl>>,
    triggering: HashMap<ClId, Arc<TriggeringCl>>,
}

impl ProjectView {
    pub fn new(snapshot: &ProjectSnapshot, config: Arc<ConfigMeta>) -> Self {
        let pcl_index = snapshot
            .pcls
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clid, i))
            .collect();
        let purging = snapshot
            .purging_cls
            .iter()
            .map(|p| (p.clid, p.clone()))
            .collect();
        let triggering = snapshot
            .triggering_cls
            .iter()
            .map(|t| (t.clid, t.clone()))
            .collect();
        Self {
            project: snapshot.project.clone(),
            config,
            pcls: snapshot.pcls.clone(),
            pcl_index,
            purging,
            triggering,
        }
    }

    pub fn pcl(&self, clid: ClId) -> Option<&Pcl> {
        self.pcl_index.get(&clid).map(|&i| self.pcls[i].as_ref())
    }

    pub fn purging_cl(&self, clid: ClId) -> Option<&PurgingCl> {
        self.purging.get(&clid).map(Arc::as_ref)
    }

    pub fn triggering_cl(&self, clid: ClId) -> Option<&TriggeringCl> {
        self.triggering.get(&clid).map(Arc::as_ref)
    }

    pub fn config_group(&self, index: usize) -> Option<&ConfigGroup> {
        self.config.config_groups.get(index)
    }
}
