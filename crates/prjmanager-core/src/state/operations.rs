//! PurgingCL / TriggeringCL bookkeeping.

use crate::domain::{ClId, PurgingCl, TriggeringCl};
use crate::state::{State, cow};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;

impl State {
    pub(crate) fn add_purging_cls(&mut self, items: Vec<PurgingCl>) {
        if items.is_empty() {
            return;
        }
        self.pb.purging_cls = cow::append_sorted(&self.pb.purging_cls, items, |p| p.clid);
    }

    pub(crate) fn add_triggering_cls(&mut self, items: Vec<TriggeringCl>) {
        if items.is_empty() {
            return;
        }
        self.pb.triggering_cls = cow::append_sorted(&self.pb.triggering_cls, items, |t| t.clid);
    }

    /// 完了した、または期限切れの purge 記録を消し、その clid を返す
    pub(crate) fn remove_purging_cls(
        &mut self,
        completed: &HashSet<&str>,
        now: DateTime<Utc>,
        grace: Duration,
    ) -> Vec<ClId> {
        let mut removed = Vec::new();
        let updated = cow::remove_where(&self.pb.purging_cls, |p| {
            let drop = completed.contains(p.operation_id.as_str()) || p.is_expired(now, grace);
            if drop {
                removed.push(p.clid);
            }
            drop
        });
        if let Some(list) = updated {
            self.pb.purging_cls = list;
        }
        removed
    }

    /// `should_remove` が true の trigger 記録を消し、消した記録を返す
    pub(crate) fn remove_triggering_cls(
        &mut self,
        mut should_remove: impl FnMut(&TriggeringCl) -> bool,
    ) -> Vec<TriggeringCl> {
        let mut removed = Vec::new();
        let updated = cow::remove_where(&self.pb.triggering_cls, |t| {
            let drop = should_remove(t);
            if drop {
                removed.push(t.clone());
            }
            drop
        });
        if let Some(list) = updated {
            self.pb.triggering_cls = list;
        }
        removed
    }

    pub(crate) fn is_purging(&self, clid: ClId) -> bool {
        self.pb.purging_cls.iter().any(|p| p.clid == clid)
    }
}
