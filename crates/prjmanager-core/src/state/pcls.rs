//! PCL derivation - CL スナップショットから PCL を作る
//!
//! # ステータスの決め方（上から順に評価）
//! 1. CL ストアに無い → Deleted
//! 2. このプロジェクトが監視していない／複数プロジェクトが監視している → Unwatched
//! 3. スナップショットが無い、または別プロジェクト向け → Unknown
//! 4. どの config group にもマッチしない → Unwatched
//! 5. それ以外は Ok

use crate::domain::{
    ChangeStatus, ClError, ClId, ClUpdate, Changelist, ConfigMeta, EngineError, Pcl, PclStatus,
};
use crate::state::{Handler, State, cow};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::task::JoinSet;

pub(crate) struct PclContext<'a> {
    pub project: &'a str,
    pub config: &'a ConfigMeta,
    pub now: DateTime<Utc>,
    pub max_trigger_age: Duration,
    pub max_allowed_deps: usize,
}

pub(crate) fn make_pcl(clid: ClId, cl: Option<&Changelist>, ctx: &PclContext<'_>) -> Pcl {
    let Some(cl) = cl else {
        return Pcl::bare(clid, 0, PclStatus::Deleted);
    };
    let watched_here = cl.watched_by.iter().any(|p| p == ctx.project);
    if !watched_here || cl.watched_by.len() > 1 {
        return Pcl::bare(clid, cl.eversion, PclStatus::Unwatched);
    }
    let Some(snap) = cl.snapshot.as_ref().filter(|s| s.project == ctx.project) else {
        return Pcl::bare(clid, cl.eversion, PclStatus::Unknown);
    };
    let indexes = ctx.config.match_groups(&snap.repo, &snap.git_ref);
    if indexes.is_empty() {
        return Pcl::bare(clid, cl.eversion, PclStatus::Unwatched);
    }

    let trigger = match snap.status {
        ChangeStatus::New => snap
            .trigger
            .clone()
            .filter(|t| ctx.now - t.time <= ctx.max_trigger_age),
        ChangeStatus::Abandoned | ChangeStatus::Merged => None,
    };

    let mut errors = Vec::new();
    if trigger.is_some() {
        if indexes.len() > 1 {
            errors.push(ClError::WatchedByManyConfigGroups {
                groups: indexes
                    .iter()
                    .map(|&i| ctx.config.config_groups[i].name.clone())
                    .collect(),
            });
        }
        if snap.owner_email.as_deref().is_none_or(str::is_empty) {
            errors.push(ClError::OwnerLacksEmail);
        }
        if snap.deps.len() > ctx.max_allowed_deps {
            errors.push(ClError::TooManyDeps {
                actual: snap.deps.len(),
                max: ctx.max_allowed_deps,
            });
        }
    }

    Pcl {
        clid,
        eversion: cl.eversion,
        status: PclStatus::Ok,
        config_group_indexes: indexes,
        trigger,
        submitted: snap.status == ChangeStatus::Merged,
        deps: snap.deps.clone(),
        errors,
    }
}

impl State {
    /// 記録済みの版数より新しい更新だけを残す（clid ごとに最大の版数）
    pub(crate) fn filter_out_up_to_date(&self, updates: &[ClUpdate]) -> BTreeMap<ClId, u64> {
        let mut latest: BTreeMap<ClId, u64> = BTreeMap::new();
        for u in updates {
            let e = latest.entry(u.clid).or_insert(u.eversion);
            *e = (*e).max(u.eversion);
        }
        latest.retain(|clid, ev| self.pcl(*clid).is_none_or(|p| p.eversion < *ev));
        latest
    }

    /// PCL を置き換え／追加し、内容が変わった clid を昇順で返す
    pub(crate) fn upsert_pcls(&mut self, pcls: Vec<Pcl>) -> Vec<ClId> {
        let mut new_by_id: HashMap<ClId, Pcl> = HashMap::new();
        for p in pcls {
            if self.pcl(p.clid) != Some(&p) {
                new_by_id.insert(p.clid, p);
            }
        }
        let mut changed: Vec<ClId> = new_by_id.keys().copied().collect();
        if changed.is_empty() {
            return changed;
        }
        changed.sort();
        let replaced = cow::update(&self.pb.pcls, |old| match new_by_id.remove(&old.clid) {
            Some(p) => cow::Change::Replace(p),
            None => cow::Change::Keep,
        });
        let base = replaced.unwrap_or_else(|| self.pb.pcls.clone());
        let merged = cow::append_sorted(&base, new_by_id.into_values(), |p| p.clid);
        self.set_pcls(merged);
        changed
    }

    /// 変わった PCL を反映する。CL 集合が同じまま再利用される Component も
    /// 中身が変わっているので triage し直す
    pub(crate) fn apply_changed_pcls(&mut self, pcls: Vec<Pcl>) {
        let changed = self.upsert_pcls(pcls);
        if !changed.is_empty() {
            self.mark_components_touching(&changed);
            self.pb.repartition_required = true;
        }
    }
}

impl Handler {
    pub(crate) fn pcl_context<'a>(&self, project: &'a str, config: &'a ConfigMeta) -> PclContext<'a> {
        PclContext {
            project,
            config,
            now: self.clock.now(),
            max_trigger_age: self.config.max_trigger_age(),
            max_allowed_deps: self.config.max_allowed_deps,
        }
    }

    /// CL ストアから ids を並列に読み出す
    pub(crate) async fn fetch_cls(
        &self,
        ids: &[ClId],
    ) -> Result<HashMap<ClId, Option<Changelist>>, EngineError> {
        let mut out = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(out);
        }
        let chunk_size = ids.len().div_ceil(self.config.concurrency.max(1));
        let mut set = JoinSet::new();
        for chunk in ids.chunks(chunk_size) {
            let store = Arc::clone(&self.cl_store);
            let chunk = chunk.to_vec();
            set.spawn(async move {
                let cls = store.get(&chunk).await?;
                Ok::<_, EngineError>(chunk.into_iter().zip(cls).collect::<Vec<_>>())
            });
        }
        while let Some(joined) = set.join_next().await {
            let pairs = joined.map_err(|e| EngineError::Invariant(format!("CL fetch task failed: {e}")))??;
            out.extend(pairs);
        }
        Ok(out)
    }

    /// 更新された CL を読み直し、関係のある PCL を差し替える
    pub(crate) async fn eval_updated_cls(
        &self,
        s: &mut State,
        config: &ConfigMeta,
        ids: &[ClId],
    ) -> Result<(), EngineError> {
        let fetched = self.fetch_cls(ids).await?;
        let project = s.pb.project.clone();
        let ctx = self.pcl_context(&project, config);
        let pcls: Vec<Pcl> = ids
            .iter()
            .filter_map(|&clid| {
                let cl = fetched.get(&clid).and_then(Option::as_ref);
                let tracked = s.pcl(clid).is_some();
                let watched = cl.is_some_and(|cl| cl.watched_by.iter().any(|p| *p == project));
                (tracked || watched).then(|| make_pcl(clid, cl, &ctx))
            })
            .collect();
        s.apply_changed_pcls(pcls);
        Ok(())
    }

    /// 新しい設定で全 PCL を評価し直す
    pub(crate) async fn reeval_pcls(&self, s: &mut State, config: &ConfigMeta) -> Result<(), EngineError> {
        let ids: Vec<ClId> = s.pb.pcls.iter().map(|p| p.clid).collect();
        let fetched = self.fetch_cls(&ids).await?;
        let project = s.pb.project.clone();
        let ctx = self.pcl_context(&project, config);
        let pcls: Vec<Pcl> = ids
            .iter()
            .map(|&clid| make_pcl(clid, fetched.get(&clid).and_then(Option::as_ref), &ctx))
            .collect();
        s.apply_changed_pcls(pcls);
        Ok(())
    }
}
