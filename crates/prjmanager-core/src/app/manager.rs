//! ProjectManager - プロジェクトごとのイベントのバッチ処理
//!
//! # フロー
//! 1. mailbox から取り出したイベントを種類ごとにまとめる
//! 2. ハンドラを決まった順で適用する
//!    （UpdateConfig/Poke → RunsCreated → RunsFinished → ClsUpdated →
//!    PurgesCompleted → TriggeringClsCompleted → ExecDeferred）
//! 3. 呼び出し側が新しいスナップショットを保存する
//! 4. 保存できたら副作用を実行する（`commit_and_apply`）

use crate::domain::{
    ClId, ClUpdate, EngineError, Event, LogReason, ProjectSnapshot, RunId, RunRef,
};
use crate::observability::ProjectCounts;
use crate::ports::SnapshotStore;
use crate::state::{Effectors, Handler, SideEffect, State, Transition};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Outcome は 1 バッチ分の処理結果
#[derive(Debug)]
pub struct Outcome {
    pub snapshot: ProjectSnapshot,
    /// false なら保存は不要
    pub changed: bool,
    /// 保存した後に実行する
    pub side_effect: Option<SideEffect>,
    pub reasons: Vec<LogReason>,
}

/// 同じ種類のイベントをまとめたもの
#[derive(Debug, Default, PartialEq)]
struct Batch {
    update_config: bool,
    poke: bool,
    cls: Vec<ClUpdate>,
    runs_created: Vec<RunRef>,
    runs_finished: Vec<RunId>,
    purges_completed: Vec<String>,
    triggers_succeeded: Vec<String>,
    triggers_failed: Vec<String>,
    triggers_skipped: Vec<String>,
}

impl Batch {
    fn coalesce(events: &[Event]) -> Self {
        let mut b = Batch::default();
        let mut cls: BTreeMap<ClId, u64> = BTreeMap::new();
        let mut finished = BTreeSet::new();
        let mut purged = BTreeSet::new();
        let mut succeeded = BTreeSet::new();
        let mut failed = BTreeSet::new();
        let mut skipped = BTreeSet::new();
        for e in events {
            match e {
                Event::UpdateConfig => b.update_config = true,
                Event::Poke => b.poke = true,
                Event::ClsUpdated { cls: updates } => {
                    for u in updates {
                        let ev = cls.entry(u.clid).or_insert(u.eversion);
                        *ev = (*ev).max(u.eversion);
                    }
                }
                Event::RunsCreated { runs } => b.runs_created.extend(runs.iter().cloned()),
                Event::RunsFinished { run_ids } => finished.extend(run_ids.iter().copied()),
                Event::PurgesCompleted { operation_ids } => purged.extend(operation_ids.iter().cloned()),
                Event::TriggeringClsCompleted {
                    succeeded: s,
                    failed: f,
                    skipped: k,
                } => {
                    succeeded.extend(s.iter().cloned());
                    failed.extend(f.iter().cloned());
                    skipped.extend(k.iter().cloned());
                }
            }
        }
        b.cls = cls
            .into_iter()
            .map(|(clid, eversion)| ClUpdate { clid, eversion })
            .collect();
        b.runs_finished = finished.into_iter().collect();
        b.purges_completed = purged.into_iter().collect();
        b.triggers_succeeded = succeeded.into_iter().collect();
        b.triggers_failed = failed.into_iter().collect();
        b.triggers_skipped = skipped.into_iter().collect();
        b
    }

    fn has_trigger_completions(&self) -> bool {
        !(self.triggers_succeeded.is_empty() && self.triggers_failed.is_empty() && self.triggers_skipped.is_empty())
    }
}

/// ProjectManager は Handler と副作用の実行先をまとめたもの
///
/// `ProjectManagerBuilder` で作ります。
pub struct ProjectManager {
    handler: Handler,
    effectors: Effectors,
    snapshots: Arc<dyn SnapshotStore>,
}

impl ProjectManager {
    pub(crate) fn new(handler: Handler, effectors: Effectors, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            handler,
            effectors,
            snapshots,
        }
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    /// イベントのバッチを snapshot に適用する（保存も副作用の実行もしない）
    pub async fn process(
        &self,
        project: &str,
        snapshot: ProjectSnapshot,
        events: &[Event],
    ) -> Result<Outcome, EngineError> {
        if snapshot.project != project {
            return Err(EngineError::Invariant(format!(
                "snapshot of {} passed for project {project}",
                snapshot.project
            )));
        }
        let batch = Batch::coalesce(events);
        debug!(project, events = events.len(), "processing events");
        let before = snapshot.clone();
        match self.apply_batch(State::new(snapshot), &batch).await {
            Ok((s, effects)) => {
                let reasons = s.log_reasons().to_vec();
                let snapshot = s.into_snapshot();
                let changed = !snapshot.shares_storage_with(&before);
                if changed {
                    let counts = ProjectCounts::from_snapshot(&snapshot);
                    info!(project, reasons = ?reasons, status = %snapshot.status, counts = ?counts, "project state changed");
                }
                Ok(Outcome {
                    snapshot,
                    changed,
                    side_effect: SideEffect::compose(effects),
                    reasons,
                })
            }
            Err(e) => {
                error!(project, error = %e, kind = ?e.kind(), "failed to process events");
                Err(e)
            }
        }
    }

    async fn apply_batch(
        &self,
        s: State,
        b: &Batch,
    ) -> Result<(State, Vec<Option<SideEffect>>), EngineError> {
        let h = &self.handler;
        let mut effects = Vec::new();
        let mut s = s;
        if b.poke {
            s = collect(h.poke(s).await?, &mut effects);
        } else if b.update_config {
            s = collect(h.update_config(s).await?, &mut effects);
        }
        if !b.runs_created.is_empty() {
            s = collect(h.on_runs_created(s, &b.runs_created).await?, &mut effects);
        }
        if !b.runs_finished.is_empty() {
            s = collect(h.on_runs_finished(s, &b.runs_finished).await?, &mut effects);
        }
        if !b.cls.is_empty() {
            s = collect(h.on_cls_updated(s, &b.cls).await?, &mut effects);
        }
        if !b.purges_completed.is_empty() {
            s = collect(h.on_purges_completed(s, &b.purges_completed).await?, &mut effects);
        }
        if b.has_trigger_completions() {
            let t = h
                .on_triggering_cls_completed(s, &b.triggers_succeeded, &b.triggers_failed, &b.triggers_skipped)
                .await?;
            s = collect(t, &mut effects);
        }
        s = collect(h.exec_deferred(s).await?, &mut effects);
        Ok((s, effects))
    }

    /// 変更があれば保存し、その後で副作用を実行する
    ///
    /// 保存に失敗した場合、副作用は実行しません。
    pub async fn commit_and_apply(&self, outcome: &Outcome) -> Result<(), EngineError> {
        if outcome.changed {
            self.snapshots.save(&outcome.snapshot).await?;
        }
        if let Some(se) = &outcome.side_effect {
            if let Err(e) = se.apply(&self.effectors).await {
                error!(project = %outcome.snapshot.project, error = %e, "failed to apply side effects");
                return Err(e);
            }
            debug!(project = %outcome.snapshot.project, effects = se.leaves().len(), "applied side effects");
        }
        Ok(())
    }

    /// 保存済みの状態を読み、イベントを適用して保存し、副作用を実行する
    pub async fn handle(&self, project: &str, events: &[Event]) -> Result<Outcome, EngineError> {
        let snapshot = self
            .snapshots
            .load(project)
            .await?
            .unwrap_or_else(|| ProjectSnapshot::new(project));
        let outcome = self.process(project, snapshot, events).await?;
        self.commit_and_apply(&outcome).await?;
        Ok(outcome)
    }
}

fn collect(t: Transition, effects: &mut Vec<Option<SideEffect>>) -> State {
    effects.push(t.side_effect);
    t.state
}
