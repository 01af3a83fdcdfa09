//! Component triage と Action Executor
//!
//! # 流れ
//! 1. `triage_components`: 期限の来た Component を並列に triage する。
//!    Component ごとに独立したタスクで走らせ、panic もその Component のエラーに留める
//! 2. `act_on_components`: Run をまとめて並列に作成し、結果を単一スレッドで State に戻す
//!
//! # 失敗の扱い
//! - 一部の Component / Run 作成が失敗しても、残りの結果はコミットする
//! - 全部失敗したときだけ最も深刻なエラーを返す
//! - 不変条件違反（Component の使い回し、重複 purge など）は常に即エラー

use crate::domain::{
    ClId, Component, EngineError, ErrorKind, LogReason, ProjectView, PurgeClTask,
    PurgeDraft, PurgingCl, RunCl, RunDraft, RunKey, RunRef, RunSpec, TriageDecision, TriggerClTask,
    TriggerDraft, TriggeringCl,
};
use crate::state::{Handler, SideEffect, State};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// ComponentAction は 1 Component 分の triage 結果
#[derive(Debug)]
pub(crate) struct ComponentAction {
    pub index: usize,
    pub decision: TriageDecision,
}

impl State {
    /// 全 Component の中で最も早い decision_time
    pub(crate) fn earliest_decision_time(&self) -> Option<DateTime<Utc>> {
        self.pb.components.iter().filter_map(|c| c.decision_time).min()
    }

    /// 直ちに次の pass が必要か
    pub(crate) fn needs_pass_asap(&self) -> bool {
        self.pb.repartition_required
            || !self.pb.created_runs.is_empty()
            || self.pb.components.iter().any(|c| c.triage_required)
    }
}

impl Handler {
    /// triage が必要な Component を並列に triage する（State は変更しない）
    pub(crate) async fn triage_components(
        &self,
        s: &mut State,
    ) -> Result<Vec<ComponentAction>, EngineError> {
        let now = self.clock.now();
        let due: Vec<(usize, Arc<Component>)> = s
            .pb
            .components
            .iter()
            .enumerate()
            .filter(|(_, c)| c.needs_triage(now))
            .map(|(i, c)| (i, Arc::clone(c)))
            .collect();
        if due.is_empty() {
            return Ok(Vec::new());
        }

        let config = self.load_config(s).await?;
        let view = Arc::new(ProjectView::new(&s.pb, config));
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(due.len());
        for (index, c) in due {
            let triager = Arc::clone(&self.triager);
            let view = Arc::clone(&view);
            let semaphore = Arc::clone(&semaphore);
            let component = Arc::clone(&c);
            let handle = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                triager.triage(&component, &view, now)
            });
            handles.push((index, c, handle));
        }

        let mut actions = Vec::new();
        let mut errs = Vec::new();
        for (index, c, handle) in handles {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) if e.is_panic() => Err(EngineError::Triage {
                    component: c.label(),
                    message: format!("caught panic: {e}"),
                }),
                Err(e) => Err(EngineError::Triage {
                    component: c.label(),
                    message: e.to_string(),
                }),
            };
            match result.and_then(|d| validate_decision(&c, &view, d)) {
                Ok(decision) => actions.push(ComponentAction { index, decision }),
                Err(e) if e.kind() == ErrorKind::Invariant => {
                    error!(project = %view.project, component = %c.label(), error = %e, "triage broke an invariant");
                    return Err(e);
                }
                Err(e) => {
                    error!(project = %view.project, component = %c.label(), error = %e, "failed to triage component");
                    errs.push(e);
                }
            }
        }

        if errs.is_empty() {
            return Ok(actions);
        }
        if !actions.is_empty() {
            warn!(
                project = %view.project,
                failed = errs.len(),
                succeeded = actions.len(),
                "some components failed triage, proceeding with the rest"
            );
            return Ok(actions);
        }
        let failed = errs.len();
        match EngineError::most_severe(errs) {
            Some(worst) => Err(EngineError::AllActionsFailed {
                failed,
                worst: Box::new(worst),
            }),
            None => Ok(actions),
        }
    }

    /// triage の結果を実行する。State は clone 済みであること
    pub(crate) async fn act_on_components(
        &self,
        s: &mut State,
        actions: Vec<ComponentAction>,
    ) -> Result<Option<SideEffect>, EngineError> {
        let config = self.load_config(s).await?;
        let now = self.clock.now();
        let project = s.pb.project.clone();

        let mut specs: Vec<(usize, RunSpec)> = Vec::new();
        for (ai, action) in actions.iter().enumerate() {
            for draft in &action.decision.runs_to_create {
                specs.push((ai, self.make_run_spec(s, &config.config_groups, draft, now)?));
            }
        }

        let mut runs_failed = vec![0usize; actions.len()];
        let mut created: Vec<RunRef> = Vec::new();
        let mut errs: Vec<EngineError> = Vec::new();
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut set = JoinSet::new();
        for (ai, spec) in specs {
            let runs = Arc::clone(&self.runs);
            let semaphore = Arc::clone(&semaphore);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = runs.create_run(&spec).await;
                (ai, spec, result)
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, spec, Ok(()))) => {
                    info!(project = %project, run = %spec.id, mode = ?spec.mode, cls = spec.cls.len(), "created run");
                    created.push(RunRef {
                        clids: spec.clids(),
                        id: spec.id,
                    });
                }
                Ok((ai, spec, Err(e))) => {
                    error!(project = %project, run = %spec.id, error = %e, "failed to create run");
                    runs_failed[ai] += 1;
                    errs.push(e.into());
                }
                Err(e) => {
                    return Err(EngineError::Invariant(format!("run creation task failed: {e}")));
                }
            }
        }
        let runs_created = created.len();
        // 作成できた Run は Component の更新を諦めた場合でも記録する
        s.add_created_runs(created);

        let mut components: Vec<Arc<Component>> = s.pb.components.iter().cloned().collect();
        let mut components_updated = 0;
        let mut purges: Vec<PurgeDraft> = Vec::new();
        let mut triggers: Vec<TriggerDraft> = Vec::new();
        for (ai, action) in actions.into_iter().enumerate() {
            // Run 作成に失敗した Component は triage_required のまま残し、次の pass でやり直す
            if runs_failed[ai] > 0 {
                continue;
            }
            purges.extend(action.decision.cls_to_purge);
            triggers.extend(action.decision.cls_to_trigger);
            if let Some(nv) = action.decision.new_value {
                components[action.index] = nv;
                components_updated += 1;
            }
        }
        if components_updated > 0 {
            // CL の所属は変わらないので index はそのまま
            let index = s.cl_to_component.take();
            s.set_components(Arc::new(components), index);
        }

        let purge_count = purges.len();
        let trigger_count = triggers.len();
        let purge_effect = self.add_cls_to_purge(s, purges, now)?;
        let trigger_effect = self.add_cls_to_trigger(s, triggers, now)?;

        if errs.is_empty() {
            info!(
                project = %project,
                runs_created,
                components_updated,
                purges = purge_count,
                triggers = trigger_count,
                "acted on components"
            );
        } else if runs_created + components_updated + purge_count + trigger_count == 0 {
            let failed = errs.len();
            let worst = EngineError::most_severe(errs)
                .unwrap_or_else(|| EngineError::Invariant("no error recorded".to_string()));
            return Err(EngineError::AllActionsFailed {
                failed,
                worst: Box::new(worst),
            });
        } else {
            warn!(
                project = %project,
                runs_created,
                runs_failed = errs.len(),
                components_updated,
                purges = purge_count,
                "some runs failed to be created, proceeding with the rest"
            );
        }
        Ok(SideEffect::compose([purge_effect, trigger_effect]))
    }

    fn make_run_spec(
        &self,
        s: &State,
        groups: &[crate::domain::ConfigGroup],
        draft: &RunDraft,
        now: DateTime<Utc>,
    ) -> Result<RunSpec, EngineError> {
        let group = groups.get(draft.config_group_index).ok_or_else(|| {
            EngineError::Invariant(format!(
                "run draft refers to unknown config group {}",
                draft.config_group_index
            ))
        })?;
        let mut cls = Vec::with_capacity(draft.clids.len());
        for &clid in &draft.clids {
            let pcl = s
                .pcl(clid)
                .ok_or_else(|| EngineError::Invariant(format!("run draft refers to unknown {clid}")))?;
            let trigger = pcl
                .trigger
                .clone()
                .ok_or_else(|| EngineError::Invariant(format!("run draft includes untriggered {clid}")))?;
            cls.push(RunCl {
                clid,
                eversion: pcl.eversion,
                trigger,
            });
        }
        let id = self.id_gen.run_id(&RunKey {
            project: &s.pb.project,
            config_group_name: &group.name,
            mode: draft.mode,
            cls: &cls,
        });
        Ok(RunSpec {
            id,
            project: s.pb.project.clone(),
            config_group_index: draft.config_group_index,
            config_group_name: group.name.clone(),
            mode: draft.mode,
            cls,
            created_at: now,
        })
    }

    /// PurgingCl を記録し、purge を予約する副作用を返す
    pub(crate) fn add_cls_to_purge(
        &self,
        s: &mut State,
        drafts: Vec<PurgeDraft>,
        now: DateTime<Utc>,
    ) -> Result<Option<SideEffect>, EngineError> {
        if drafts.is_empty() {
            return Ok(None);
        }
        let mut seen = HashSet::with_capacity(drafts.len());
        for d in &drafts {
            if !seen.insert(d.clid) {
                return Err(EngineError::Invariant(format!("{} is purged twice", d.clid)));
            }
            if s.is_purging(d.clid) {
                return Err(EngineError::Invariant(format!("{} is already being purged", d.clid)));
            }
        }

        let deadline = now + self.config.max_purging_cl_duration();
        let mut records = Vec::with_capacity(drafts.len());
        let mut tasks = Vec::with_capacity(drafts.len());
        for d in drafts {
            let trigger = s.pcl(d.clid).and_then(|p| p.trigger.clone());
            let purging = PurgingCl::new(d.clid, deadline).with_purged(trigger, d.reasons);
            info!(project = %s.pb.project, clid = %d.clid, operation_id = %purging.operation_id, "purging CL");
            tasks.push(PurgeClTask {
                project: s.pb.project.clone(),
                purging: purging.clone(),
            });
            records.push(purging);
        }
        s.add_purging_cls(records);
        s.add_log_reason(LogReason::PurgeClsScheduled);
        Ok(Some(SideEffect::SchedulePurges { tasks }))
    }

    /// TriggeringCl を記録し、投票を付ける副作用を返す
    pub(crate) fn add_cls_to_trigger(
        &self,
        s: &mut State,
        drafts: Vec<TriggerDraft>,
        now: DateTime<Utc>,
    ) -> Result<Option<SideEffect>, EngineError> {
        let mut seen = HashSet::new();
        let drafts: Vec<TriggerDraft> = drafts
            .into_iter()
            .filter(|d| seen.insert(d.clid))
            .collect();
        if drafts.is_empty() {
            return Ok(None);
        }
        let deadline = now + self.config.max_triggering_cl_duration();
        let mut records = Vec::with_capacity(drafts.len());
        for d in drafts {
            if s.pb.triggering_cls.iter().any(|t| t.clid == d.clid) {
                return Err(EngineError::Invariant(format!("{} is already being triggered", d.clid)));
            }
            let t = TriggeringCl::new(d.clid, d.origin_clid, d.mode, deadline);
            debug!(project = %s.pb.project, clid = %d.clid, origin = %d.origin_clid, operation_id = %t.operation_id, "triggering dependency");
            records.push(t);
        }
        let tasks = records
            .iter()
            .map(|t| TriggerClTask {
                project: s.pb.project.clone(),
                triggering: t.clone(),
            })
            .collect();
        s.add_triggering_cls(records);
        s.add_log_reason(LogReason::TriggerClsScheduled);
        Ok(Some(SideEffect::ScheduleTriggers { tasks }))
    }
}

/// triage 結果が Component と矛盾していないか検査する
fn validate_decision(
    c: &Arc<Component>,
    view: &ProjectView,
    d: TriageDecision,
) -> Result<TriageDecision, EngineError> {
    if let Some(nv) = &d.new_value {
        if Arc::ptr_eq(nv, c) {
            return Err(EngineError::Invariant(format!(
                "triage of {} re-used the component object",
                c.label()
            )));
        }
        if nv.clids != c.clids {
            return Err(EngineError::Invariant(format!(
                "triage of {} changed the component's CLs",
                c.label()
            )));
        }
    }
    let mut purged: HashSet<ClId> = HashSet::with_capacity(d.cls_to_purge.len());
    for p in &d.cls_to_purge {
        let problem = if p.clid.0 == 0 {
            Some("clid must be set".to_string())
        } else if !purged.insert(p.clid) {
            Some(format!("{} is purged twice", p.clid))
        } else if p.reasons.is_empty() {
            Some(format!("purge of {} has no reasons", p.clid))
        } else if view.purging_cl(p.clid).is_some() {
            Some(format!("{} is already being purged", p.clid))
        } else if !c.contains(p.clid) {
            Some(format!("{} is purged outside of component {}", p.clid, c.label()))
        } else {
            None
        };
        if let Some(problem) = problem {
            return Err(EngineError::Invariant(problem));
        }
    }
    for t in &d.cls_to_trigger {
        if !c.contains(t.origin_clid) {
            return Err(EngineError::Invariant(format!(
                "trigger of {} originates outside of component {}",
                t.clid,
                c.label()
            )));
        }
    }
    Ok(d)
}
