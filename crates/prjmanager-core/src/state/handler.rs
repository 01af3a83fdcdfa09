//! Handler - イベントハンドラ（状態遷移）
//!
//! どのハンドラも `State` を値で受け取り、`Transition`（新しい State と任意の副作用）を返します。
//! 変更が無い場合は受け取った State をそのまま返します。
//!
//! # ハンドラ
//! - `update_config`: 最新の設定に追従する（開始 / 停止）
//! - `poke`: 設定の確認と、進行中の Run・全 Component の再確認
//! - `on_cls_updated`: CL の更新を PCL に反映する
//! - `on_runs_created` / `on_runs_finished`: Run の追跡
//! - `on_purges_completed` / `on_triggering_cls_completed`: 投票変更操作の完了
//! - `exec_deferred`: 分類 → repartition → triage → 実行 → 次の pass の予約

use crate::app::config::EngineConfig;
use crate::domain::{
    ClError, ClId, ClUpdate, ConfigMeta, ConfigStatus, EngineError, ErrorKind, LogReason, Pcl,
    ProjectStatus, PurgeDraft, RunId, RunMode, RunRef, TriggeringCl,
};
use crate::ports::{ClStore, Clock, ComponentTriage, ConfigSource, IdGenerator, RunSubsystem};
use crate::state::runs::dedup_runs;
use crate::state::{SideEffect, State};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Transition はハンドラの結果
#[derive(Debug)]
pub struct Transition {
    pub state: State,
    /// State をコミットした後に実行する
    pub side_effect: Option<SideEffect>,
}

impl Transition {
    pub fn new(state: State, side_effect: Option<SideEffect>) -> Self {
        Self { state, side_effect }
    }

    fn state_only(state: State) -> Self {
        Self::new(state, None)
    }
}

/// Handler はプロジェクトの状態遷移を行う
///
/// 外部コラボレーターはすべて trait object として注入します。
pub struct Handler {
    pub(crate) cl_store: Arc<dyn ClStore>,
    pub(crate) config_source: Arc<dyn ConfigSource>,
    pub(crate) runs: Arc<dyn RunSubsystem>,
    pub(crate) triager: Arc<dyn ComponentTriage>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) id_gen: Arc<dyn IdGenerator>,
    pub(crate) config: EngineConfig,
}

impl Handler {
    pub fn new(
        cl_store: Arc<dyn ClStore>,
        config_source: Arc<dyn ConfigSource>,
        runs: Arc<dyn RunSubsystem>,
        triager: Arc<dyn ComponentTriage>,
        clock: Arc<dyn Clock>,
        id_gen: Arc<dyn IdGenerator>,
        config: EngineConfig,
    ) -> Self {
        Self {
            cl_store,
            config_source,
            runs,
            triager,
            clock,
            id_gen,
            config,
        }
    }

    pub fn engine_config(&self) -> &EngineConfig {
        &self.config
    }

    /// 現在の config_hash に対応する設定（State にキャッシュする）
    pub(crate) async fn load_config(&self, s: &mut State) -> Result<Arc<ConfigMeta>, EngineError> {
        if let Some(c) = &s.config
            && c.hash == s.pb.config_hash
        {
            return Ok(Arc::clone(c));
        }
        let meta = self
            .config_source
            .get_by_hash(&s.pb.project, &s.pb.config_hash)
            .await?
            .ok_or_else(|| EngineError::ConfigNotFound {
                project: s.pb.project.clone(),
                hash: s.pb.config_hash.clone(),
            })?;
        let meta = Arc::new(meta);
        s.config = Some(Arc::clone(&meta));
        Ok(meta)
    }

    /// 最新の設定に追従する
    pub async fn update_config(&self, s: State) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        let meta = self.config_source.get_latest_meta(&s.pb.project).await?;

        match meta.status {
            ConfigStatus::Enabled => {
                let was = s.pb.status;
                if was == ProjectStatus::Started && meta.hash == s.pb.config_hash {
                    return Ok(Transition::state_only(s));
                }
                let mut s = s;
                let mut s = if was == ProjectStatus::Started {
                    s.clone_shallow(&[LogReason::ConfigChanged])?
                } else {
                    s.clone_shallow(&[LogReason::ConfigChanged, LogReason::StatusChanged])?
                };
                s.pb.status = ProjectStatus::Started;
                s.pb.config_hash = meta.hash.clone();
                s.pb.config_group_names = Arc::new(meta.group_names());
                let meta = Arc::new(meta);
                s.config = Some(Arc::clone(&meta));

                self.reeval_pcls(&mut s, &meta).await?;
                // 設定が変われば Run を作れる条件も変わりうる
                s.mark_components_for_triage(|_| true);
                info!(
                    project = %s.pb.project,
                    from = %was,
                    hash = %meta.hash,
                    repartition_required = s.pb.repartition_required,
                    "config applied"
                );

                // Stopping から戻った場合、終了処理中の Run にも送るが害はない
                let run_ids = s.incomplete_runs();
                let side_effect = (!run_ids.is_empty()).then(|| SideEffect::UpdateIncompleteRunsConfig {
                    run_ids,
                    hash: meta.hash.clone(),
                    eversion: meta.eversion,
                });
                Ok(Transition::new(s, side_effect))
            }
            ConfigStatus::Disabled | ConfigStatus::NotExists => match s.pb.status {
                ProjectStatus::Unspecified | ProjectStatus::Stopped => Ok(Transition::state_only(s)),
                ProjectStatus::Started | ProjectStatus::Stopping => {
                    let mut s = s;
                    if s.pb.status == ProjectStatus::Started {
                        s = s.clone_shallow(&[LogReason::StatusChanged])?;
                        s.pb.status = ProjectStatus::Stopping;
                        info!(project = %s.pb.project, "project is stopping");
                    }
                    let run_ids = s.incomplete_runs();
                    if run_ids.is_empty() {
                        let mut s = s.clone_shallow(&[LogReason::StatusChanged])?;
                        s.pb.status = ProjectStatus::Stopped;
                        info!(project = %s.pb.project, "project stopped");
                        return Ok(Transition::state_only(s));
                    }
                    Ok(Transition::new(
                        s,
                        Some(SideEffect::CancelIncompleteRuns {
                            run_ids,
                            reason: "project is disabled".to_string(),
                        }),
                    ))
                }
            },
        }
    }

    /// 設定を確認し、変化が無ければ進行中の Run と全 Component を再確認させる
    pub async fn poke(&self, s: State) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        let before = s.snapshot().clone();
        let t = self.update_config(s).await?;
        if t.state.snapshot().status != ProjectStatus::Started
            || t.side_effect.is_some()
            || !t.state.snapshot().shares_storage_with(&before)
        {
            return Ok(t);
        }

        let mut s = t.state;
        let run_ids = s.incomplete_runs();
        let mut s = s.clone_shallow(&[LogReason::PokeRequested])?;
        s.mark_components_for_triage(|_| true);
        debug!(project = %s.pb.project, runs = run_ids.len(), "poked");
        let side_effect = (!run_ids.is_empty()).then_some(SideEffect::PokeRuns { run_ids });
        Ok(Transition::new(s, side_effect))
    }

    /// CL の更新を反映する。記録済みの版数以下の更新は無視する
    pub async fn on_cls_updated(&self, s: State, updates: &[ClUpdate]) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        if s.pb.status != ProjectStatus::Started {
            // 再開時の全件ポーリングで送り直される
            return Ok(Transition::state_only(s));
        }
        let fresh = s.filter_out_up_to_date(updates);
        if fresh.is_empty() {
            return Ok(Transition::state_only(s));
        }

        let mut s = s;
        let mut s = s.clone_shallow(&[LogReason::ClsUpdated])?;
        let config = self.load_config(&mut s).await?;
        let ids: Vec<ClId> = fresh.into_keys().collect();
        self.eval_updated_cls(&mut s, &config, &ids).await?;
        debug!(
            project = %s.pb.project,
            updated = ids.len(),
            repartition_required = s.pb.repartition_required,
            "CLs updated"
        );
        Ok(Transition::state_only(s))
    }

    /// 新しく作られた Run を記録する（既知の Run は無視）
    pub async fn on_runs_created(&self, s: State, runs: &[RunRef]) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        let fresh = dedup_runs(runs, &s.known_run_ids());
        if fresh.is_empty() {
            return Ok(Transition::state_only(s));
        }

        match s.pb.status {
            ProjectStatus::Started => {
                let mut s = s;
                let mut s = s.clone_shallow(&[LogReason::RunsCreated])?;
                debug!(project = %s.pb.project, runs = fresh.len(), "runs created");
                s.add_created_runs(fresh);
                Ok(Transition::state_only(s))
            }
            ProjectStatus::Stopping | ProjectStatus::Stopped => {
                // 通常は起きないが、停止中に作られた Run は取り消す
                let ids: Vec<RunId> = fresh.iter().map(|r| r.id).collect();
                let incomplete = self.runs.incomplete_runs(&ids).await?;
                if incomplete.is_empty() {
                    return Ok(Transition::state_only(s));
                }
                error!(
                    project = %s.pb.project,
                    status = %s.pb.status,
                    runs = incomplete.len(),
                    "runs created for a project that is not started"
                );
                Ok(Transition::new(
                    s,
                    Some(SideEffect::CancelIncompleteRuns {
                        run_ids: incomplete,
                        reason: "project is not started".to_string(),
                    }),
                ))
            }
            ProjectStatus::Unspecified => Err(EngineError::Invariant(format!(
                "runs created for project {} that was never started",
                s.pb.project
            ))),
        }
    }

    /// 終了した Run を取り除く。Stopping で残りが無くなれば Stopped にする
    pub async fn on_runs_finished(&self, s: State, run_ids: &[RunId]) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        let known = s.known_run_ids();
        let finished: HashSet<RunId> = run_ids.iter().copied().filter(|id| known.contains(id)).collect();
        if finished.is_empty() {
            return Ok(Transition::state_only(s));
        }

        let mut s = s;
        let mut s = s.clone_shallow(&[LogReason::RunsFinished])?;
        let remaining = s.remove_finished_runs(&finished);
        debug!(project = %s.pb.project, finished = finished.len(), remaining, "runs finished");
        if s.pb.status == ProjectStatus::Stopping && remaining == 0 {
            s.add_log_reason(LogReason::StatusChanged);
            s.pb.status = ProjectStatus::Stopped;
            info!(project = %s.pb.project, "project stopped");
        }
        Ok(Transition::state_only(s))
    }

    /// 完了した、または期限切れの purge 記録を消す
    pub async fn on_purges_completed(
        &self,
        s: State,
        operation_ids: &[String],
    ) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        let now = self.clock.now();
        let grace = self.config.operation_grace();
        let completed: HashSet<&str> = operation_ids.iter().map(String::as_str).collect();
        let any = s
            .pb
            .purging_cls
            .iter()
            .any(|p| completed.contains(p.operation_id.as_str()) || p.is_expired(now, grace));
        if !any {
            return Ok(Transition::state_only(s));
        }

        let mut s = s;
        let mut s = s.clone_shallow(&[LogReason::PurgesCompleted])?;
        let removed = s.remove_purging_cls(&completed, now, grace);
        debug!(project = %s.pb.project, removed = removed.len(), "purges completed");
        // repartition が控えていれば全 Component が triage される
        if !s.pb.repartition_required {
            s.mark_components_touching(&removed);
        }
        Ok(Transition::state_only(s))
    }

    /// 投票付与の結果を反映する
    ///
    /// 失敗した依存への投票は、依存元の FULL_RUN の投票を purge する理由になります。
    pub async fn on_triggering_cls_completed(
        &self,
        s: State,
        succeeded: &[String],
        failed: &[String],
        skipped: &[String],
    ) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        let now = self.clock.now();
        let grace = self.config.operation_grace();
        let max_duration = self.config.max_triggering_cl_duration();
        let reported: HashSet<&str> = failed.iter().chain(skipped).map(String::as_str).collect();
        let to_remove: HashSet<String> = s
            .pb
            .triggering_cls
            .iter()
            .filter(|t| {
                reported.contains(t.operation_id.as_str())
                    || t.is_expired(now, grace)
                    || should_remove_op(t, s.pcl(t.clid), max_duration)
            })
            .map(|t| t.operation_id.clone())
            .collect();
        if to_remove.is_empty() {
            return Ok(Transition::state_only(s));
        }

        let mut s = s;
        let mut s = s.clone_shallow(&[LogReason::TriggeringClsCompleted])?;
        let removed = s.remove_triggering_cls(|t| to_remove.contains(&t.operation_id));
        debug!(
            project = %s.pb.project,
            removed = removed.len(),
            succeeded = succeeded.len(),
            failed = failed.len(),
            "triggering CLs completed"
        );
        if !s.pb.repartition_required {
            let touched: Vec<ClId> = removed.iter().map(|t| t.clid).collect();
            s.mark_components_touching(&touched);
        }

        let failed: HashSet<&str> = failed.iter().map(String::as_str).collect();
        let mut deps_by_origin: BTreeMap<ClId, Vec<ClId>> = BTreeMap::new();
        for t in removed.iter().filter(|t| failed.contains(t.operation_id.as_str())) {
            let Some(origin) = s.pcl(t.origin_clid) else {
                info!(project = %s.pb.project, origin = %t.origin_clid, "origin CL is no longer tracked");
                continue;
            };
            if s.is_purging(t.origin_clid) || origin.mode() != Some(RunMode::FullRun) {
                continue;
            }
            deps_by_origin.entry(t.origin_clid).or_default().push(t.clid);
        }
        let drafts: Vec<PurgeDraft> = deps_by_origin
            .into_iter()
            .map(|(clid, mut deps)| {
                deps.sort();
                deps.dedup();
                PurgeDraft {
                    clid,
                    reasons: vec![ClError::TriggerDepsFailed { deps }],
                }
            })
            .collect();
        let side_effect = self.add_cls_to_purge(&mut s, drafts, now)?;
        Ok(Transition::new(s, side_effect))
    }

    /// 定期実行の本体
    ///
    /// 1. 必要なら分類 → CL 読み込み → repartition
    /// 2. 期限の来た Component を triage して実行
    /// 3. 最も早い decision_time で次の pass を予約
    pub async fn exec_deferred(&self, s: State) -> Result<Transition, EngineError> {
        s.ensure_not_yet_cloned()?;
        if s.pb.status != ProjectStatus::Started {
            return Ok(Transition::state_only(s));
        }

        let mut s = s;
        let mut mutated = false;
        if s.pb.repartition_required || !s.pb.created_runs.is_empty() {
            s = s.clone_shallow(&[])?;
            mutated = true;
            let mut cat = s.categorize();
            self.load_active_into_pcls(&mut s, &mut cat).await?;
            let still_unloaded = cat.unloaded.len();
            s.repartition(&cat);
            if still_unloaded > 0 {
                // 依存の連鎖の残りは次の pass で読み込む
                s.pb.repartition_required = true;
            }
            debug!(
                project = %s.pb.project,
                components = s.pb.components.len(),
                pcls = s.pb.pcls.len(),
                still_unloaded,
                "repartitioned"
            );
        }

        let mut side_effect = None;
        let actions = match self.triage_components(&mut s).await {
            Ok(actions) => actions,
            Err(e) if mutated && e.kind() != ErrorKind::Invariant => {
                // repartition の結果は失わない
                warn!(project = %s.pb.project, error = %e, "triage failed, saving repartitioned state");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        if !actions.is_empty() {
            if mutated {
                s.add_log_reason(LogReason::TriageComponents);
            } else {
                s = s.clone_shallow(&[LogReason::TriageComponents])?;
                mutated = true;
            }
            side_effect = self.act_on_components(&mut s, actions).await?;
        }

        let now = self.clock.now();
        let next = if s.needs_pass_asap() {
            Some(now)
        } else {
            s.earliest_decision_time()
        };
        let mut dispatch = None;
        if let Some(next) = next {
            let eta = self.next_tick(next, now);
            if s.pb.next_eval_time != Some(eta) {
                if mutated {
                    s.add_log_reason(LogReason::NextEvalTimeChanged);
                } else {
                    s = s.clone_shallow(&[LogReason::NextEvalTimeChanged])?;
                }
                s.pb.next_eval_time = Some(eta);
                info!(project = %s.pb.project, eta = %eta, "next pass scheduled");
                dispatch = Some(SideEffect::Dispatch {
                    project: s.pb.project.clone(),
                    eta,
                });
            }
        }
        Ok(Transition::new(s, SideEffect::compose([side_effect, dispatch])))
    }

    /// eta を tick 単位に切り捨てて 1 tick 進める（clock drift より前にはしない）
    pub(crate) fn next_tick(&self, eta: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        let eta = eta.max(now + self.config.clock_drift());
        let tick = self.config.tick_interval().num_milliseconds().max(1);
        let ms = eta.timestamp_millis();
        let rounded = ms - ms.rem_euclid(tick) + tick;
        DateTime::<Utc>::from_timestamp_millis(rounded).unwrap_or(eta)
    }
}

/// 投票付与の記録を消してよいか
///
/// - PCL が無い、または意図した mode で投票済み → 消す
/// - まだ投票が無い → PCL の更新待ちなので残す
/// - 別の mode の投票が操作の開始前からある → PCL の更新待ちなので残す
/// - 別の mode の投票が操作の開始以降にある → 手動の上書きとみなして消す
pub(crate) fn should_remove_op(t: &TriggeringCl, pcl: Option<&Pcl>, max_duration: Duration) -> bool {
    let Some(pcl) = pcl else { return true };
    match &pcl.trigger {
        Some(tr) if tr.mode == t.mode => true,
        None => false,
        Some(tr) => tr.time >= t.deadline - max_duration,
    }
}
