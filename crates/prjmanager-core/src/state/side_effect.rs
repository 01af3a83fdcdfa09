//! Side effects - State のコミット後に実行する通知・予約
//!
//! どの副作用も operation_id や (project, eta) で冪等になっているので、
//! pass がリトライされても重複して害が出ることはありません。

use crate::domain::{EngineError, PortError, PurgeClTask, RunId, TriggerClTask};
use crate::ports::{ClPurger, ClTriggerer, RunSubsystem, Scheduler};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// 進行中の Run に新しい設定を知らせる
    UpdateIncompleteRunsConfig {
        run_ids: Vec<RunId>,
        hash: String,
        eversion: u64,
    },
    CancelIncompleteRuns {
        run_ids: Vec<RunId>,
        reason: String,
    },
    PokeRuns {
        run_ids: Vec<RunId>,
    },
    SchedulePurges {
        tasks: Vec<PurgeClTask>,
    },
    ScheduleTriggers {
        tasks: Vec<TriggerClTask>,
    },
    /// 次の pass を予約する
    Dispatch {
        project: String,
        eta: DateTime<Utc>,
    },
    /// 順番に実行する（入れ子にはならない）
    Composite(Vec<SideEffect>),
}

/// Effectors は副作用の実行先
#[derive(Clone)]
pub struct Effectors {
    pub runs: Arc<dyn RunSubsystem>,
    pub purger: Arc<dyn ClPurger>,
    pub triggerer: Arc<dyn ClTriggerer>,
    pub scheduler: Arc<dyn Scheduler>,
    pub concurrency: usize,
}

impl SideEffect {
    /// 複数の副作用を 1 つにまとめる（Composite は平らにする）
    pub fn compose(items: impl IntoIterator<Item = Option<SideEffect>>) -> Option<SideEffect> {
        let mut flat = Vec::new();
        for item in items.into_iter().flatten() {
            match item {
                SideEffect::Composite(inner) => flat.extend(inner),
                leaf => flat.push(leaf),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(SideEffect::Composite(flat)),
        }
    }

    pub fn leaves(&self) -> Vec<&SideEffect> {
        match self {
            SideEffect::Composite(items) => items.iter().flat_map(SideEffect::leaves).collect(),
            leaf => vec![leaf],
        }
    }

    /// 副作用を実行する
    ///
    /// Composite は先頭から順に実行し、最初のエラーで止まります。
    pub async fn apply(&self, fx: &Effectors) -> Result<(), EngineError> {
        for leaf in self.leaves() {
            leaf.apply_leaf(fx).await?;
        }
        Ok(())
    }

    async fn apply_leaf(&self, fx: &Effectors) -> Result<(), EngineError> {
        match self {
            SideEffect::UpdateIncompleteRunsConfig {
                run_ids,
                hash,
                eversion,
            } => {
                let eversion = *eversion;
                for_each_run(fx, run_ids, |runs, id| {
                    let hash = hash.clone();
                    async move { runs.update_run_config(id, &hash, eversion).await }
                })
                .await
            }
            SideEffect::CancelIncompleteRuns { run_ids, reason } => {
                for_each_run(fx, run_ids, |runs, id| {
                    let reason = reason.clone();
                    async move { runs.cancel_run(id, &reason).await }
                })
                .await
            }
            SideEffect::PokeRuns { run_ids } => {
                for_each_run(fx, run_ids, |runs, id| async move { runs.poke_run(id).await }).await
            }
            SideEffect::SchedulePurges { tasks } => {
                for t in tasks {
                    fx.purger.schedule_purge(t).await?;
                    debug!(clid = %t.purging.clid, operation_id = %t.purging.operation_id, "purge scheduled");
                }
                Ok(())
            }
            SideEffect::ScheduleTriggers { tasks } => {
                for t in tasks {
                    fx.triggerer.schedule_trigger(t).await?;
                    debug!(clid = %t.triggering.clid, operation_id = %t.triggering.operation_id, "trigger scheduled");
                }
                Ok(())
            }
            SideEffect::Dispatch { project, eta } => {
                fx.scheduler.dispatch(project, *eta).await?;
                Ok(())
            }
            SideEffect::Composite(_) => Err(EngineError::Invariant(
                "nested composite side effect".to_string(),
            )),
        }
    }
}

/// Run ごとの通知を並列に送る（並列数は fx.concurrency まで）
async fn for_each_run<F, Fut>(fx: &Effectors, run_ids: &[RunId], f: F) -> Result<(), EngineError>
where
    F: Fn(Arc<dyn RunSubsystem>, RunId) -> Fut,
    Fut: Future<Output = Result<(), PortError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(fx.concurrency.max(1)));
    let mut set = JoinSet::new();
    for &id in run_ids {
        let fut = f(Arc::clone(&fx.runs), id);
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            (id, fut.await)
        });
    }
    let mut first_err = None;
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok((id, Err(e))) => {
                warn!(run = %id, error = %e, "failed to notify run");
                first_err.get_or_insert(EngineError::from(e));
            }
            Err(e) => {
                first_err.get_or_insert(EngineError::Invariant(format!("run notification task failed: {e}")));
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}
