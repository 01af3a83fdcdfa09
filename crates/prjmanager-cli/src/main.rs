use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use prjmanager_core::app::{EngineConfig, ProjectManager, ProjectManagerBuilder};
use prjmanager_core::domain::{
    ChangeStatus, ClId, ClSnapshot, ClUpdate, Changelist, CombineCls, ConfigGroup, ConfigMeta,
    ConfigStatus, Dep, Event, PortError, PurgeClTask, RunMode, Trigger,
};
use prjmanager_core::impls::{
    FakeRunSubsystem, InMemoryClStore, InMemoryConfigSource, InMemoryScheduler,
    InMemorySnapshotStore, RecordingTriggerer,
};
use prjmanager_core::observability::ProjectCounts;
use prjmanager_core::ports::{ClPurger, FixedClock};

const PROJECT: &str = "demo";
const REPO: &str = "infra/demo";

/// purger：依頼を受けたら CL の投票を消し、完了を後で通知する
#[derive(Clone)]
struct DemoPurger {
    store: InMemoryClStore,
    completed: Arc<std::sync::Mutex<Vec<(String, ClUpdate)>>>,
}

#[async_trait]
impl ClPurger for DemoPurger {
    async fn schedule_purge(&self, task: &PurgeClTask) -> Result<(), PortError> {
        let reasons: Vec<String> = task.purging.reasons.iter().map(ToString::to_string).collect();
        info!(clid = %task.purging.clid, reasons = ?reasons, "removing vote");
        let clid = task.purging.clid;
        let eversion = self
            .store
            .update(clid, |cl| {
                if let Some(s) = cl.snapshot.as_mut() {
                    s.trigger = None;
                }
            })
            .ok_or_else(|| PortError::rejected("purger", format!("{clid} not found")))?;
        self.completed
            .lock()
            .map_err(|_| PortError::unavailable("purger", "poisoned"))?
            .push((task.purging.operation_id.clone(), ClUpdate { clid, eversion }));
        Ok(())
    }
}

fn group(name: &str, prefix: &str, combine: Option<i64>) -> ConfigGroup {
    ConfigGroup {
        name: name.to_string(),
        repos: vec![REPO.to_string()],
        ref_prefixes: vec![prefix.to_string()],
        fallback: false,
        combine_cls: combine.map(|secs| CombineCls {
            stabilization_delay_secs: secs,
        }),
        trigger_deps: false,
    }
}

fn cl(clid: u64, git_ref: &str, mode: Option<RunMode>, deps: &[u64], at: DateTime<Utc>) -> Changelist {
    Changelist {
        id: ClId(clid),
        eversion: 1,
        watched_by: vec![PROJECT.to_string()],
        snapshot: Some(ClSnapshot {
            project: PROJECT.to_string(),
            repo: REPO.to_string(),
            git_ref: git_ref.to_string(),
            status: ChangeStatus::New,
            owner_email: Some("dev@example.com".to_string()),
            trigger: mode.map(|mode| Trigger {
                email: "dev@example.com".to_string(),
                account_id: 7,
                mode,
                time: at,
            }),
            deps: deps.iter().map(|&d| Dep::hard(d)).collect(),
        }),
    }
}

fn load_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// 予約された pass を時計を進めながら実行する
async fn drain(
    pm: &ProjectManager,
    scheduler: &InMemoryScheduler,
    clock: &FixedClock,
    max_passes: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    for _ in 0..max_passes {
        let Some(eta) = scheduler.next_eta() else {
            break;
        };
        clock.set(eta);
        for project in scheduler.take_due(eta) {
            pm.handle(&project, &[]).await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config()?;
    let t0 = Utc::now();
    let clock = FixedClock::new(t0);

    // (A) 設定と CL を用意
    let configs = InMemoryConfigSource::new();
    configs.put(ConfigMeta {
        project: PROJECT.to_string(),
        status: ConfigStatus::Enabled,
        hash: "cfg-1".to_string(),
        eversion: 1,
        config_groups: vec![
            group("main", "refs/heads/main", None),
            group("release", "refs/heads/release", Some(30)),
        ],
    });
    let store = InMemoryClStore::new();
    // 単独の dry run
    store.put(cl(101, "refs/heads/main", Some(RunMode::DryRun), &[], t0));
    // 未 submit の依存を持つ full run（投票は取り消される）
    store.put(cl(102, "refs/heads/main", Some(RunMode::FullRun), &[103], t0));
    store.put(cl(103, "refs/heads/main", None, &[], t0));
    // まとめて検証する 2 つの CL
    store.put(cl(201, "refs/heads/release", Some(RunMode::DryRun), &[], t0));
    store.put(cl(202, "refs/heads/release", Some(RunMode::DryRun), &[201], t0));

    // (B) ProjectManager を組み立てる
    let runs = FakeRunSubsystem::new();
    let scheduler = InMemoryScheduler::new();
    let snapshots = InMemorySnapshotStore::new();
    let purger = DemoPurger {
        store: store.clone(),
        completed: Arc::default(),
    };
    let pm = ProjectManagerBuilder::new()
        .cl_store(store.clone())
        .config_source(configs.clone())
        .run_subsystem(runs.clone())
        .purger(purger.clone())
        .triggerer(RecordingTriggerer::new())
        .scheduler(scheduler.clone())
        .snapshot_store(snapshots.clone())
        .clock(clock.clone())
        .config(config)
        .build()?;

    // (C) 設定の有効化と CL の更新通知
    let updates = [101, 102, 103, 201, 202]
        .map(|clid| ClUpdate {
            clid: ClId(clid),
            eversion: 1,
        })
        .to_vec();
    pm.handle(PROJECT, &[Event::UpdateConfig, Event::ClsUpdated { cls: updates }])
        .await?;
    drain(&pm, &scheduler, &clock, 10).await?;

    // (D) purge の完了と、投票が消えた CL の更新を届ける
    let completed: Vec<(String, ClUpdate)> = purger
        .completed
        .lock()
        .map(|mut c| std::mem::take(&mut *c))
        .unwrap_or_default();
    if !completed.is_empty() {
        let (operation_ids, cls): (Vec<String>, Vec<ClUpdate>) = completed.into_iter().unzip();
        pm.handle(
            PROJECT,
            &[
                Event::PurgesCompleted { operation_ids },
                Event::ClsUpdated { cls },
            ],
        )
        .await?;
    }

    // (E) Run がすべて終わったことにする
    clock.advance(Duration::minutes(5));
    let run_ids: Vec<_> = runs.created().iter().map(|r| r.id).collect();
    for id in &run_ids {
        runs.finish(*id);
    }
    info!(runs = run_ids.len(), "finishing runs");
    pm.handle(PROJECT, &[Event::RunsFinished { run_ids }]).await?;
    drain(&pm, &scheduler, &clock, 10).await?;

    // (F) 最終状態を表示
    let Some(snapshot) = snapshots.get(PROJECT) else {
        return Err("project state was never saved".into());
    };
    println!("counts: {}", serde_json::to_string(&ProjectCounts::from_snapshot(&snapshot))?);
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
