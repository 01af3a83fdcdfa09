//! ProjectManagerBuilder - ProjectManager の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use crate::app::config::EngineConfig;
use crate::app::manager::ProjectManager;
use crate::ports::{
    ClPurger, ClStore, ClTriggerer, Clock, ComponentTriage, ConfigSource, DigestIdGenerator,
    IdGenerator, RunSubsystem, Scheduler, SnapshotStore, SystemClock,
};
use crate::state::{Effectors, Handler};
use crate::triager::DefaultTriager;
use std::sync::Arc;

/// ProjectManagerBuilder は ProjectManager を構築
///
/// # 使用例
/// ```ignore
/// let pm = ProjectManagerBuilder::new()
///     .cl_store(store)
///     .config_source(configs)
///     .run_subsystem(runs)
///     .purger(purger)
///     .triggerer(triggerer)
///     .scheduler(scheduler)
///     .snapshot_store(snapshots)
///     .build()?;
/// ```
///
/// # Fail-fast 設計
/// - 外部コラボレーターはすべて必須（triager / clock / id_generator だけは既定値あり）
/// - build() 時に不足している port と不正な設定値をまとめて報告する
#[derive(Default)]
pub struct ProjectManagerBuilder {
    cl_store: Option<Arc<dyn ClStore>>,
    config_source: Option<Arc<dyn ConfigSource>>,
    runs: Option<Arc<dyn RunSubsystem>>,
    purger: Option<Arc<dyn ClPurger>>,
    triggerer: Option<Arc<dyn ClTriggerer>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
    triager: Option<Arc<dyn ComponentTriage>>,
    clock: Option<Arc<dyn Clock>>,
    id_gen: Option<Arc<dyn IdGenerator>>,
    config: EngineConfig,
}

/// BuildError は ProjectManager 構築時のエラー
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BuildError {
    #[error("Missing ports: {0:?}. These collaborators must be provided before build().")]
    MissingPorts(Vec<&'static str>),

    #[error("Invalid engine config fields: {0:?}")]
    InvalidConfig(Vec<&'static str>),
}

impl ProjectManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cl_store(mut self, store: impl ClStore + 'static) -> Self {
        self.cl_store = Some(Arc::new(store));
        self
    }

    pub fn config_source(mut self, source: impl ConfigSource + 'static) -> Self {
        self.config_source = Some(Arc::new(source));
        self
    }

    pub fn run_subsystem(mut self, runs: impl RunSubsystem + 'static) -> Self {
        self.runs = Some(Arc::new(runs));
        self
    }

    pub fn purger(mut self, purger: impl ClPurger + 'static) -> Self {
        self.purger = Some(Arc::new(purger));
        self
    }

    pub fn triggerer(mut self, triggerer: impl ClTriggerer + 'static) -> Self {
        self.triggerer = Some(Arc::new(triggerer));
        self
    }

    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    pub fn snapshot_store(mut self, store: impl SnapshotStore + 'static) -> Self {
        self.snapshots = Some(Arc::new(store));
        self
    }

    /// 既定は `DefaultTriager`
    pub fn triager(mut self, triager: impl ComponentTriage + 'static) -> Self {
        self.triager = Some(Arc::new(triager));
        self
    }

    /// 既定は `SystemClock`
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// 既定は `DigestIdGenerator`
    pub fn id_generator(mut self, id_gen: impl IdGenerator + 'static) -> Self {
        self.id_gen = Some(Arc::new(id_gen));
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// 検証して ProjectManager を生成
    ///
    /// # 検証
    /// - 必須の port がすべて設定されているか（不足分は BuildError::MissingPorts）
    /// - EngineConfig の値が妥当か（BuildError::InvalidConfig）
    pub fn build(self) -> Result<ProjectManager, BuildError> {
        let mut missing = Vec::new();
        if self.cl_store.is_none() {
            missing.push("cl_store");
        }
        if self.config_source.is_none() {
            missing.push("config_source");
        }
        if self.runs.is_none() {
            missing.push("run_subsystem");
        }
        if self.purger.is_none() {
            missing.push("purger");
        }
        if self.triggerer.is_none() {
            missing.push("triggerer");
        }
        if self.scheduler.is_none() {
            missing.push("scheduler");
        }
        if self.snapshots.is_none() {
            missing.push("snapshot_store");
        }
        let (
            Some(cl_store),
            Some(config_source),
            Some(runs),
            Some(purger),
            Some(triggerer),
            Some(scheduler),
            Some(snapshots),
        ) = (
            self.cl_store,
            self.config_source,
            self.runs,
            self.purger,
            self.triggerer,
            self.scheduler,
            self.snapshots,
        )
        else {
            return Err(BuildError::MissingPorts(missing));
        };

        let invalid = self.config.invalid_fields();
        if !invalid.is_empty() {
            return Err(BuildError::InvalidConfig(invalid));
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let id_gen = self
            .id_gen
            .unwrap_or_else(|| Arc::new(DigestIdGenerator) as Arc<dyn IdGenerator>);
        let triager = self
            .triager
            .unwrap_or_else(|| Arc::new(DefaultTriager) as Arc<dyn ComponentTriage>);
        let effectors = Effectors {
            runs: Arc::clone(&runs),
            purger,
            triggerer,
            scheduler,
            concurrency: self.config.concurrency,
        };
        let handler = Handler::new(cl_store, config_source, runs, triager, clock, id_gen, self.config);
        Ok(ProjectManager::new(handler, effectors, snapshots))
    }
}
