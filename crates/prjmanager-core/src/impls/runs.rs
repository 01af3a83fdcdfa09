//! FakeRunSubsystem - 呼び出しを記録する Run サブシステム

use crate::domain::{PortError, RunId, RunSpec};
use crate::ports::RunSubsystem;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// RunCall は FakeRunSubsystem が受けた呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunCall {
    Create(RunId),
    Cancel(RunId, String),
    UpdateConfig(RunId, String, u64),
    Poke(RunId),
}

/// FakeRunSubsystem は作成された Run を覚えておき、終了したものを区別する
///
/// # 実装詳細
/// - `created`: 作成に成功した RunSpec（同じ id の依頼は 1 つにまとめる）
/// - `finished`: `finish()` で終了扱いにした Run
/// - `fail_creates` が true の間、create_run は Rejected を返す
#[derive(Clone, Default)]
pub struct FakeRunSubsystem {
    calls: Arc<Mutex<Vec<RunCall>>>,
    created: Arc<Mutex<Vec<RunSpec>>>,
    finished: Arc<Mutex<HashSet<RunId>>>,
    fail_creates: Arc<Mutex<bool>>,
}

impl FakeRunSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RunCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<RunSpec> {
        self.created.lock().unwrap().clone()
    }

    pub fn finish(&self, id: RunId) {
        self.finished.lock().unwrap().insert(id);
    }

    pub fn fail_creates(&self, fail: bool) {
        *self.fail_creates.lock().unwrap() = fail;
    }

    fn record(&self, call: RunCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait::async_trait]
impl RunSubsystem for FakeRunSubsystem {
    async fn create_run(&self, spec: &RunSpec) -> Result<(), PortError> {
        self.record(RunCall::Create(spec.id));
        if *self.fail_creates.lock().unwrap() {
            return Err(PortError::rejected("runs", "run creation disabled"));
        }
        let mut created = self.created.lock().unwrap();
        if !created.iter().any(|c| c.id == spec.id) {
            created.push(spec.clone());
        }
        Ok(())
    }

    async fn cancel_run(&self, id: RunId, reason: &str) -> Result<(), PortError> {
        self.record(RunCall::Cancel(id, reason.to_string()));
        Ok(())
    }

    async fn update_run_config(&self, id: RunId, hash: &str, eversion: u64) -> Result<(), PortError> {
        self.record(RunCall::UpdateConfig(id, hash.to_string(), eversion));
        Ok(())
    }

    async fn poke_run(&self, id: RunId) -> Result<(), PortError> {
        self.record(RunCall::Poke(id));
        Ok(())
    }

    async fn incomplete_runs(&self, ids: &[RunId]) -> Result<Vec<RunId>, PortError> {
        let finished = self.finished.lock().unwrap();
        Ok(ids.iter().copied().filter(|id| !finished.contains(id)).collect())
    }
}
