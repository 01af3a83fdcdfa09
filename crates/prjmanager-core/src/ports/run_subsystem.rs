//! RunSubsystem port - Run の実行系
//!
//! Run の開始・キャンセル・submit は外部の責務です。
//! Project Manager は作成依頼と通知だけを行います。

use crate::domain::{PortError, RunId, RunSpec};

#[async_trait::async_trait]
pub trait RunSubsystem: Send + Sync {
    /// Run を作成する
    ///
    /// CL の版数が spec と食い違う場合は `PortError::Rejected` を返してよい。
    /// 同じ id の依頼は何度来ても 1 つの Run として扱うこと。
    async fn create_run(&self, spec: &RunSpec) -> Result<(), PortError>;

    async fn cancel_run(&self, id: RunId, reason: &str) -> Result<(), PortError>;

    async fn update_run_config(&self, id: RunId, hash: &str, eversion: u64)
    -> Result<(), PortError>;

    /// Run に状態の再確認を促す
    async fn poke_run(&self, id: RunId) -> Result<(), PortError>;

    /// ids のうち、まだ終了していない Run を返す
    async fn incomplete_runs(&self, ids: &[RunId]) -> Result<Vec<RunId>, PortError>;
}
