//! ClPurger / ClTriggerer ports - CL の投票を変更する実行系
//!
//! どちらも完了は非同期に `Event::PurgesCompleted` /
//! `Event::TriggeringClsCompleted` で operation_id をキーに通知されます。

use crate::domain::{PortError, PurgeClTask, TriggerClTask};

#[async_trait::async_trait]
pub trait ClPurger: Send + Sync {
    async fn schedule_purge(&self, task: &PurgeClTask) -> Result<(), PortError>;
}

#[async_trait::async_trait]
pub trait ClTriggerer: Send + Sync {
    async fn schedule_trigger(&self, task: &TriggerClTask) -> Result<(), PortError>;
}
