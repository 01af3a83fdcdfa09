//! Scheduler port - 次の reconciliation pass の予約
//!
//! (project, eta) の組で重複排除するのは実装側の責務です。

use crate::domain::PortError;
use chrono::{DateTime, Utc};

#[async_trait::async_trait]
pub trait Scheduler: Send + Sync {
    /// eta 以降に project の pass を実行するよう予約する
    async fn dispatch(&self, project: &str, eta: DateTime<Utc>) -> Result<(), PortError>;
}
