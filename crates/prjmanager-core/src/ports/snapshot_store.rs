//! SnapshotStore port - ProjectSnapshot の正本（source of truth）
//!
//! # 設計原則
//! - 1 プロジェクトの pass は同時に 1 つだけ（排他はディスパッチ層の責務）
//! - 副作用は save が成功した後にだけ実行される

use crate::domain::{PortError, ProjectSnapshot};

#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// 保存済みのスナップショット（まだ無ければ None）
    async fn load(&self, project: &str) -> Result<Option<ProjectSnapshot>, PortError>;

    async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), PortError>;
}
