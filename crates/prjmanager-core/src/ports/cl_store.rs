//! ClStore port - CL スナップショットの読み出し
//!
//! CL ストアとその更新パイプラインは外部の責務です。

use crate::domain::{ClId, Changelist, PortError};

#[async_trait::async_trait]
pub trait ClStore: Send + Sync {
    /// ids と同じ並びで CL を返す（存在しない CL は None）
    async fn get(&self, ids: &[ClId]) -> Result<Vec<Option<Changelist>>, PortError>;
}
