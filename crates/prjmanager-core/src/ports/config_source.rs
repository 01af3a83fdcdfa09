//! ConfigSource port - プロジェクト設定の読み出し

use crate::domain::{ConfigMeta, PortError};

#[async_trait::async_trait]
pub trait ConfigSource: Send + Sync {
    /// 最新の設定（存在しないプロジェクトは status = NotExists）
    async fn get_latest_meta(&self, project: &str) -> Result<ConfigMeta, PortError>;

    /// hash を指定して過去の設定を取得
    async fn get_by_hash(&self, project: &str, hash: &str)
    -> Result<Option<ConfigMeta>, PortError>;
}
