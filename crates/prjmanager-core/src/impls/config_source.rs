//! InMemoryConfigSource - 開発用の設定ストア
//!
//! プロジェクトごとに設定の履歴を持ち、最後に追加したものが最新です。

use crate::domain::{ConfigMeta, ConfigStatus, PortError};
use crate::ports::ConfigSource;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct InMemoryConfigSource {
    history: Arc<Mutex<HashMap<String, Vec<ConfigMeta>>>>,
}

impl InMemoryConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新しい設定を最新として登録する
    pub fn put(&self, meta: ConfigMeta) {
        self.history
            .lock()
            .unwrap()
            .entry(meta.project.clone())
            .or_default()
            .push(meta);
    }

    /// 最新の設定を status だけ変えて登録し直す
    pub fn set_status(&self, project: &str, status: ConfigStatus) {
        let mut history = self.history.lock().unwrap();
        let list = history.entry(project.to_string()).or_default();
        let next = match list.last() {
            Some(latest) => ConfigMeta {
                status,
                ..latest.clone()
            },
            None => ConfigMeta {
                status,
                ..not_exists(project)
            },
        };
        list.push(next);
    }
}

fn not_exists(project: &str) -> ConfigMeta {
    ConfigMeta {
        project: project.to_string(),
        status: ConfigStatus::NotExists,
        hash: String::new(),
        eversion: 0,
        config_groups: Vec::new(),
    }
}

#[async_trait::async_trait]
impl ConfigSource for InMemoryConfigSource {
    async fn get_latest_meta(&self, project: &str) -> Result<ConfigMeta, PortError> {
        let history = self.history.lock().unwrap();
        Ok(history
            .get(project)
            .and_then(|l| l.last())
            .cloned()
            .unwrap_or_else(|| not_exists(project)))
    }

    async fn get_by_hash(&self, project: &str, hash: &str) -> Result<Option<ConfigMeta>, PortError> {
        let history = self.history.lock().unwrap();
        Ok(history
            .get(project)
            .and_then(|l| l.iter().rev().find(|m| m.hash == hash))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(hash: &str) -> ConfigMeta {
        ConfigMeta {
            hash: hash.to_string(),
            status: ConfigStatus::Enabled,
            eversion: 1,
            ..not_exists("p")
        }
    }

    #[tokio::test]
    async fn unknown_project_does_not_exist() {
        let src = InMemoryConfigSource::new();
        let m = src.get_latest_meta("p").await.unwrap();
        assert_eq!(m.status, ConfigStatus::NotExists);
    }

    #[tokio::test]
    async fn latest_and_by_hash() {
        let src = InMemoryConfigSource::new();
        src.put(meta("h1"));
        src.put(meta("h2"));
        assert_eq!(src.get_latest_meta("p").await.unwrap().hash, "h2");
        assert!(src.get_by_hash("p", "h1").await.unwrap().is_some());
        assert!(src.get_by_hash("p", "h3").await.unwrap().is_none());

        src.set_status("p", ConfigStatus::Disabled);
        let latest = src.get_latest_meta("p").await.unwrap();
        assert_eq!((latest.hash.as_str(), latest.status), ("h2", ConfigStatus::Disabled));
    }
}
