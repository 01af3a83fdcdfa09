//! InMemoryScheduler - 開発用の pass 予約
//!
//! # 実装詳細
//! - (project, eta) の組で重複を除く
//! - `take_due(now)` で期限の来た予約を eta 順に取り出す

use crate::domain::PortError;
use crate::ports::Scheduler;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct InMemoryScheduler {
    /// (eta, project)
    pending: Arc<Mutex<BTreeSet<(DateTime<Utc>, String)>>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 予約中の eta（project ごと、昇順）
    pub fn pending(&self, project: &str) -> Vec<DateTime<Utc>> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p == project)
            .map(|(eta, _)| *eta)
            .collect()
    }

    /// 最も早い予約の eta
    pub fn next_eta(&self) -> Option<DateTime<Utc>> {
        self.pending.lock().unwrap().first().map(|(eta, _)| *eta)
    }

    /// now までに期限の来た予約を取り出す（同じ project は 1 回にまとめる）
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut pending = self.pending.lock().unwrap();
        let mut projects = Vec::new();
        while let Some((eta, project)) = pending.first().cloned() {
            if eta > now {
                break;
            }
            pending.pop_first();
            if !projects.contains(&project) {
                projects.push(project);
            }
        }
        projects
    }
}

#[async_trait::async_trait]
impl Scheduler for InMemoryScheduler {
    async fn dispatch(&self, project: &str, eta: DateTime<Utc>) -> Result<(), PortError> {
        self.pending.lock().unwrap().insert((eta, project.to_string()));
        Ok(())
    }
}
