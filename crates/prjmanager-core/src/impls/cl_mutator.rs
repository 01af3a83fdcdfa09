//! 投票の取り消し / 付与の依頼を記録するだけの実装

use crate::domain::{PortError, PurgeClTask, TriggerClTask};
use crate::ports::{ClPurger, ClTriggerer};
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct RecordingPurger {
    tasks: Arc<Mutex<Vec<PurgeClTask>>>,
}

impl RecordingPurger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<PurgeClTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClPurger for RecordingPurger {
    async fn schedule_purge(&self, task: &PurgeClTask) -> Result<(), PortError> {
        let mut tasks = self.tasks.lock().unwrap();
        // 同じ operation_id の依頼は 1 回だけ受け付ける
        if !tasks.iter().any(|t| t.purging.operation_id == task.purging.operation_id) {
            tasks.push(task.clone());
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingTriggerer {
    tasks: Arc<Mutex<Vec<TriggerClTask>>>,
}

impl RecordingTriggerer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> Vec<TriggerClTask> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ClTriggerer for RecordingTriggerer {
    async fn schedule_trigger(&self, task: &TriggerClTask) -> Result<(), PortError> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks
            .iter()
            .any(|t| t.triggering.operation_id == task.triggering.operation_id)
        {
            tasks.push(task.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClId, PurgingCl};
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn duplicate_operation_ids_are_ignored() {
        let purger = RecordingPurger::new();
        let deadline = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let task = PurgeClTask {
            project: "p".to_string(),
            purging: PurgingCl::new(ClId(1), deadline),
        };
        purger.schedule_purge(&task).await.unwrap();
        purger.schedule_purge(&task).await.unwrap();
        assert_eq!(purger.tasks().len(), 1);
    }
}
