//! InMemorySnapshotStore - 開発用のスナップショット保存先

use crate::domain::{PortError, ProjectSnapshot};
use crate::ports::SnapshotStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// clone したものは同じ保存先を共有します。
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<Mutex<HashMap<String, ProjectSnapshot>>>,
    saves: Arc<Mutex<usize>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, project: &str) -> Option<ProjectSnapshot> {
        self.snapshots.lock().unwrap().get(project).cloned()
    }

    /// save が呼ばれた回数
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, project: &str) -> Result<Option<ProjectSnapshot>, PortError> {
        Ok(self.get(project))
    }

    async fn save(&self, snapshot: &ProjectSnapshot) -> Result<(), PortError> {
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.project.clone(), snapshot.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}
