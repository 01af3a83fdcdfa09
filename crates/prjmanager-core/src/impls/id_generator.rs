//! SequentialIdGenerator - テスト用の読みやすい Run ID

use crate::domain::{RunId, RunKey};
use crate::ports::IdGenerator;
use std::collections::HashMap;
use std::sync::Mutex;
use ulid::Ulid;

/// 初めて見た key から順に 1, 2, 3, ... を払い出す
///
/// 同じ key には前と同じ ID を返します。
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    issued: Mutex<HashMap<[u8; 32], RunId>>,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn run_id(&self, key: &RunKey<'_>) -> RunId {
        let mut issued = self.issued.lock().unwrap();
        let next = issued.len() as u64 + 1;
        *issued
            .entry(key.digest())
            .or_insert_with(|| RunId::from_ulid(Ulid::from_parts(next, 0)))
    }
}
