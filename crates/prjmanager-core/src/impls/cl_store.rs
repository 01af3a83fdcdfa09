//! InMemoryClStore - 開発用の CL ストア

use crate::domain::{ClId, Changelist, PortError};
use crate::ports::ClStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// InMemoryClStore は CL スナップショットを HashMap に保持する
///
/// # 使用例
/// ```ignore
/// let store = InMemoryClStore::new();
/// store.put(cl);
/// let cls = store.get(&[ClId(1)]).await?;
/// ```
#[derive(Clone, Default)]
pub struct InMemoryClStore {
    cls: Arc<Mutex<HashMap<ClId, Changelist>>>,
    /// true の間は get が Unavailable を返す
    unavailable: Arc<Mutex<bool>>,
}

impl InMemoryClStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// CL を追加または置き換える（eversion は呼び出し側が増やす）
    pub fn put(&self, cl: Changelist) {
        self.cls.lock().unwrap().insert(cl.id, cl);
    }

    /// CL を 1 つ取り出して書き換え、eversion を 1 進める
    ///
    /// 更新後の eversion を返します。CL が無ければ None。
    pub fn update(&self, clid: ClId, f: impl FnOnce(&mut Changelist)) -> Option<u64> {
        let mut cls = self.cls.lock().unwrap();
        let cl = cls.get_mut(&clid)?;
        f(cl);
        cl.eversion += 1;
        Some(cl.eversion)
    }

    pub fn remove(&self, clid: ClId) {
        self.cls.lock().unwrap().remove(&clid);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

#[async_trait::async_trait]
impl ClStore for InMemoryClStore {
    async fn get(&self, ids: &[ClId]) -> Result<Vec<Option<Changelist>>, PortError> {
        if *self.unavailable.lock().unwrap() {
            return Err(PortError::unavailable("cl store", "store is down"));
        }
        let cls = self.cls.lock().unwrap();
        Ok(ids.iter().map(|id| cls.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cl(id: u64) -> Changelist {
        Changelist {
            id: ClId(id),
            eversion: 1,
            watched_by: vec!["p".to_string()],
            snapshot: None,
        }
    }

    #[tokio::test]
    async fn get_preserves_order_and_reports_missing() {
        let store = InMemoryClStore::new();
        store.put(cl(1));
        store.put(cl(3));
        let got = store.get(&[ClId(3), ClId(2), ClId(1)]).await.unwrap();
        let ids: Vec<Option<ClId>> = got.iter().map(|c| c.as_ref().map(|c| c.id)).collect();
        assert_eq!(ids, vec![Some(ClId(3)), None, Some(ClId(1))]);
    }

    #[tokio::test]
    async fn update_bumps_eversion() {
        let store = InMemoryClStore::new();
        store.put(cl(1));
        assert_eq!(store.update(ClId(1), |c| c.watched_by.clear()), Some(2));
        assert_eq!(store.update(ClId(9), |_| {}), None);
    }

    #[tokio::test]
    async fn unavailable_store_fails_transiently() {
        let store = InMemoryClStore::new();
        store.set_unavailable(true);
        let err = store.get(&[ClId(1)]).await.unwrap_err();
        assert!(matches!(err, PortError::Unavailable { .. }));
    }
}
