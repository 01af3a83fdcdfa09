//! State - reconciliation engine の本体
//!
//! `State` は永続化される `ProjectSnapshot` と、pass 中だけ使うキャッシュを持ちます。
//! ハンドラは State を受け取り、新しい State（copy-on-write）と
//! 任意の SideEffect を返します。
//!
//! # 所有権のルール
//! - ハンドラは State を値で受け取る（呼び出し側は元の State を使えない）
//! - `clone_shallow()` した State は consumed になり、以降の利用はエラー
//! - 変更が無いハンドラは受け取った State をそのまま返す
//!
//! # モジュール構成
//! - **cow**: CowList の copy-on-write 更新
//! - **graph**: CL の依存グラフと連結成分
//! - **categorize**: active / deps / unused / unloaded への分類と CL 読み込み
//! - **pcls**: CL スナップショットから PCL を作る
//! - **repartition**: 連結成分の再計算
//! - **runs**: 進行中の Run の追跡
//! - **operations**: purge / trigger 操作の記録
//! - **components**: triage と Action Executor
//! - **side_effect**: コミット後に実行する副作用
//! - **handler**: イベントハンドラ

pub mod cow;
pub mod graph;
pub mod categorize;
pub mod pcls;
pub mod repartition;
pub mod runs;
pub mod operations;
pub mod components;
pub mod side_effect;
pub mod handler;

#[cfg(test)]
pub(crate) mod testutil;

pub use self::categorize::Categorized;
pub use self::handler::{Handler, Transition};
pub use self::side_effect::{Effectors, SideEffect};

use crate::domain::{ClId, Component, ConfigMeta, CowList, EngineError, LogReason, Pcl, ProjectSnapshot};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct State {
    pb: ProjectSnapshot,
    already_cloned: bool,
    log_reasons: Vec<LogReason>,
    /// 現在の config_hash に対応する設定
    config: Option<Arc<ConfigMeta>>,
    /// clid -> components の index
    cl_to_component: Option<HashMap<ClId, usize>>,
}

impl State {
    pub fn new(pb: ProjectSnapshot) -> Self {
        Self {
            pb,
            already_cloned: false,
            log_reasons: Vec::new(),
            config: None,
            cl_to_component: None,
        }
    }

    pub fn snapshot(&self) -> &ProjectSnapshot {
        &self.pb
    }

    pub fn into_snapshot(self) -> ProjectSnapshot {
        self.pb
    }

    pub fn log_reasons(&self) -> &[LogReason] {
        &self.log_reasons
    }

    pub fn project(&self) -> &str {
        &self.pb.project
    }

    pub(crate) fn ensure_not_yet_cloned(&self) -> Result<(), EngineError> {
        if self.already_cloned {
            return Err(EngineError::StateReused);
        }
        Ok(())
    }

    /// トップレベルだけを複製した新しい State を返し、self を consumed にする
    pub(crate) fn clone_shallow(&mut self, reasons: &[LogReason]) -> Result<State, EngineError> {
        self.ensure_not_yet_cloned()?;
        self.already_cloned = true;
        let mut log_reasons = self.log_reasons.clone();
        for r in reasons {
            if !log_reasons.contains(r) {
                log_reasons.push(*r);
            }
        }
        Ok(State {
            pb: self.pb.clone(),
            already_cloned: false,
            log_reasons,
            config: self.config.clone(),
            cl_to_component: self.cl_to_component.clone(),
        })
    }

    pub(crate) fn add_log_reason(&mut self, reason: LogReason) {
        if !self.log_reasons.contains(&reason) {
            self.log_reasons.push(reason);
        }
    }

    /// PCL は clid 順なので二分探索で引ける
    pub fn pcl(&self, clid: ClId) -> Option<&Pcl> {
        self.pb
            .pcls
            .binary_search_by_key(&clid, |p| p.clid)
            .ok()
            .map(|i| self.pb.pcls[i].as_ref())
    }

    pub(crate) fn set_pcls(&mut self, pcls: CowList<Pcl>) {
        self.pb.pcls = pcls;
    }

    pub(crate) fn set_components(
        &mut self,
        components: CowList<Component>,
        index: Option<HashMap<ClId, usize>>,
    ) {
        self.pb.components = components;
        self.cl_to_component = index;
    }

    /// clid を含む Component の index（O(1)、必要なら再構築）
    pub(crate) fn component_of(&mut self, clid: ClId) -> Option<usize> {
        let components = &self.pb.components;
        self.cl_to_component
            .get_or_insert_with(|| component_index(components))
            .get(&clid)
            .copied()
    }

    /// 条件に合う Component を triage 対象にする
    pub(crate) fn mark_components_for_triage(&mut self, mut pred: impl FnMut(&Component) -> bool) {
        let updated = cow::update(&self.pb.components, |c| {
            if pred(c) && !c.triage_required {
                cow::Change::Replace(Component {
                    triage_required: true,
                    ..c.clone()
                })
            } else {
                cow::Change::Keep
            }
        });
        if let Some(components) = updated {
            // 並びは変わらないので index はそのまま使える
            self.pb.components = components;
        }
    }

    /// clids のどれかを含む Component を triage 対象にする
    pub(crate) fn mark_components_touching(&mut self, clids: &[ClId]) {
        let targets: Vec<usize> = clids.iter().filter_map(|&c| self.component_of(c)).collect();
        if targets.is_empty() {
            return;
        }
        let mut i = 0;
        self.mark_components_for_triage(|_| {
            let hit = targets.contains(&i);
            i += 1;
            hit
        });
    }
}

pub(crate) fn component_index(components: &[Arc<Component>]) -> HashMap<ClId, usize> {
    let mut index = HashMap::new();
    for (i, c) in components.iter().enumerate() {
        for &clid in &c.clids {
            index.insert(clid, i);
        }
    }
    index
}
