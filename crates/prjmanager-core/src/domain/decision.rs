//! TriageDecision - Component triage の結果
//!
//! Triage は純粋関数として設計されます（副作用なし）。
//! 実際の Run 作成・purge・trigger は Action Executor が行います。

use crate::domain::cl::RunMode;
use crate::domain::component::Component;
use crate::domain::ids::ClId;
use crate::domain::pcl::ClError;
use std::sync::Arc;

/// RunDraft は作成すべき Run（ID はまだ無い）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDraft {
    pub config_group_index: usize,
    pub mode: RunMode,
    /// 昇順
    pub clids: Vec<ClId>,
}

/// PurgeDraft は投票を取り消すべき CL と理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeDraft {
    pub clid: ClId,
    pub reasons: Vec<ClError>,
}

/// TriggerDraft は投票を付けるべき依存 CL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerDraft {
    pub clid: ClId,
    pub origin_clid: ClId,
    pub mode: RunMode,
}

/// TriageDecision は 1 Component 分の判断
///
/// # 不変条件
/// - `new_value` は入力の Component とは別のオブジェクト（copy-on-write）
#[derive(Debug, Clone, Default)]
pub struct TriageDecision {
    pub new_value: Option<Arc<Component>>,
    pub runs_to_create: Vec<RunDraft>,
    pub cls_to_purge: Vec<PurgeDraft>,
    pub cls_to_trigger: Vec<TriggerDraft>,
}

impl TriageDecision {
    pub fn has_actions(&self) -> bool {
        !self.runs_to_create.is_empty()
            || !self.cls_to_purge.is_empty()
            || !self.cls_to_trigger.is_empty()
    }
}
