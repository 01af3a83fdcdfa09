//! ComponentTriage port - Component ごとの判断
//!
//! # 設計原則
//! - 純粋関数（component + 読み取り専用ビュー + 現在時刻 → TriageDecision）
//! - 副作用なし（実行は Action Executor に任せる）
//! - Component ごとに独立したタスクで実行される

use crate::domain::{Component, EngineError, ProjectView, TriageDecision};
use chrono::{DateTime, Utc};

pub trait ComponentTriage: Send + Sync {
    fn triage(
        &self,
        component: &Component,
        view: &ProjectView,
        now: DateTime<Utc>,
    ) -> Result<TriageDecision, EngineError>;
}
