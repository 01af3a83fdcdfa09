//! PCL ("Project CL") - プロジェクトから見た 1 つの CL
//!
//! # 不変条件
//! - State 内の PCL は clid の昇順に並ぶ
//! - status が Unknown の PCL は eversion だけが分かっていて中身は未取得

use crate::domain::cl::{Dep, RunMode, Trigger};
use crate::domain::ids::ClId;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PclStatus {
    Ok,
    /// このプロジェクトの監視対象ではない（またはアクセスできない）
    Unwatched,
    /// CL ストアに存在しない
    Deleted,
    /// 版数は既知だが中身が未取得
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pcl {
    pub clid: ClId,
    pub eversion: u64,
    pub status: PclStatus,
    #[serde(default)]
    pub config_group_indexes: Vec<usize>,
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub submitted: bool,
    #[serde(default)]
    pub deps: Vec<Dep>,
    #[serde(default)]
    pub errors: Vec<ClError>,
}

impl Pcl {
    /// 中身を持たない PCL（Deleted / Unwatched / Unknown 用）
    pub fn bare(clid: ClId, eversion: u64, status: PclStatus) -> Self {
        Self {
            clid,
            eversion,
            status,
            config_group_indexes: Vec::new(),
            trigger: None,
            submitted: false,
            deps: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// 自身の投票だけで active になる PCL か
    pub fn is_standalone_active(&self) -> bool {
        self.status == PclStatus::Ok && self.trigger.is_some()
    }

    pub fn mode(&self) -> Option<RunMode> {
        self.trigger.as_ref().map(|t| t.mode)
    }
}

/// ClError は CL の投票を取り消す理由（ユーザーに表示される）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClError {
    #[error("CL owner has no contact email address")]
    OwnerLacksEmail,

    #[error("CL is watched by more than one config group: {groups:?}")]
    WatchedByManyConfigGroups { groups: Vec<String> },

    #[error("CL has too many dependencies: {actual} (max {max})")]
    TooManyDeps { actual: usize, max: usize },

    #[error("{0}")]
    InvalidDeps(InvalidDeps),

    #[error("failed to vote on dependencies: {}", join_clids(deps))]
    TriggerDepsFailed { deps: Vec<ClId> },
}

/// InvalidDeps は依存の不正をカテゴリごとにまとめたもの
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidDeps {
    #[serde(default)]
    pub unwatched: Vec<ClId>,
    #[serde(default)]
    pub wrong_config_group: Vec<ClId>,
    #[serde(default)]
    pub single_full_deps: Vec<ClId>,
    #[serde(default)]
    pub combinable_untriggered: Vec<ClId>,
    #[serde(default)]
    pub combinable_mismatched_mode: Vec<ClId>,
}

impl InvalidDeps {
    pub fn is_empty(&self) -> bool {
        self.unwatched.is_empty()
            && self.wrong_config_group.is_empty()
            && self.single_full_deps.is_empty()
            && self.combinable_untriggered.is_empty()
            && self.combinable_mismatched_mode.is_empty()
    }
}

impl fmt::Display for InvalidDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections = [
            ("dependency is not watched by this project", &self.unwatched),
            ("dependency belongs to another config group", &self.wrong_config_group),
            ("single full-run dependency not submitted", &self.single_full_deps),
            ("dependency must be triggered too", &self.combinable_untriggered),
            (
                "dependency is triggered in a different mode",
                &self.combinable_mismatched_mode,
            ),
        ];
        let mut first = true;
        for (message, clids) in sections {
            if clids.is_empty() {
                continue;
            }
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{message}: {}", join_clids(clids))?;
        }
        Ok(())
    }
}

fn join_clids(clids: &[ClId]) -> String {
    clids
        .iter()
        .map(ClId::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_deps_message_lists_only_present_categories() {
        let d = InvalidDeps {
            single_full_deps: vec![ClId(2)],
            unwatched: vec![ClId(3), ClId(4)],
            ..Default::default()
        };
        assert_eq!(
            ClError::InvalidDeps(d).to_string(),
            "dependency is not watched by this project: cl-3, cl-4; \
             single full-run dependency not submitted: cl-2"
        );
    }

    #[test]
    fn empty_invalid_deps() {
        assert!(InvalidDeps::default().is_empty());
    }
}
