//! Project config metadata - 設定サブシステムから受け取る設定
//!
//! 設定の読み込み・検証は外部の責務です。ここでは Project Manager が
//! 判断に使う部分（config group と CL のマッチング）だけを扱います。

use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigStatus {
    Enabled,
    Disabled,
    NotExists,
}

/// CombineCls が設定された config group では、依存し合う CL をまとめて 1 つの Run にする
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombineCls {
    /// 投票が出揃うまで待つ時間（秒）
    pub stabilization_delay_secs: i64,
}

impl CombineCls {
    pub fn stabilization_delay(&self) -> Duration {
        Duration::seconds(self.stabilization_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigGroup {
    pub name: String,
    /// 監視対象のリポジトリ名
    pub repos: Vec<String>,
    /// 監視対象の ref プレフィックス（例: "refs/heads/"）
    pub ref_prefixes: Vec<String>,
    /// 他の group にマッチしなかった場合だけ使う group
    #[serde(default)]
    pub fallback: bool,
    #[serde(default)]
    pub combine_cls: Option<CombineCls>,
    /// FULL_RUN の CL の未 submit 依存に FULL_RUN の投票を付けに行くか
    #[serde(default)]
    pub trigger_deps: bool,
}

impl ConfigGroup {
    fn matches(&self, repo: &str, git_ref: &str) -> bool {
        self.repos.iter().any(|r| r == repo)
            && self.ref_prefixes.iter().any(|p| git_ref.starts_with(p.as_str()))
    }
}

/// ConfigMeta は GetLatestMeta / 過去の hash 指定で得られる設定のメタ情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMeta {
    pub project: String,
    pub status: ConfigStatus,
    pub hash: String,
    pub eversion: u64,
    #[serde(default)]
    pub config_groups: Vec<ConfigGroup>,
}

impl ConfigMeta {
    pub fn group_names(&self) -> Vec<String> {
        self.config_groups.iter().map(|g| g.name.clone()).collect()
    }

    /// repo/ref にマッチする config group の index を返す
    ///
    /// fallback でない group がマッチした場合、fallback group は除外されます。
    pub fn match_groups(&self, repo: &str, git_ref: &str) -> Vec<usize> {
        let matched: Vec<usize> = self
            .config_groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.matches(repo, git_ref))
            .map(|(i, _)| i)
            .collect();
        let non_fallback: Vec<usize> = matched
            .iter()
            .copied()
            .filter(|&i| !self.config_groups[i].fallback)
            .collect();
        if non_fallback.is_empty() {
            matched
        } else {
            non_fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn group(name: &str, prefix: &str, fallback: bool) -> ConfigGroup {
        ConfigGroup {
            name: name.to_string(),
            repos: vec!["repo/a".to_string()],
            ref_prefixes: vec![prefix.to_string()],
            fallback,
            combine_cls: None,
            trigger_deps: false,
        }
    }

    fn meta(groups: Vec<ConfigGroup>) -> ConfigMeta {
        ConfigMeta {
            project: "chromium".to_string(),
            status: ConfigStatus::Enabled,
            hash: "h1".to_string(),
            eversion: 1,
            config_groups: groups,
        }
    }

    #[rstest]
    #[case::main_only("refs/heads/main", true, vec![0])]
    #[case::fallback_used("refs/heads/other", true, vec![1])]
    #[case::both_without_fallback("refs/heads/main", false, vec![0, 1])]
    #[case::unmatched_ref("refs/meta/config", true, vec![])]
    fn match_groups_prefers_non_fallback(
        #[case] git_ref: &str,
        #[case] fallback: bool,
        #[case] expected: Vec<usize>,
    ) {
        let m = meta(vec![
            group("g0", "refs/heads/main", false),
            group("g1", "refs/heads/", fallback),
        ]);
        assert_eq!(m.match_groups("repo/a", git_ref), expected);
    }

    #[test]
    fn other_repo_is_not_matched() {
        let m = meta(vec![group("g0", "refs/heads/", false)]);
        assert!(m.match_groups("repo/b", "refs/heads/main").is_empty());
    }
}
