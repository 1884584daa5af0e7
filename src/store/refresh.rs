//! 群组整体刷新的结果聚合

use crate::groups::models::{Group, GroupAnalytics, GroupMember, GroupSettings};

/// 单个分支的结果，错误已转为可展示的文本
pub type Branch<T> = Result<T, String>;

/// 各分支结果写回快照的策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshPolicy {
    /// 任一分支失败则整体失败，快照保持不变
    #[default]
    AllOrNothing,
    /// 成功的分支照常写回，失败的分支只记录错误
    BestEffort,
}

/// `refresh_group` 的四个并发分支
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub group: Branch<Option<Group>>,
    pub members: Branch<Vec<GroupMember>>,
    pub settings: Branch<Option<GroupSettings>>,
    pub analytics: Branch<GroupAnalytics>,
}

impl RefreshOutcome {
    /// 所有分支都成功
    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    /// 失败的分支名与错误文本
    pub fn failures(&self) -> Vec<(&'static str, &str)> {
        let branches = [
            ("group", self.group.as_ref().err()),
            ("members", self.members.as_ref().err()),
            ("settings", self.settings.as_ref().err()),
            ("analytics", self.analytics.as_ref().err()),
        ];
        branches
            .into_iter()
            .filter_map(|(name, err)| err.map(|e| (name, e.as_str())))
            .collect()
    }

    /// 汇总后的错误文本，全部成功时为 None
    pub fn error_message(&self) -> Option<String> {
        let failures = self.failures();
        if failures.is_empty() {
            return None;
        }
        let parts: Vec<String> = failures
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect();
        Some(format!("Failed to refresh group ({})", parts.join("; ")))
    }

    /// 刷新后的群组记录；群组不存在或分支失败时为 None
    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref().ok().and_then(Option::as_ref)
    }
}
