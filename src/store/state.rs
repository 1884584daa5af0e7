//! 状态快照
//!
//! `GroupState` 是 store 持有的唯一内存副本。读取方通过
//! [`GroupStore::snapshot`](crate::store::GroupStore::snapshot) 拿到克隆，不直接持有锁。

use crate::chat::models::{ChatAnalytics, ChatMember, ChatMessage, ChatSettings};
use crate::groups::models::{Group, GroupAnalytics, GroupInvitation, GroupMember, GroupSettings};

/// 错误槽所属的领域，群组侧与群聊侧互不覆盖
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Domain {
    Group,
    Chat,
}

#[derive(Debug, Clone, Default)]
pub struct GroupState {
    pub current_user_id: Option<String>,

    pub groups: Vec<Group>,
    pub current_group: Option<Group>,
    pub members: Vec<GroupMember>,
    pub settings: Option<GroupSettings>,
    pub invitations: Vec<GroupInvitation>,
    pub analytics: Option<GroupAnalytics>,
    pub search_results: Vec<Group>,
    pub group_error: Option<String>,

    /// 当前打开的群聊
    pub chat_group_id: Option<String>,
    /// 新消息在前
    pub messages: Vec<ChatMessage>,
    pub has_more_messages: bool,
    pub chat_members: Vec<ChatMember>,
    pub chat_settings: Option<ChatSettings>,
    pub chat_analytics: Option<ChatAnalytics>,
    pub unread_count: u64,
    pub chat_error: Option<String>,

    /// 每次变更递增
    pub version: u64,

    group_ops: u32,
    chat_ops: u32,
}

impl GroupState {
    pub(crate) fn for_user(user_id: Option<String>) -> Self {
        Self {
            current_user_id: user_id,
            ..Default::default()
        }
    }

    /// 群组侧是否有进行中的动作
    pub fn is_loading(&self) -> bool {
        self.group_ops > 0
    }

    /// 群聊侧是否有进行中的动作
    pub fn is_chat_loading(&self) -> bool {
        self.chat_ops > 0
    }

    pub fn error(&self, domain: Domain) -> Option<&str> {
        match domain {
            Domain::Group => self.group_error.as_deref(),
            Domain::Chat => self.chat_error.as_deref(),
        }
    }

    pub fn is_current(&self, group_id: &str) -> bool {
        self.current_group.as_ref().is_some_and(|g| g.id == group_id)
    }

    pub fn is_chat_open(&self, group_id: &str) -> bool {
        self.chat_group_id.as_deref() == Some(group_id)
    }

    /// 最旧的已加载消息，作为向前翻页的游标
    pub fn oldest_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub(crate) fn touch(&mut self) {
        self.version += 1;
    }

    /// 动作开始：计数加一，清空本领域的错误
    pub(crate) fn begin(&mut self, domain: Domain) {
        match domain {
            Domain::Group => {
                self.group_ops += 1;
                self.group_error = None;
            }
            Domain::Chat => {
                self.chat_ops += 1;
                self.chat_error = None;
            }
        }
        self.touch();
    }

    /// 动作结束：无论成败都会执行
    pub(crate) fn end(&mut self, domain: Domain, error: Option<String>) {
        match domain {
            Domain::Group => {
                self.group_ops = self.group_ops.saturating_sub(1);
                if error.is_some() {
                    self.group_error = error;
                }
            }
            Domain::Chat => {
                self.chat_ops = self.chat_ops.saturating_sub(1);
                if error.is_some() {
                    self.chat_error = error;
                }
            }
        }
        self.touch();
    }

    pub(crate) fn clear_error(&mut self, domain: Domain) {
        match domain {
            Domain::Group => self.group_error = None,
            Domain::Chat => self.chat_error = None,
        }
        self.touch();
    }

    /// 按 ID 原地替换群组记录（列表、当前群组、搜索结果）
    pub(crate) fn replace_group(&mut self, group: &Group) {
        for slot in self
            .groups
            .iter_mut()
            .chain(self.search_results.iter_mut())
            .filter(|g| g.id == group.id)
        {
            *slot = group.clone();
        }
        if self.is_current(&group.id) {
            self.current_group = Some(group.clone());
        }
    }

    pub(crate) fn prepend_group(&mut self, group: &Group) {
        self.groups.retain(|g| g.id != group.id);
        self.groups.insert(0, group.clone());
    }

    /// 群组被停用或删除后从快照中移除
    pub(crate) fn drop_group(&mut self, group_id: &str) {
        self.groups.retain(|g| g.id != group_id);
        self.search_results.retain(|g| g.id != group_id);
        if self.is_current(group_id) {
            self.current_group = None;
            self.members.clear();
            self.settings = None;
            self.analytics = None;
        }
        if self.is_chat_open(group_id) {
            self.reset_chat();
        }
    }

    pub(crate) fn replace_member(&mut self, member: &GroupMember) {
        if let Some(slot) = self.members.iter_mut().find(|m| m.id == member.id) {
            *slot = member.clone();
        }
    }

    /// 切换群聊时丢弃上一个群聊的全部状态
    pub(crate) fn reset_chat(&mut self) {
        self.chat_group_id = None;
        self.messages.clear();
        self.has_more_messages = false;
        self.chat_members.clear();
        self.chat_settings = None;
        self.chat_analytics = None;
        self.unread_count = 0;
    }

    pub(crate) fn open_chat(&mut self, group_id: &str) {
        if !self.is_chat_open(group_id) {
            self.reset_chat();
            self.chat_group_id = Some(group_id.to_string());
        }
    }

    /// 群聊数据能否写入快照：尚未打开群聊时顺带打开 `group_id`
    pub(crate) fn accepts_chat(&mut self, group_id: &str) -> bool {
        if self.chat_group_id.is_none() {
            self.chat_group_id = Some(group_id.to_string());
        }
        self.is_chat_open(group_id)
    }

    pub(crate) fn message_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// 按 ID 原地替换消息；服务端返回的行不带关联数据，保留已加载的发送者与回应
    pub(crate) fn replace_message(&mut self, message: &ChatMessage) {
        if let Some(slot) = self.message_mut(&message.id) {
            let sender = slot.sender.take();
            let reply_to = slot.reply_to.take();
            let reactions = std::mem::take(&mut slot.reactions);
            *slot = message.clone();
            slot.sender = slot.sender.take().or(sender);
            slot.reply_to = slot.reply_to.take().or(reply_to);
            if slot.reactions.is_empty() {
                slot.reactions = reactions;
            }
        }
    }

    pub(crate) fn chat_member_mut(&mut self, user_id: &str) -> Option<&mut ChatMember> {
        self.chat_members.iter_mut().find(|m| m.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::models::PrivacyMode;

    fn group(id: &str, count: u32) -> Group {
        Group {
            id: id.into(),
            name: id.into(),
            description: None,
            avatar_url: None,
            cover_image_url: None,
            sport: "Running".into(),
            location: None,
            privacy: PrivacyMode::Public,
            member_limit: None,
            created_by: "u1".into(),
            member_count: count,
            is_active: true,
            tags: Vec::new(),
            rules: Vec::new(),
            requirements: None,
            created_at: "2026-01-01T00:00:00.000Z".into(),
            updated_at: None,
        }
    }

    #[test]
    fn overlapping_actions_keep_busy_until_last_finishes() {
        let mut state = GroupState::default();
        state.begin(Domain::Group);
        state.begin(Domain::Group);
        state.end(Domain::Group, None);
        assert!(state.is_loading());
        state.end(Domain::Group, Some("boom".into()));
        assert!(!state.is_loading());
        assert_eq!(state.error(Domain::Group), Some("boom"));
        assert_eq!(state.error(Domain::Chat), None);
    }

    #[test]
    fn begin_clears_only_its_own_slot() {
        let mut state = GroupState {
            group_error: Some("g".into()),
            chat_error: Some("c".into()),
            ..Default::default()
        };
        state.begin(Domain::Chat);
        assert_eq!(state.chat_error, None);
        assert_eq!(state.group_error.as_deref(), Some("g"));
    }

    #[test]
    fn replace_group_updates_every_copy() {
        let mut state = GroupState::default();
        state.prepend_group(&group("a", 1));
        state.search_results.push(group("a", 1));
        state.current_group = Some(group("a", 1));

        state.replace_group(&group("a", 3));
        assert_eq!(state.groups[0].member_count, 3);
        assert_eq!(state.search_results[0].member_count, 3);
        assert_eq!(state.current_group.as_ref().map(|g| g.member_count), Some(3));
    }

    #[test]
    fn version_moves_on_every_mutation() {
        let mut state = GroupState::default();
        state.begin(Domain::Group);
        state.end(Domain::Group, None);
        state.clear_error(Domain::Chat);
        assert_eq!(state.version, 3);
    }
}
