//! 群组状态服务层
//!
//! `GroupStore` 持有内存快照，并把界面动作翻译为数据访问调用。每个动作的流程一致：
//!
//! 1. 标记忙碌并清空本领域的错误
//! 2. 调用 DAO
//! 3. 成功时按三种方式之一合并进快照：整体替换、头部插入、按 ID 原地替换
//! 4. 失败时写入错误文本并返回空值（None / false / 空集合）
//! 5. 无论成败都解除忙碌
//!
//! 动作从不向调用方返回错误，调用方只需检查返回值。

use crate::chat::dao::ChatDao;
use crate::chat::models::{
    ChatAnalytics, ChatMember, ChatMessage, ChatSettings, ChatSettingsUpdate, MessageReaction,
    NotificationSettings, SendMessageRequest,
};
use crate::config::ClientConfig;
use crate::gateway::Gateway;
use crate::groups::dao::GroupDao;
use crate::groups::models::{
    CreateGroupRequest, Group, GroupAnalytics, GroupInvitation, GroupMember, GroupRole,
    GroupSearchFilters, GroupSettings, GroupSettingsUpdate, MemberPermissions, UpdateGroupRequest,
};
use crate::serialization::days_ago_iso;
use crate::store::listener::{EmptyStoreListener, StoreListener};
use crate::store::refresh::{RefreshOutcome, RefreshPolicy};
use crate::store::state::{Domain, GroupState};
use crate::views;
use anyhow::{anyhow, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

fn not_signed_in() -> anyhow::Error {
    anyhow!("not signed in")
}

fn describe(err: anyhow::Error) -> String {
    format!("{:#}", err)
}

/// 群组与群聊的状态容器
pub struct GroupStore {
    config: ClientConfig,
    groups: GroupDao,
    chat: ChatDao,
    state: RwLock<GroupState>,
    listener: Arc<dyn StoreListener>,
}

impl GroupStore {
    /// 创建 store（使用默认空监听器）
    pub fn new(gateway: Arc<dyn Gateway>, config: ClientConfig) -> Self {
        Self::with_listener(gateway, config, Arc::new(EmptyStoreListener))
    }

    /// 创建 store（带自定义监听器）
    pub fn with_listener(
        gateway: Arc<dyn Gateway>,
        config: ClientConfig,
        listener: Arc<dyn StoreListener>,
    ) -> Self {
        info!(
            "[GroupStore] 创建状态容器，用户ID: {:?}, 后端: {}",
            config.user_id, config.api_base_url
        );
        let state = GroupState::for_user(config.user_id.clone());
        Self {
            groups: GroupDao::new(gateway.clone()),
            chat: ChatDao::new(gateway),
            state: RwLock::new(state),
            listener,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// 当前快照的副本
    pub async fn snapshot(&self) -> GroupState {
        self.state.read().await.clone()
    }

    pub async fn current_user_id(&self) -> Option<String> {
        self.state.read().await.current_user_id.clone()
    }

    /// 切换登录用户；用户变化时丢弃旧快照
    pub async fn set_current_user(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        let version = {
            let mut state = self.state.write().await;
            if state.current_user_id.as_deref() == Some(user_id.as_str()) {
                return;
            }
            let version = state.version;
            *state = GroupState::for_user(Some(user_id.clone()));
            state.version = version;
            state.touch();
            state.version
        };
        info!("[GroupStore] 切换用户 -> {}", user_id);
        self.listener.on_state_changed(version).await;
    }

    /// 退出登录：清空整个快照
    pub async fn sign_out(&self) {
        let version = {
            let mut state = self.state.write().await;
            let version = state.version;
            *state = GroupState::default();
            state.version = version;
            state.touch();
            state.version
        };
        info!("[GroupStore] 已退出登录");
        self.listener.on_state_changed(version).await;
    }

    pub async fn clear_group_error(&self) {
        self.clear_error(Domain::Group).await;
    }

    pub async fn clear_chat_error(&self) {
        self.clear_error(Domain::Chat).await;
    }

    async fn clear_error(&self, domain: Domain) {
        let version = {
            let mut state = self.state.write().await;
            state.clear_error(domain);
            state.version
        };
        self.listener.on_state_changed(version).await;
    }

    async fn user_id(&self) -> Result<String> {
        self.current_user_id().await.ok_or_else(not_signed_in)
    }

    async fn notify(&self, domain: Domain, version: u64, error: Option<String>) {
        if let Some(error) = error {
            match domain {
                Domain::Group => self.listener.on_group_error(error).await,
                Domain::Chat => self.listener.on_chat_error(error).await,
            }
        }
        self.listener.on_state_changed(version).await;
    }

    async fn begin(&self, domain: Domain) {
        let version = {
            let mut state = self.state.write().await;
            state.begin(domain);
            state.version
        };
        self.listener.on_state_changed(version).await;
    }

    /// 执行一个动作：DAO 调用成功时用 `merge` 合并结果，失败时写入错误槽
    async fn run<T, F, M>(&self, domain: Domain, label: &str, fut: F, merge: M) -> Option<T>
    where
        F: Future<Output = Result<T>>,
        M: FnOnce(&mut GroupState, &T),
    {
        self.begin(domain).await;
        let result = fut.await;

        let (version, error) = {
            let mut state = self.state.write().await;
            let error = match &result {
                Ok(value) => {
                    merge(&mut *state, value);
                    None
                }
                Err(err) => {
                    error!("[GroupStore] {} 失败: {:#}", label, err);
                    Some(format!("Failed to {}: {:#}", label, err))
                }
            };
            state.end(domain, error.clone());
            (state.version, error)
        };
        self.notify(domain, version, error).await;
        result.ok()
    }

    // ---------------------------------------------------------------
    // 群组
    // ---------------------------------------------------------------

    /// 当前用户加入的群组（整体替换）
    pub async fn load_user_groups(&self) -> Vec<Group> {
        self.run(
            Domain::Group,
            "load groups",
            async {
                let user_id = self.user_id().await?;
                self.groups.get_user_groups(&user_id).await
            },
            |state, groups| state.groups = groups.clone(),
        )
        .await
        .unwrap_or_default()
    }

    /// 选中群组：加载群组记录与成员列表
    pub async fn select_group(&self, group_id: &str) -> Option<Group> {
        let group = self
            .run(
                Domain::Group,
                "load group",
                self.groups.get_group(group_id),
                |state, group| {
                    if let Some(group) = group {
                        if !state.is_current(&group.id) {
                            state.members.clear();
                            state.settings = None;
                            state.analytics = None;
                        }
                        state.current_group = Some(group.clone());
                        state.replace_group(group);
                    }
                },
            )
            .await
            .flatten()?;
        self.load_members(group_id).await;
        Some(group)
    }

    /// 重新读取单个群组记录，原地替换
    async fn reload_group(&self, group_id: &str) -> Option<Group> {
        self.run(
            Domain::Group,
            "reload group",
            self.groups.get_group(group_id),
            |state, group| {
                if let Some(group) = group {
                    state.replace_group(group);
                }
            },
        )
        .await
        .flatten()
    }

    /// 创建群组，新群组插入列表头部
    pub async fn create_group(&self, req: &CreateGroupRequest) -> Option<Group> {
        self.run(
            Domain::Group,
            "create group",
            async {
                let user_id = self.user_id().await?;
                self.groups.create_group(req, &user_id).await
            },
            |state, group| state.prepend_group(group),
        )
        .await
    }

    pub async fn update_group(&self, group_id: &str, req: &UpdateGroupRequest) -> Option<Group> {
        self.run(
            Domain::Group,
            "update group",
            self.groups.update_group(group_id, req),
            |state, group| {
                if let Some(group) = group {
                    state.replace_group(group);
                }
            },
        )
        .await
        .flatten()
    }

    /// 软停用，并从快照中移除
    pub async fn deactivate_group(&self, group_id: &str) -> bool {
        self.run(
            Domain::Group,
            "deactivate group",
            self.groups.deactivate_group(group_id),
            |state, done| {
                if *done {
                    state.drop_group(group_id);
                }
            },
        )
        .await
        .unwrap_or(false)
    }

    pub async fn delete_group(&self, group_id: &str) -> bool {
        self.run(
            Domain::Group,
            "delete group",
            self.groups.delete_group(group_id),
            |state, done| {
                if *done {
                    state.drop_group(group_id);
                }
            },
        )
        .await
        .unwrap_or(false)
    }

    /// 搜索群组，未指定分页大小时使用配置值
    pub async fn search_groups(&self, filters: &GroupSearchFilters) -> Vec<Group> {
        let mut filters = filters.clone();
        if filters.limit.is_none() {
            filters.limit = Some(self.config.search_page_size);
        }
        self.run(
            Domain::Group,
            "search groups",
            self.groups.search_groups(&filters),
            |state, groups| state.search_results = groups.clone(),
        )
        .await
        .unwrap_or_default()
    }

    pub async fn load_members(&self, group_id: &str) -> Vec<GroupMember> {
        self.run(
            Domain::Group,
            "load members",
            self.groups.get_group_members(group_id),
            |state, members| state.members = members.clone(),
        )
        .await
        .unwrap_or_default()
    }

    /// 成员变动后刷新群组记录以拿到新的成员数；`members` 只属于当前群组，
    /// 变动发生在当前群组时才重新加载
    async fn after_membership_change(&self, group_id: &str) {
        let is_current = self.state.read().await.is_current(group_id);
        if is_current {
            self.load_members(group_id).await;
        } else {
            debug!("[GroupStore] 群组 {} 不是当前群组，保留当前成员列表", group_id);
        }
        self.reload_group(group_id).await;
    }

    pub async fn add_member(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Option<GroupMember> {
        let member = self
            .run(
                Domain::Group,
                "add member",
                self.groups.add_member(group_id, user_id, role),
                |_, _| {},
            )
            .await?;
        self.after_membership_change(group_id).await;
        Some(member)
    }

    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> bool {
        let Some(removed) = self
            .run(
                Domain::Group,
                "remove member",
                self.groups.remove_member(group_id, user_id),
                |_, _| {},
            )
            .await
        else {
            return false;
        };
        self.after_membership_change(group_id).await;
        removed
    }

    pub async fn update_member_role(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Option<GroupMember> {
        self.run(
            Domain::Group,
            "update member role",
            self.groups.update_member_role(group_id, user_id, role),
            |state, member| {
                if let Some(member) = member {
                    state.replace_member(member);
                }
            },
        )
        .await
        .flatten()
    }

    pub async fn load_settings(&self, group_id: &str) -> Option<GroupSettings> {
        self.run(
            Domain::Group,
            "load group settings",
            self.groups.get_group_settings(group_id),
            |state, settings| state.settings = settings.clone(),
        )
        .await
        .flatten()
    }

    pub async fn update_settings(
        &self,
        group_id: &str,
        update: &GroupSettingsUpdate,
    ) -> Option<GroupSettings> {
        self.run(
            Domain::Group,
            "update group settings",
            self.groups.update_group_settings(group_id, update),
            |state, settings| state.settings = Some(settings.clone()),
        )
        .await
    }

    /// 以当前用户身份发出邀请
    pub async fn invite_user(
        &self,
        group_id: &str,
        invited_user_id: &str,
        message: Option<&str>,
    ) -> Option<GroupInvitation> {
        self.run(
            Domain::Group,
            "invite user",
            async {
                let invited_by = self.user_id().await?;
                self.groups
                    .invite_user(group_id, invited_user_id, &invited_by, message)
                    .await
            },
            |_, _| {},
        )
        .await
    }

    /// 当前用户收到的待处理邀请（整体替换）
    pub async fn load_invitations(&self) -> Vec<GroupInvitation> {
        self.run(
            Domain::Group,
            "load invitations",
            async {
                let user_id = self.user_id().await?;
                self.groups.get_user_invitations(&user_id).await
            },
            |state, invitations| state.invitations = invitations.clone(),
        )
        .await
        .unwrap_or_default()
    }

    /// 处理邀请；接受后重新加载群组列表
    pub async fn respond_to_invitation(&self, invitation_id: &str, accept: bool) -> bool {
        let responded = self
            .run(
                Domain::Group,
                "respond to invitation",
                self.groups.respond_to_invitation(invitation_id, accept),
                |state, done| {
                    if *done {
                        state.invitations.retain(|i| i.id != invitation_id);
                    }
                },
            )
            .await
            .unwrap_or(false);
        if responded && accept {
            self.load_user_groups().await;
        }
        responded
    }

    pub async fn load_analytics(&self, group_id: &str) -> Option<GroupAnalytics> {
        self.run(
            Domain::Group,
            "load group analytics",
            self.groups.get_group_analytics(group_id),
            |state, analytics| state.analytics = Some(analytics.clone()),
        )
        .await
    }

    /// 并发刷新群组记录、成员、设置和统计；任一分支失败则整体失败
    pub async fn refresh_group(&self, group_id: &str) -> RefreshOutcome {
        self.refresh_group_with(group_id, RefreshPolicy::AllOrNothing)
            .await
    }

    pub async fn refresh_group_with(&self, group_id: &str, policy: RefreshPolicy) -> RefreshOutcome {
        self.begin(Domain::Group).await;
        let (group, members, settings, analytics) = futures_util::join!(
            self.groups.get_group(group_id),
            self.groups.get_group_members(group_id),
            self.groups.get_group_settings(group_id),
            self.groups.get_group_analytics(group_id),
        );
        let outcome = RefreshOutcome {
            group: group.map_err(describe),
            members: members.map_err(describe),
            settings: settings.map_err(describe),
            analytics: analytics.map_err(describe),
        };

        let error = outcome.error_message();
        let apply = outcome.is_complete() || policy == RefreshPolicy::BestEffort;
        let version = {
            let mut state = self.state.write().await;
            if apply {
                if let Ok(Some(group)) = &outcome.group {
                    state.current_group = Some(group.clone());
                    state.replace_group(group);
                }
                if let Ok(members) = &outcome.members {
                    state.members = members.clone();
                }
                if let Ok(settings) = &outcome.settings {
                    state.settings = settings.clone();
                }
                if let Ok(analytics) = &outcome.analytics {
                    state.analytics = Some(analytics.clone());
                }
            }
            state.end(Domain::Group, error.clone());
            state.version
        };

        match &error {
            Some(err) => warn!("[GroupStore] 刷新群组 {} 不完整（{:?}）: {}", group_id, policy, err),
            None => debug!("[GroupStore] 刷新群组 {} 完成", group_id),
        }
        self.notify(Domain::Group, version, error).await;
        outcome
    }

    /// 当前用户在当前成员列表中的权限
    pub async fn current_permissions(&self) -> Option<MemberPermissions> {
        let state = self.state.read().await;
        let user_id = state.current_user_id.as_deref()?;
        views::groups::permissions_of(&state.members, user_id)
    }

    pub async fn is_admin(&self) -> bool {
        let state = self.state.read().await;
        state
            .current_user_id
            .as_deref()
            .is_some_and(|user_id| views::groups::is_admin(&state.members, user_id))
    }

    // ---------------------------------------------------------------
    // 群聊
    // ---------------------------------------------------------------

    /// 打开群聊并加载第一页消息（新消息在前）
    pub async fn load_messages(&self, group_id: &str) -> Vec<ChatMessage> {
        let limit = self.config.message_page_size;
        self.run(
            Domain::Chat,
            "load messages",
            self.chat.get_messages(group_id, limit, None),
            |state, messages| {
                state.open_chat(group_id);
                state.messages = messages.clone();
                state.has_more_messages = messages.len() >= limit;
            },
        )
        .await
        .unwrap_or_default()
    }

    /// 以已加载的最旧消息时间为上界，加载更早的一页
    pub async fn load_more_messages(&self) -> Vec<ChatMessage> {
        let (group_id, before) = {
            let state = self.state.read().await;
            match (state.chat_group_id.clone(), state.oldest_message()) {
                (Some(group_id), Some(oldest)) => (group_id, oldest.created_at.clone()),
                _ => return Vec::new(),
            }
        };
        let limit = self.config.message_page_size;
        self.run(
            Domain::Chat,
            "load more messages",
            self.chat.get_messages(&group_id, limit, Some(&before)),
            |state, older| {
                if !state.is_chat_open(&group_id) {
                    return;
                }
                for message in older {
                    if !state.messages.iter().any(|m| m.id == message.id) {
                        state.messages.push(message.clone());
                    }
                }
                state.has_more_messages = older.len() >= limit;
            },
        )
        .await
        .unwrap_or_default()
    }

    pub async fn search_messages(&self, group_id: &str, text: &str) -> Vec<ChatMessage> {
        self.run(
            Domain::Chat,
            "search messages",
            self.chat.search_messages(group_id, text),
            |_, _| {},
        )
        .await
        .unwrap_or_default()
    }

    /// 发送消息，新消息插入列表头部
    pub async fn send_message(&self, req: &SendMessageRequest) -> Option<ChatMessage> {
        self.run(
            Domain::Chat,
            "send message",
            async {
                let sender_id = self.user_id().await?;
                self.chat.send_message(req, &sender_id).await
            },
            |state, message| {
                if state.accepts_chat(&message.group_id) {
                    state.messages.insert(0, message.clone());
                }
            },
        )
        .await
    }

    pub async fn edit_message(&self, message_id: &str, content: &str) -> Option<ChatMessage> {
        self.run(
            Domain::Chat,
            "edit message",
            self.chat.edit_message(message_id, content),
            |state, message| {
                if let Some(message) = message {
                    state.replace_message(message);
                }
            },
        )
        .await
        .flatten()
    }

    /// 软删除；消息仍留在列表中，内容变为占位文本
    pub async fn delete_message(&self, message_id: &str) -> bool {
        self.run(
            Domain::Chat,
            "delete message",
            self.chat.delete_message(message_id),
            |state, message| {
                if let Some(message) = message {
                    state.replace_message(message);
                }
            },
        )
        .await
        .flatten()
        .is_some()
    }

    pub async fn add_reaction(&self, message_id: &str, emoji: &str) -> Option<MessageReaction> {
        self.run(
            Domain::Chat,
            "add reaction",
            async {
                let user_id = self.user_id().await?;
                self.chat.add_reaction(message_id, &user_id, emoji).await
            },
            |state, reaction| {
                if let Some(message) = state.message_mut(&reaction.message_id) {
                    message.reactions.push(reaction.clone());
                }
            },
        )
        .await
    }

    pub async fn remove_reaction(&self, message_id: &str, emoji: &str) -> bool {
        let user_id = self.current_user_id().await;
        self.run(
            Domain::Chat,
            "remove reaction",
            async {
                let user_id = user_id.as_deref().ok_or_else(not_signed_in)?;
                self.chat.remove_reaction(message_id, user_id, emoji).await
            },
            |state, removed| {
                let (true, Some(user_id)) = (*removed, user_id.as_deref()) else {
                    return;
                };
                if let Some(message) = state.message_mut(message_id) {
                    message
                        .reactions
                        .retain(|r| !(r.user_id == user_id && r.emoji == emoji));
                }
            },
        )
        .await
        .unwrap_or(false)
    }

    pub async fn load_chat_members(&self, group_id: &str) -> Vec<ChatMember> {
        self.run(
            Domain::Chat,
            "load chat members",
            self.chat.get_chat_members(group_id),
            |state, members| {
                if state.accepts_chat(group_id) {
                    state.chat_members = members.clone();
                }
            },
        )
        .await
        .unwrap_or_default()
    }

    pub async fn load_chat_settings(&self, group_id: &str) -> Option<ChatSettings> {
        self.run(
            Domain::Chat,
            "load chat settings",
            self.chat.get_chat_settings(group_id),
            |state, settings| {
                if state.accepts_chat(group_id) {
                    state.chat_settings = settings.clone();
                }
            },
        )
        .await
        .flatten()
    }

    pub async fn update_chat_settings(
        &self,
        group_id: &str,
        update: &ChatSettingsUpdate,
    ) -> Option<ChatSettings> {
        self.run(
            Domain::Chat,
            "update chat settings",
            self.chat.update_chat_settings(group_id, update),
            |state, settings| {
                if state.accepts_chat(group_id) {
                    state.chat_settings = Some(settings.clone());
                }
            },
        )
        .await
    }

    pub async fn update_typing_status(&self, group_id: &str, is_typing: bool) -> bool {
        let user_id = self.current_user_id().await;
        self.run(
            Domain::Chat,
            "update typing status",
            async {
                let user_id = user_id.as_deref().ok_or_else(not_signed_in)?;
                self.chat
                    .update_typing_status(group_id, user_id, is_typing)
                    .await
            },
            |state, updated| {
                if let (true, Some(user_id)) = (*updated, user_id.as_deref()) {
                    if let Some(member) = state.chat_member_mut(user_id) {
                        member.is_typing = is_typing;
                    }
                }
            },
        )
        .await
        .unwrap_or(false)
    }

    pub async fn set_muted(&self, group_id: &str, muted: bool) -> bool {
        let user_id = self.current_user_id().await;
        self.run(
            Domain::Chat,
            "update mute",
            async {
                let user_id = user_id.as_deref().ok_or_else(not_signed_in)?;
                self.chat.set_muted(group_id, user_id, muted).await
            },
            |state, updated| {
                if let (true, Some(user_id)) = (*updated, user_id.as_deref()) {
                    if let Some(member) = state.chat_member_mut(user_id) {
                        member.is_muted = muted;
                    }
                }
            },
        )
        .await
        .unwrap_or(false)
    }

    pub async fn update_notification_settings(
        &self,
        group_id: &str,
        settings: &NotificationSettings,
    ) -> bool {
        let user_id = self.current_user_id().await;
        self.run(
            Domain::Chat,
            "update notification settings",
            async {
                let user_id = user_id.as_deref().ok_or_else(not_signed_in)?;
                self.chat
                    .update_notification_settings(group_id, user_id, settings)
                    .await
            },
            |state, updated| {
                if let (true, Some(user_id)) = (*updated, user_id.as_deref()) {
                    if let Some(member) = state.chat_member_mut(user_id) {
                        member.notification_settings = settings.clone();
                    }
                }
            },
        )
        .await
        .unwrap_or(false)
    }

    /// 标记已读后重新统计未读数
    pub async fn mark_as_read(&self, group_id: &str, message_id: &str) -> bool {
        let marked = self
            .run(
                Domain::Chat,
                "mark as read",
                async {
                    let user_id = self.user_id().await?;
                    self.chat.join_chat(group_id, &user_id).await?;
                    self.chat.mark_as_read(group_id, &user_id, message_id).await
                },
                |_, _| {},
            )
            .await
            .unwrap_or(false);
        if marked {
            self.refresh_unread_count(group_id).await;
        }
        marked
    }

    pub async fn refresh_unread_count(&self, group_id: &str) -> u64 {
        self.run(
            Domain::Chat,
            "count unread messages",
            async {
                let user_id = self.user_id().await?;
                self.chat.get_unread_count(group_id, &user_id).await
            },
            |state, count| {
                if state.accepts_chat(group_id) {
                    state.unread_count = *count;
                }
            },
        )
        .await
        .unwrap_or(0)
    }

    /// 按群聊设置的 `auto_delete_days` 清理过期消息，返回删除条数；
    /// `auto_delete_enabled` 关闭或未设置天数时不删除
    pub async fn apply_retention(&self, group_id: &str) -> u64 {
        self.run(
            Domain::Chat,
            "apply retention",
            async {
                let settings = self.chat.get_chat_settings(group_id).await?;
                let days = settings
                    .filter(|s| s.auto_delete_enabled)
                    .and_then(|s| s.auto_delete_days);
                match days {
                    Some(days) => {
                        let removed = self.chat.purge_messages_older_than(group_id, days).await?;
                        Ok((Some(days_ago_iso(i64::from(days))), removed))
                    }
                    None => Ok::<_, anyhow::Error>((None, 0)),
                }
            },
            |state, (cutoff, _)| {
                if let (Some(cutoff), true) = (cutoff, state.is_chat_open(group_id)) {
                    state.messages.retain(|m| m.created_at >= *cutoff);
                }
            },
        )
        .await
        .map_or(0, |(_, removed)| removed)
    }

    pub async fn load_chat_analytics(&self, group_id: &str) -> Option<ChatAnalytics> {
        self.run(
            Domain::Chat,
            "load chat analytics",
            self.chat.get_chat_analytics(group_id),
            |state, analytics| {
                if state.accepts_chat(group_id) {
                    state.chat_analytics = Some(analytics.clone());
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::dao::{CHAT_MEMBERS, GROUP_MESSAGES};
    use crate::chat::models::{MessageType, DELETED_PLACEHOLDER};
    use crate::gateway::MemoryGateway;
    use crate::groups::dao::{GROUPS, GROUP_SETTINGS};
    use crate::groups::models::PrivacyMode;
    use serde_json::json;
    use std::sync::{Mutex, Once};

    static INIT_LOGGER: Once = Once::new();

    fn init_test_logger() {
        INIT_LOGGER.call_once(|| {
            use tracing_subscriber::prelude::*;
            use tracing_subscriber::EnvFilter;

            let filter_layer = EnvFilter::new("info,sports_groups_sdk=debug");
            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(false)
                .with_test_writer();

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .init();
        });
    }

    fn config(user_id: Option<&str>) -> ClientConfig {
        let config = ClientConfig::new("http://localhost:54321".into(), "test-key".into());
        match user_id {
            Some(user_id) => config.with_user(user_id),
            None => config,
        }
    }

    fn setup(user_id: &str) -> (Arc<MemoryGateway>, GroupStore) {
        init_test_logger();
        let gw = Arc::new(MemoryGateway::new());
        let store = GroupStore::new(gw.clone(), config(Some(user_id)));
        (gw, store)
    }

    fn sunday_runners() -> CreateGroupRequest {
        CreateGroupRequest {
            name: "Sunday Runners".into(),
            sport: "Running".into(),
            privacy: PrivacyMode::Public,
            ..Default::default()
        }
    }

    fn seed_message(gw: &MemoryGateway, id: &str, sender: &str, created_at: &str) {
        gw.seed(
            GROUP_MESSAGES,
            vec![json!({
                "id": id,
                "group_id": "g1",
                "sender_id": sender,
                "message_type": "text",
                "content": format!("message {}", id),
                "is_edited": false,
                "is_deleted": false,
                "created_at": created_at,
            })],
        );
    }

    #[derive(Default)]
    struct RecordingListener {
        events: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl StoreListener for RecordingListener {
        async fn on_state_changed(&self, _version: u64) {}
        async fn on_group_error(&self, error: String) {
            self.events.lock().unwrap().push(format!("group: {}", error));
        }
        async fn on_chat_error(&self, error: String) {
            self.events.lock().unwrap().push(format!("chat: {}", error));
        }
    }

    #[tokio::test]
    async fn create_group_makes_creator_sole_admin() {
        let (_gw, store) = setup("u1");

        let group = store.create_group(&sunday_runners()).await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.groups[0].member_count, 1);
        assert!(!state.is_loading());

        store.select_group(&group.id).await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.members.len(), 1);
        assert_eq!(state.members[0].user_id, "u1");
        assert_eq!(state.members[0].role, GroupRole::Admin);

        let perms = store.current_permissions().await.unwrap();
        assert!(perms.can_invite && perms.can_edit_group && perms.can_create_events && perms.can_moderate);
        assert!(store.is_admin().await);
    }

    #[tokio::test]
    async fn concurrent_adds_count_every_member() {
        let (gw, store) = setup("u1");
        let group = store.create_group(&sunday_runners()).await.unwrap();
        store.select_group(&group.id).await.unwrap();

        let (a, b) = tokio::join!(
            store.add_member(&group.id, "u2", GroupRole::Member),
            store.add_member(&group.id, "u3", GroupRole::Member),
        );
        assert!(a.is_some() && b.is_some());

        let row = gw.rows(GROUPS).into_iter().next().unwrap();
        assert_eq!(row["member_count"], 3);

        assert!(store.refresh_group(&group.id).await.is_complete());
        let state = store.snapshot().await;
        assert_eq!(state.current_group.as_ref().unwrap().member_count, 3);
        assert_eq!(state.groups[0].member_count, 3);
        assert_eq!(state.members.len(), 3);
    }

    #[tokio::test]
    async fn removing_member_cascades_into_current_group() {
        let (_gw, store) = setup("u1");
        let group = store.create_group(&sunday_runners()).await.unwrap();
        store.select_group(&group.id).await.unwrap();
        store.add_member(&group.id, "u2", GroupRole::Member).await.unwrap();
        assert_eq!(store.snapshot().await.current_group.unwrap().member_count, 2);

        assert!(store.remove_member(&group.id, "u2").await);
        let state = store.snapshot().await;
        assert_eq!(state.members.len(), 1);
        assert_eq!(state.current_group.unwrap().member_count, 1);
    }

    #[tokio::test]
    async fn membership_change_elsewhere_keeps_current_members() {
        let (_gw, store) = setup("u1");
        let a = store.create_group(&sunday_runners()).await.unwrap();
        let b = store
            .create_group(&CreateGroupRequest {
                name: "Track Tuesdays".into(),
                ..sunday_runners()
            })
            .await
            .unwrap();
        store.select_group(&a.id).await.unwrap();

        store.add_member(&b.id, "u9", GroupRole::Member).await.unwrap();
        let state = store.snapshot().await;
        assert_eq!(state.current_group.as_ref().unwrap().id, a.id);
        assert_eq!(state.members.len(), 1);
        assert!(state.members.iter().all(|m| m.group_id == a.id));
        assert!(store.is_admin().await);
        let listed_b = state.groups.iter().find(|g| g.id == b.id).unwrap();
        assert_eq!(listed_b.member_count, 2);

        assert!(store.remove_member(&b.id, "u9").await);
        let state = store.snapshot().await;
        assert!(state.members.iter().all(|m| m.group_id == a.id));
        assert_eq!(state.groups.iter().find(|g| g.id == b.id).unwrap().member_count, 1);
    }

    #[tokio::test]
    async fn role_change_replaces_member_in_place() {
        let (_gw, store) = setup("u1");
        let group = store.create_group(&sunday_runners()).await.unwrap();
        store.select_group(&group.id).await.unwrap();
        store.add_member(&group.id, "u2", GroupRole::Member).await.unwrap();

        let updated = store
            .update_member_role(&group.id, "u2", GroupRole::Moderator)
            .await
            .unwrap();
        assert_eq!(updated.permissions(), GroupRole::Moderator.permissions());
        let state = store.snapshot().await;
        let member = state.members.iter().find(|m| m.user_id == "u2").unwrap();
        assert_eq!(member.role, GroupRole::Moderator);
    }

    #[tokio::test]
    async fn gateway_failure_lands_in_group_slot() {
        init_test_logger();
        let gw = Arc::new(MemoryGateway::new());
        let listener = Arc::new(RecordingListener::default());
        let store = GroupStore::with_listener(gw.clone(), config(Some("u1")), listener.clone());
        gw.fail_table(GROUPS);

        assert!(store.create_group(&sunday_runners()).await.is_none());
        let state = store.snapshot().await;
        let err = state.group_error.as_deref().unwrap();
        assert!(err.starts_with("Failed to create group"), "{}", err);
        assert!(state.chat_error.is_none());
        assert!(!state.is_loading());
        assert_eq!(listener.events.lock().unwrap().len(), 1);

        store.clear_group_error().await;
        assert!(store.snapshot().await.group_error.is_none());
    }

    #[tokio::test]
    async fn chat_errors_do_not_mask_group_errors() {
        let (gw, store) = setup("u1");
        gw.fail_table(GROUPS);
        store.create_group(&sunday_runners()).await;
        gw.fail_table(GROUP_MESSAGES);

        assert!(store.load_messages("g1").await.is_empty());
        let state = store.snapshot().await;
        assert!(state.group_error.is_some());
        assert!(state.chat_error.as_deref().unwrap().starts_with("Failed to load messages"));
        assert!(!state.is_chat_loading());

        gw.heal_table(GROUP_MESSAGES);
        store.load_messages("g1").await;
        let state = store.snapshot().await;
        assert!(state.chat_error.is_none());
        assert!(state.group_error.is_some());
    }

    #[tokio::test]
    async fn signed_out_actions_fail_softly() {
        init_test_logger();
        let store = GroupStore::new(Arc::new(MemoryGateway::new()), config(None));
        assert!(store.create_group(&sunday_runners()).await.is_none());
        assert_eq!(
            store.snapshot().await.group_error.as_deref(),
            Some("Failed to create group: not signed in")
        );
        assert!(!store.remove_reaction("m1", "👍").await);
        assert!(store.snapshot().await.chat_error.is_some());
    }

    #[tokio::test]
    async fn mark_as_read_zeroes_unread() {
        let (gw, store) = setup("u1");
        seed_message(&gw, "m1", "u2", "2020-01-01T10:00:00.000Z");
        seed_message(&gw, "m2", "u2", "2020-01-01T11:00:00.000Z");
        seed_message(&gw, "m3", "u1", "2020-01-01T12:00:00.000Z");

        store.load_messages("g1").await;
        assert_eq!(store.refresh_unread_count("g1").await, 2);

        assert!(store.mark_as_read("g1", "m1").await);
        assert_eq!(store.snapshot().await.unread_count, 0);
        assert_eq!(gw.rows(CHAT_MEMBERS).len(), 1);
    }

    #[tokio::test]
    async fn paging_walks_backwards_through_history() {
        init_test_logger();
        let gw = Arc::new(MemoryGateway::new());
        let mut cfg = config(Some("u1"));
        cfg.message_page_size = 2;
        let store = GroupStore::new(gw.clone(), cfg);
        for i in 1..=5 {
            seed_message(&gw, &format!("m{}", i), "u2", &format!("2020-01-0{}T00:00:00.000Z", i));
        }

        let first: Vec<String> = store.load_messages("g1").await.into_iter().map(|m| m.id).collect();
        assert_eq!(first, vec!["m5", "m4"]);
        assert!(store.snapshot().await.has_more_messages);

        assert_eq!(store.load_more_messages().await.len(), 2);
        assert_eq!(store.load_more_messages().await.len(), 1);
        let state = store.snapshot().await;
        let ids: Vec<&str> = state.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m5", "m4", "m3", "m2", "m1"]);
        assert!(!state.has_more_messages);
    }

    #[tokio::test]
    async fn retention_purges_by_chat_setting() {
        let (gw, store) = setup("u1");
        seed_message(&gw, "old", "u2", "2020-01-01T00:00:00.000Z");
        store.load_messages("g1").await;
        let fresh = SendMessageRequest {
            group_id: "g1".into(),
            content: "fresh".into(),
            ..Default::default()
        };
        store.send_message(&fresh).await.unwrap();

        // 未设置保留期
        assert_eq!(store.apply_retention("g1").await, 0);

        // 只设天数、未开启自动删除
        let days_only = ChatSettingsUpdate {
            auto_delete_days: Some(30),
            ..Default::default()
        };
        store.update_chat_settings("g1", &days_only).await.unwrap();
        assert_eq!(store.apply_retention("g1").await, 0);
        assert_eq!(gw.rows(GROUP_MESSAGES).len(), 2);

        let enabled = ChatSettingsUpdate {
            auto_delete_enabled: Some(true),
            ..days_only
        };
        store.update_chat_settings("g1", &enabled).await.unwrap();
        assert_eq!(store.apply_retention("g1").await, 1);
        let state = store.snapshot().await;
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].content, "fresh");
        assert!(state.chat_error.is_none());
    }

    #[tokio::test]
    async fn message_lifecycle_merges_into_list() {
        let (_gw, store) = setup("u1");
        store.load_messages("g1").await;

        let sent = store
            .send_message(&SendMessageRequest {
                group_id: "g1".into(),
                message_type: MessageType::Text,
                content: "Long run on Sunday?".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.snapshot().await.messages[0].id, sent.id);

        let edited = store.edit_message(&sent.id, "Long run Saturday?").await.unwrap();
        assert!(edited.is_edited);

        store.add_reaction(&sent.id, "👍").await.unwrap();
        store.add_reaction(&sent.id, "🔥").await.unwrap();
        assert_eq!(store.snapshot().await.messages[0].reactions.len(), 2);
        assert!(store.remove_reaction(&sent.id, "👍").await);
        assert_eq!(store.snapshot().await.messages[0].reactions.len(), 1);

        assert!(store.delete_message(&sent.id).await);
        let state = store.snapshot().await;
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].id, sent.id);
        assert!(state.messages[0].is_deleted);
        assert_eq!(state.messages[0].content, DELETED_PLACEHOLDER);
    }

    #[tokio::test]
    async fn accepting_invitation_reloads_groups() {
        let (gw, owner) = setup("u1");
        let guest = GroupStore::new(gw.clone(), config(Some("u2")));
        let group = owner.create_group(&sunday_runners()).await.unwrap();
        owner.invite_user(&group.id, "u2", Some("Join us")).await.unwrap();

        let invitations = guest.load_invitations().await;
        assert_eq!(invitations.len(), 1);
        assert!(guest.respond_to_invitation(&invitations[0].id, true).await);

        let state = guest.snapshot().await;
        assert!(state.invitations.is_empty());
        assert_eq!(state.groups.len(), 1);
        assert_eq!(state.groups[0].member_count, 2);
    }

    #[tokio::test]
    async fn refresh_is_all_or_nothing_by_default() {
        let (gw, store) = setup("u1");
        let group = store.create_group(&sunday_runners()).await.unwrap();
        gw.fail_table(GROUP_SETTINGS);

        let outcome = store.refresh_group(&group.id).await;
        assert!(!outcome.is_complete());
        assert_eq!(outcome.failures().len(), 1);
        let state = store.snapshot().await;
        assert!(state.group_error.is_some());
        assert!(state.members.is_empty());
        assert!(state.analytics.is_none());

        let outcome = store
            .refresh_group_with(&group.id, RefreshPolicy::BestEffort)
            .await;
        assert!(!outcome.is_complete());
        let state = store.snapshot().await;
        assert_eq!(state.members.len(), 1);
        assert!(state.analytics.is_some());
        assert_eq!(state.current_group.map(|g| g.id), Some(group.id));
    }

    #[tokio::test]
    async fn deactivated_group_leaves_snapshot() {
        let (_gw, store) = setup("u1");
        let group = store.create_group(&sunday_runners()).await.unwrap();
        store.select_group(&group.id).await.unwrap();

        assert!(store.deactivate_group(&group.id).await);
        let state = store.snapshot().await;
        assert!(state.groups.is_empty());
        assert!(state.current_group.is_none());
        assert!(store.load_user_groups().await.is_empty());
    }

    #[tokio::test]
    async fn chat_presence_updates_map_in_place() {
        let (_gw, store) = setup("u1");
        store.mark_as_read("g1", "m0").await;
        store.load_chat_members("g1").await;

        assert!(store.update_typing_status("g1", true).await);
        assert!(store.set_muted("g1", true).await);
        let quiet = NotificationSettings {
            quiet_hours_start: Some("22:00".into()),
            quiet_hours_end: Some("07:00".into()),
            ..Default::default()
        };
        assert!(store.update_notification_settings("g1", &quiet).await);

        let state = store.snapshot().await;
        let me = &state.chat_members[0];
        assert!(me.is_typing && me.is_muted);
        assert_eq!(me.notification_settings, quiet);
    }

    #[tokio::test]
    async fn sign_out_resets_everything() {
        let (_gw, store) = setup("u1");
        store.create_group(&sunday_runners()).await.unwrap();
        store.load_messages("g1").await;
        let before = store.snapshot().await.version;

        store.sign_out().await;
        let state = store.snapshot().await;
        assert!(state.groups.is_empty());
        assert!(state.current_user_id.is_none());
        assert!(state.chat_group_id.is_none());
        assert!(state.version > before);

        store.set_current_user("u2").await;
        assert_eq!(store.current_user_id().await.as_deref(), Some("u2"));
    }
}
