//! 群聊数据访问层（DAO）
//!
//! 消息、表情回应、群聊设置、成员在线状态与已读游标的网关调用。

use crate::chat::models::{
    ChatAnalytics, ChatMember, ChatMessage, ChatSettings, ChatSettingsUpdate, MessageReaction,
    NotificationSettings, SendMessageRequest, DELETED_PLACEHOLDER,
};
use crate::gateway::{decode_first, decode_rows, escape_like, Gateway, Query};
use crate::serialization::{days_ago_iso, now_iso, start_of_today_iso};
use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GROUP_MESSAGES: &str = "group_messages";
pub const MESSAGE_REACTIONS: &str = "message_reactions";
pub const CHAT_MEMBERS: &str = "chat_members";
pub const CHAT_SETTINGS: &str = "chat_settings";

const MESSAGE_SELECT: &str =
    "*,sender:profiles(*),reply_to:group_messages!reply_to_id(id,sender_id,content),reactions:message_reactions(*)";
const CHAT_MEMBER_SELECT: &str = "*,user:profiles(*)";

/// 已读游标的新位置
///
/// 目前直接取当前时间，不使用调用方传入的消息 ID。
pub(crate) fn read_cursor_for(_message_id: &str) -> String {
    now_iso()
}

/// 群聊 DAO
#[derive(Clone)]
pub struct ChatDao {
    gateway: Arc<dyn Gateway>,
}

impl ChatDao {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// 拉取消息，新消息在前；`before` 为不含边界的时间上界
    pub async fn get_messages(
        &self,
        group_id: &str,
        limit: usize,
        before: Option<&str>,
    ) -> Result<Vec<ChatMessage>> {
        let mut query = Query::table(GROUP_MESSAGES)
            .select(MESSAGE_SELECT)
            .eq("group_id", group_id)
            .order("created_at", false)
            .limit(limit);
        if let Some(before) = before {
            query = query.lt("created_at", before);
        }
        let rows = self
            .gateway
            .select(&query)
            .await
            .context("查询消息失败")?;
        let messages: Vec<ChatMessage> = decode_rows(rows)?;
        debug!(
            "[ChatDao] 群组 {} 拉取消息 {} 条（before={:?}）",
            group_id,
            messages.len(),
            before
        );
        Ok(messages)
    }

    pub async fn get_message(&self, message_id: &str) -> Result<Option<ChatMessage>> {
        let rows = self
            .gateway
            .select(
                &Query::table(GROUP_MESSAGES)
                    .select(MESSAGE_SELECT)
                    .eq("id", message_id)
                    .limit(1),
            )
            .await
            .context("查询消息失败")?;
        decode_first(rows)
    }

    /// 按内容模糊搜索未删除的消息
    pub async fn search_messages(&self, group_id: &str, text: &str) -> Result<Vec<ChatMessage>> {
        let rows = self
            .gateway
            .select(
                &Query::table(GROUP_MESSAGES)
                    .select(MESSAGE_SELECT)
                    .eq("group_id", group_id)
                    .eq("is_deleted", false)
                    .ilike("content", format!("%{}%", escape_like(text)))
                    .order("created_at", false),
            )
            .await
            .context("搜索消息失败")?;
        decode_rows(rows)
    }

    pub async fn send_message(
        &self,
        req: &SendMessageRequest,
        sender_id: &str,
    ) -> Result<ChatMessage> {
        let now = now_iso();
        let row = json!({
            "group_id": req.group_id,
            "sender_id": sender_id,
            "message_type": req.message_type,
            "content": req.content,
            "media_url": req.media_url,
            "reply_to_id": req.reply_to_id,
            "is_edited": false,
            "is_deleted": false,
            "created_at": now,
            "updated_at": now,
        });
        let inserted = self
            .gateway
            .insert(GROUP_MESSAGES, row)
            .await
            .context("发送消息失败")?;
        let message: ChatMessage = serde_json::from_value(inserted)?;
        info!(
            "[ChatDao] {} 在群组 {} 发送消息 {}",
            sender_id, req.group_id, message.id
        );
        Ok(message)
    }

    pub async fn edit_message(&self, message_id: &str, content: &str) -> Result<Option<ChatMessage>> {
        let now = now_iso();
        let rows = self
            .gateway
            .update(
                &Query::table(GROUP_MESSAGES).eq("id", message_id),
                json!({
                    "content": content,
                    "is_edited": true,
                    "edited_at": now,
                    "updated_at": now,
                }),
            )
            .await
            .context("编辑消息失败")?;
        decode_first(rows)
    }

    /// 软删除：保留行，内容替换为占位文本
    pub async fn delete_message(&self, message_id: &str) -> Result<Option<ChatMessage>> {
        let now = now_iso();
        let rows = self
            .gateway
            .update(
                &Query::table(GROUP_MESSAGES).eq("id", message_id),
                json!({
                    "content": DELETED_PLACEHOLDER,
                    "is_deleted": true,
                    "deleted_at": now,
                    "updated_at": now,
                }),
            )
            .await
            .context("删除消息失败")?;
        decode_first(rows)
    }

    /// 按保留期物理清理旧消息，返回删除条数
    pub async fn purge_messages_older_than(&self, group_id: &str, days: u32) -> Result<u64> {
        let cutoff = days_ago_iso(i64::from(days));
        let removed = self
            .gateway
            .delete(
                &Query::table(GROUP_MESSAGES)
                    .eq("group_id", group_id)
                    .lt("created_at", cutoff.as_str()),
            )
            .await
            .context("清理旧消息失败")?;
        warn!(
            "[ChatDao] 群组 {} 清理 {} 天前的消息 {} 条",
            group_id, days, removed
        );
        Ok(removed)
    }

    /// 添加表情回应（不做去重）
    pub async fn add_reaction(
        &self,
        message_id: &str,
        user_id: &str,
        emoji: &str,
    ) -> Result<MessageReaction> {
        let row = json!({
            "message_id": message_id,
            "user_id": user_id,
            "emoji": emoji,
            "created_at": now_iso(),
        });
        let inserted = self
            .gateway
            .insert(MESSAGE_REACTIONS, row)
            .await
            .context("添加表情回应失败")?;
        Ok(serde_json::from_value(inserted)?)
    }

    pub async fn remove_reaction(&self, message_id: &str, user_id: &str, emoji: &str) -> Result<bool> {
        let removed = self
            .gateway
            .delete(
                &Query::table(MESSAGE_REACTIONS)
                    .eq("message_id", message_id)
                    .eq("user_id", user_id)
                    .eq("emoji", emoji),
            )
            .await
            .context("移除表情回应失败")?;
        Ok(removed > 0)
    }

    pub async fn get_reactions(&self, message_id: &str) -> Result<Vec<MessageReaction>> {
        let rows = self
            .gateway
            .select(
                &Query::table(MESSAGE_REACTIONS)
                    .eq("message_id", message_id)
                    .order("created_at", true),
            )
            .await
            .context("查询表情回应失败")?;
        decode_rows(rows)
    }

    pub async fn get_chat_settings(&self, group_id: &str) -> Result<Option<ChatSettings>> {
        let rows = self
            .gateway
            .select(&Query::table(CHAT_SETTINGS).eq("group_id", group_id).limit(1))
            .await
            .context("查询群聊设置失败")?;
        decode_first(rows)
    }

    /// 原地更新；没有设置行时以默认值补建
    pub async fn update_chat_settings(
        &self,
        group_id: &str,
        update: &ChatSettingsUpdate,
    ) -> Result<ChatSettings> {
        let patch = serde_json::to_value(update)?;
        let rows = self
            .gateway
            .update(
                &Query::table(CHAT_SETTINGS).eq("group_id", group_id),
                patch.clone(),
            )
            .await
            .context("更新群聊设置失败")?;
        if let Some(settings) = decode_first(rows)? {
            return Ok(settings);
        }

        let mut row = serde_json::to_value(ChatSettings::defaults_for(group_id))?;
        if let (Value::Object(base), Value::Object(patch)) = (&mut row, patch) {
            base.extend(patch);
        }
        let inserted = self
            .gateway
            .insert(CHAT_SETTINGS, row)
            .await
            .context("创建群聊设置失败")?;
        Ok(serde_json::from_value(inserted)?)
    }

    pub async fn get_chat_members(&self, group_id: &str) -> Result<Vec<ChatMember>> {
        let rows = self
            .gateway
            .select(
                &Query::table(CHAT_MEMBERS)
                    .select(CHAT_MEMBER_SELECT)
                    .eq("group_id", group_id)
                    .order("last_seen", false),
            )
            .await
            .context("查询群聊成员失败")?;
        decode_rows(rows)
    }

    pub async fn get_chat_member(&self, group_id: &str, user_id: &str) -> Result<Option<ChatMember>> {
        let rows = self
            .gateway
            .select(
                &Query::table(CHAT_MEMBERS)
                    .eq("group_id", group_id)
                    .eq("user_id", user_id)
                    .limit(1),
            )
            .await
            .context("查询群聊成员失败")?;
        decode_first(rows)
    }

    /// 确保存在成员的在线状态行
    pub async fn join_chat(&self, group_id: &str, user_id: &str) -> Result<ChatMember> {
        if let Some(existing) = self.get_chat_member(group_id, user_id).await? {
            return Ok(existing);
        }
        let row = json!({
            "group_id": group_id,
            "user_id": user_id,
            "is_muted": false,
            "is_typing": false,
            "last_seen": now_iso(),
            "notification_settings": NotificationSettings::default(),
        });
        let inserted = self
            .gateway
            .insert(CHAT_MEMBERS, row)
            .await
            .context("加入群聊失败")?;
        Ok(serde_json::from_value(inserted)?)
    }

    async fn patch_chat_member(&self, group_id: &str, user_id: &str, patch: Value) -> Result<bool> {
        let rows = self
            .gateway
            .update(
                &Query::table(CHAT_MEMBERS)
                    .eq("group_id", group_id)
                    .eq("user_id", user_id),
                patch,
            )
            .await
            .context("更新群聊成员失败")?;
        Ok(!rows.is_empty())
    }

    pub async fn update_typing_status(
        &self,
        group_id: &str,
        user_id: &str,
        is_typing: bool,
    ) -> Result<bool> {
        self.patch_chat_member(group_id, user_id, json!({"is_typing": is_typing}))
            .await
    }

    pub async fn set_muted(&self, group_id: &str, user_id: &str, muted: bool) -> Result<bool> {
        self.patch_chat_member(group_id, user_id, json!({"is_muted": muted}))
            .await
    }

    pub async fn update_notification_settings(
        &self,
        group_id: &str,
        user_id: &str,
        settings: &NotificationSettings,
    ) -> Result<bool> {
        self.patch_chat_member(
            group_id,
            user_id,
            json!({"notification_settings": settings}),
        )
        .await
    }

    /// 把已读游标推进到 `seen_at`
    pub async fn update_last_seen(&self, group_id: &str, user_id: &str, seen_at: &str) -> Result<bool> {
        self.patch_chat_member(group_id, user_id, json!({"last_seen": seen_at}))
            .await
    }

    /// 标记已读：游标位置由 [`read_cursor_for`] 决定
    pub async fn mark_as_read(&self, group_id: &str, user_id: &str, message_id: &str) -> Result<bool> {
        let cursor = read_cursor_for(message_id);
        debug!(
            "[ChatDao] {} 在群组 {} 标记已读（消息 {}），游标 -> {}",
            user_id, group_id, message_id, cursor
        );
        self.update_last_seen(group_id, user_id, &cursor).await
    }

    /// 未读数：他人发送、未删除、晚于已读游标的消息条数
    ///
    /// 没有成员状态行（从未打开过群聊）时视为没有游标，全部计入。
    pub async fn get_unread_count(&self, group_id: &str, user_id: &str) -> Result<u64> {
        let cursor = self
            .get_chat_member(group_id, user_id)
            .await?
            .and_then(|m| m.last_seen);

        let mut query = Query::table(GROUP_MESSAGES)
            .eq("group_id", group_id)
            .eq("is_deleted", false)
            .neq("sender_id", user_id);
        if let Some(cursor) = cursor.as_deref() {
            query = query.gt("created_at", cursor);
        }
        self.gateway
            .count(&query)
            .await
            .context("统计未读数失败")
    }

    /// 计算群聊统计快照
    pub async fn get_chat_analytics(&self, group_id: &str) -> Result<ChatAnalytics> {
        let today = start_of_today_iso();
        let week_ago = days_ago_iso(7);
        let messages = Query::table(GROUP_MESSAGES)
            .eq("group_id", group_id)
            .eq("is_deleted", false);
        let today_messages = messages
            .clone()
            .select("sender_id")
            .gte("created_at", today.as_str());
        let week_messages = messages.clone().gte("created_at", week_ago.as_str());
        let media_messages = messages
            .clone()
            .in_list("message_type", vec!["image", "video", "file"]);
        let chat_members = Query::table(CHAT_MEMBERS).eq("group_id", group_id);

        let (total_messages, today_rows, messages_this_week, media_messages, total_chat_members) =
            futures_util::try_join!(
                self.gateway.count(&messages),
                self.gateway.select(&today_messages),
                self.gateway.count(&week_messages),
                self.gateway.count(&media_messages),
                self.gateway.count(&chat_members),
            )
            .context("统计群聊数据失败")?;

        let active_members = today_rows
            .iter()
            .filter_map(|row| row.get("sender_id").and_then(Value::as_str))
            .collect::<HashSet<_>>()
            .len() as u64;

        Ok(ChatAnalytics {
            group_id: group_id.to_string(),
            total_messages,
            messages_today: today_rows.len() as u64,
            messages_this_week,
            media_messages,
            active_members,
            total_chat_members,
            most_active_hours: Vec::new(),
            top_contributors: Vec::new(),
            generated_at: now_iso(),
        })
    }
}
