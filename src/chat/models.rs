//! 群聊数据模型

use crate::groups::models::UserProfile;
use crate::serialization::deserialize_vec_or_null;
use serde::{Deserialize, Serialize};

/// 删除后的消息内容占位
pub const DELETED_PLACEHOLDER: &str = "[Message deleted]";

/// 消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    Video,
    File,
    System,
}

impl MessageType {
    /// 是否为媒体消息
    pub fn is_media(self) -> bool {
        matches!(self, MessageType::Image | MessageType::Video | MessageType::File)
    }
}

/// 被回复消息的摘要（关系展开）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: String,
    pub sender_id: String,
    pub content: String,
}

/// 表情回应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageReaction {
    pub id: String,
    pub message_id: String,
    pub user_id: String,
    pub emoji: String,
    pub created_at: String,
}

/// 群聊消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<String>,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default)]
    pub edited_at: Option<String>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<String>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub sender: Option<UserProfile>,
    #[serde(default)]
    pub reply_to: Option<ReplyPreview>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub reactions: Vec<MessageReaction>,
}

/// 发送消息请求（发送者取当前登录用户）
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub group_id: String,
    #[serde(default)]
    pub message_type: MessageType,
    pub content: String,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub reply_to_id: Option<String>,
}

/// 单个成员的通知偏好
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub mentions: bool,
    #[serde(default = "default_true")]
    pub all_messages: bool,
    /// `HH:MM`
    #[serde(default)]
    pub quiet_hours_start: Option<String>,
    /// `HH:MM`
    #[serde(default)]
    pub quiet_hours_end: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            mentions: true,
            all_messages: true,
            quiet_hours_start: None,
            quiet_hours_end: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// 群聊成员在线 / 阅读状态
///
/// `last_seen` 同时是已读游标。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMember {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    #[serde(default)]
    pub is_muted: bool,
    #[serde(default)]
    pub is_typing: bool,
    #[serde(default)]
    pub last_seen: Option<String>,
    #[serde(default)]
    pub notification_settings: NotificationSettings,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// 群聊设置（每个群组一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub group_id: String,
    #[serde(default = "default_true")]
    pub allow_media: bool,
    #[serde(default = "default_true")]
    pub allow_links: bool,
    #[serde(default = "default_true")]
    pub allow_mentions: bool,
    #[serde(default)]
    pub moderation_enabled: bool,
    #[serde(default)]
    pub slow_mode_seconds: u32,
    #[serde(default)]
    pub auto_delete_enabled: bool,
    /// 自动删除窗口（天）
    #[serde(default)]
    pub auto_delete_days: Option<u32>,
}

impl ChatSettings {
    pub fn defaults_for(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            allow_media: true,
            allow_links: true,
            allow_mentions: true,
            moderation_enabled: false,
            slow_mode_seconds: 0,
            auto_delete_enabled: false,
            auto_delete_days: None,
        }
    }
}

/// 群聊设置更新
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChatSettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_media: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_links: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_mentions: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderation_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slow_mode_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_delete_days: Option<u32>,
}

/// 发言最多的成员
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopContributor {
    pub user_id: String,
    pub message_count: u64,
}

/// 群聊统计快照
///
/// `most_active_hours`、`top_contributors` 暂无数据来源，恒为空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatAnalytics {
    pub group_id: String,
    pub total_messages: u64,
    pub messages_today: u64,
    pub messages_this_week: u64,
    pub media_messages: u64,
    /// 今日发过言的成员数
    pub active_members: u64,
    pub total_chat_members: u64,
    pub most_active_hours: Vec<u32>,
    pub top_contributors: Vec<TopContributor>,
    pub generated_at: String,
}
