//! 群聊派生视图

use crate::chat::models::{ChatAnalytics, ChatMessage, MessageReaction, MessageType};
use crate::serialization::format_iso;
use chrono::{DateTime, Duration, Utc};

pub fn by_type(messages: &[ChatMessage], message_type: MessageType) -> Vec<&ChatMessage> {
    messages
        .iter()
        .filter(|m| m.message_type == message_type)
        .collect()
}

/// 图片 / 视频 / 文件消息（不含已删除）
pub fn media_messages(messages: &[ChatMessage]) -> Vec<&ChatMessage> {
    messages
        .iter()
        .filter(|m| m.message_type.is_media() && !m.is_deleted)
        .collect()
}

/// 未删除的消息
pub fn visible(messages: &[ChatMessage]) -> Vec<&ChatMessage> {
    messages.iter().filter(|m| !m.is_deleted).collect()
}

pub fn by_sender<'a>(messages: &'a [ChatMessage], user_id: &str) -> Vec<&'a ChatMessage> {
    messages.iter().filter(|m| m.sender_id == user_id).collect()
}

/// 回复了指定消息的消息
pub fn replies_to<'a>(messages: &'a [ChatMessage], message_id: &str) -> Vec<&'a ChatMessage> {
    messages
        .iter()
        .filter(|m| m.reply_to_id.as_deref() == Some(message_id))
        .collect()
}

/// `now` 之前 `hours` 小时内的消息
pub fn within_hours_at(
    messages: &[ChatMessage],
    hours: i64,
    now: DateTime<Utc>,
) -> Vec<&ChatMessage> {
    let cutoff = format_iso(now - Duration::hours(hours));
    messages.iter().filter(|m| m.created_at >= cutoff).collect()
}

pub fn within_hours(messages: &[ChatMessage], hours: i64) -> Vec<&ChatMessage> {
    within_hours_at(messages, hours, Utc::now())
}

/// `now` 所在日（UTC）发出的消息
pub fn today_at(messages: &[ChatMessage], now: DateTime<Utc>) -> Vec<&ChatMessage> {
    let day = now.format("%Y-%m-%d").to_string();
    messages
        .iter()
        .filter(|m| m.created_at.starts_with(&day))
        .collect()
}

/// 按表情聚合回应数，按首次出现顺序
pub fn reaction_counts(reactions: &[MessageReaction]) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for r in reactions {
        match counts.iter_mut().find(|(emoji, _)| *emoji == r.emoji) {
            Some((_, n)) => *n += 1,
            None => counts.push((r.emoji.clone(), 1)),
        }
    }
    counts
}

/// 单条消息上的回应，按表情聚合
pub fn reactions_for(messages: &[ChatMessage], message_id: &str) -> Vec<(String, usize)> {
    messages
        .iter()
        .find(|m| m.id == message_id)
        .map(|m| reaction_counts(&m.reactions))
        .unwrap_or_default()
}

/// 群聊健康度
///
/// 取 `min(100, 今日消息数/10*100)` 与 `min(100, 活跃成员/群聊成员*100)` 的平均值，
/// 截断到 [0, 100]。群聊没有成员时第二项记为 0。
pub fn health_score(analytics: &ChatAnalytics) -> f64 {
    let activity = (analytics.messages_today as f64 / 10.0 * 100.0).min(100.0);
    let participation = if analytics.total_chat_members == 0 {
        0.0
    } else {
        (analytics.active_members as f64 / analytics.total_chat_members as f64 * 100.0).min(100.0)
    };
    ((activity + participation) / 2.0).clamp(0.0, 100.0)
}
