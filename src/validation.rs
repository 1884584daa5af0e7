//! 输入校验
//!
//! 在请求到达数据访问层之前拒绝不合法的输入。每条规则对应一个错误变体，
//! 错误文案直接展示给用户。

use crate::chat::models::{ChatSettingsUpdate, MessageType, NotificationSettings, SendMessageRequest};
use crate::groups::models::{CreateGroupRequest, UpdateGroupRequest};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub const GROUP_NAME_MIN: usize = 3;
pub const GROUP_NAME_MAX: usize = 50;
pub const DESCRIPTION_MAX: usize = 500;
pub const MEMBER_LIMIT_MIN: u32 = 2;
pub const MEMBER_LIMIT_MAX: u32 = 1000;
pub const MESSAGE_MAX: usize = 1000;
pub const AUTO_DELETE_MIN_DAYS: u32 = 1;
pub const AUTO_DELETE_MAX_DAYS: u32 = 365;

static EMOJI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:[\x{1F300}-\x{1FAFF}\x{1F1E6}-\x{1F1FF}\x{2600}-\x{27BF}\x{2300}-\x{23FF}\x{2B00}-\x{2BFF}][\x{FE0F}\x{200D}\x{20E3}\x{1F3FB}-\x{1F3FF}]*)+$",
    )
    .expect("emoji pattern")
});

static HH_MM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[01]\d|2[0-3]):[0-5]\d$").expect("time pattern"));

/// 校验失败
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Group name is required")]
    NameRequired,
    #[error("Group name must be between 3 and 50 characters")]
    NameLength,
    #[error("Description must be 500 characters or less")]
    DescriptionTooLong,
    #[error("Member limit must be between 2 and 1000")]
    MemberLimitOutOfRange,
    #[error("Message content is required")]
    ContentRequired,
    #[error("Message must be 1000 characters or less")]
    ContentTooLong,
    #[error("Emoji is required")]
    EmojiRequired,
    #[error("Invalid emoji")]
    InvalidEmoji,
    #[error("Auto-delete days must be between 1 and 365")]
    AutoDeleteOutOfRange,
    #[error("Quiet hours must use HH:MM format")]
    InvalidQuietHours,
    #[error("No user is signed in")]
    NotSignedIn,
}

fn validate_name(name: &str) -> Result<(), ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::NameRequired);
    }
    let len = name.chars().count();
    if !(GROUP_NAME_MIN..=GROUP_NAME_MAX).contains(&len) {
        return Err(ValidationError::NameLength);
    }
    Ok(())
}

fn validate_description(description: Option<&str>) -> Result<(), ValidationError> {
    match description {
        Some(d) if d.chars().count() > DESCRIPTION_MAX => Err(ValidationError::DescriptionTooLong),
        _ => Ok(()),
    }
}

fn validate_member_limit(limit: Option<u32>) -> Result<(), ValidationError> {
    match limit {
        Some(n) if !(MEMBER_LIMIT_MIN..=MEMBER_LIMIT_MAX).contains(&n) => {
            Err(ValidationError::MemberLimitOutOfRange)
        }
        _ => Ok(()),
    }
}

pub fn validate_create_group(req: &CreateGroupRequest) -> Result<(), ValidationError> {
    validate_name(&req.name)?;
    validate_description(req.description.as_deref())?;
    validate_member_limit(req.member_limit)
}

/// 只校验请求中出现的字段
pub fn validate_update_group(req: &UpdateGroupRequest) -> Result<(), ValidationError> {
    if let Some(name) = req.name.as_deref() {
        validate_name(name)?;
    }
    validate_description(req.description.as_deref())?;
    validate_member_limit(req.member_limit)
}

pub fn validate_message_content(content: &str) -> Result<(), ValidationError> {
    if content.trim().is_empty() {
        return Err(ValidationError::ContentRequired);
    }
    if content.chars().count() > MESSAGE_MAX {
        return Err(ValidationError::ContentTooLong);
    }
    Ok(())
}

/// 文本消息必须有内容；媒体 / 系统消息只限制长度
pub fn validate_send_message(req: &SendMessageRequest) -> Result<(), ValidationError> {
    if req.message_type == MessageType::Text {
        return validate_message_content(&req.content);
    }
    if req.content.chars().count() > MESSAGE_MAX {
        return Err(ValidationError::ContentTooLong);
    }
    Ok(())
}

pub fn validate_emoji(emoji: &str) -> Result<(), ValidationError> {
    if emoji.trim().is_empty() {
        return Err(ValidationError::EmojiRequired);
    }
    if !EMOJI.is_match(emoji) {
        return Err(ValidationError::InvalidEmoji);
    }
    Ok(())
}

pub fn validate_chat_settings(update: &ChatSettingsUpdate) -> Result<(), ValidationError> {
    match update.auto_delete_days {
        Some(days) if !(AUTO_DELETE_MIN_DAYS..=AUTO_DELETE_MAX_DAYS).contains(&days) => {
            Err(ValidationError::AutoDeleteOutOfRange)
        }
        _ => Ok(()),
    }
}

/// 开始与结束同时给出时才校验格式
pub fn validate_notification_settings(settings: &NotificationSettings) -> Result<(), ValidationError> {
    if let (Some(start), Some(end)) = (
        settings.quiet_hours_start.as_deref(),
        settings.quiet_hours_end.as_deref(),
    ) {
        if !HH_MM.is_match(start) || !HH_MM.is_match(end) {
            return Err(ValidationError::InvalidQuietHours);
        }
    }
    Ok(())
}
