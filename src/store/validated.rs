//! 带输入校验的动作
//!
//! 校验在任何网关调用之前同步完成，失败时直接返回 [`ValidationError`]，
//! 不写入共享的错误槽。校验通过后执行原动作，其空值结果放在 `Ok` 里。

use crate::chat::models::{
    ChatMessage, ChatSettings, ChatSettingsUpdate, MessageReaction, NotificationSettings,
    SendMessageRequest,
};
use crate::groups::models::{CreateGroupRequest, Group, UpdateGroupRequest};
use crate::store::service::GroupStore;
use crate::validation::{
    validate_chat_settings, validate_create_group, validate_emoji, validate_message_content,
    validate_notification_settings, validate_send_message, validate_update_group, ValidationError,
};
use tracing::debug;

impl GroupStore {
    async fn ensure_signed_in(&self) -> Result<(), ValidationError> {
        match self.current_user_id().await {
            Some(_) => Ok(()),
            None => Err(ValidationError::NotSignedIn),
        }
    }

    pub async fn create_group_with_validation(
        &self,
        req: &CreateGroupRequest,
    ) -> Result<Option<Group>, ValidationError> {
        validate_create_group(req)?;
        self.ensure_signed_in().await?;
        Ok(self.create_group(req).await)
    }

    pub async fn update_group_with_validation(
        &self,
        group_id: &str,
        req: &UpdateGroupRequest,
    ) -> Result<Option<Group>, ValidationError> {
        validate_update_group(req)?;
        Ok(self.update_group(group_id, req).await)
    }

    pub async fn send_message_with_validation(
        &self,
        req: &SendMessageRequest,
    ) -> Result<Option<ChatMessage>, ValidationError> {
        validate_send_message(req)?;
        self.ensure_signed_in().await?;
        Ok(self.send_message(req).await)
    }

    pub async fn edit_message_with_validation(
        &self,
        message_id: &str,
        content: &str,
    ) -> Result<Option<ChatMessage>, ValidationError> {
        validate_message_content(content)?;
        Ok(self.edit_message(message_id, content).await)
    }

    pub async fn add_reaction_with_validation(
        &self,
        message_id: &str,
        emoji: &str,
    ) -> Result<Option<MessageReaction>, ValidationError> {
        if let Err(err) = validate_emoji(emoji) {
            debug!("[GroupStore] 拒绝表情回应 {:?}: {}", emoji, err);
            return Err(err);
        }
        self.ensure_signed_in().await?;
        Ok(self.add_reaction(message_id, emoji).await)
    }

    pub async fn update_chat_settings_with_validation(
        &self,
        group_id: &str,
        update: &ChatSettingsUpdate,
    ) -> Result<Option<ChatSettings>, ValidationError> {
        validate_chat_settings(update)?;
        Ok(self.update_chat_settings(group_id, update).await)
    }

    pub async fn update_notification_settings_with_validation(
        &self,
        group_id: &str,
        settings: &NotificationSettings,
    ) -> Result<bool, ValidationError> {
        validate_notification_settings(settings)?;
        self.ensure_signed_in().await?;
        Ok(self.update_notification_settings(group_id, settings).await)
    }
}
