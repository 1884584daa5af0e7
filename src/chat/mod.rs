//! 群聊模块
//!
//! 消息、表情回应、群聊设置、在线状态与已读追踪

pub mod dao;
pub mod models;

// 重新导出主要类型
pub use dao::ChatDao;
pub use models::{
    ChatAnalytics, ChatMember, ChatMessage, ChatSettings, ChatSettingsUpdate, MessageReaction,
    MessageType, NotificationSettings, SendMessageRequest, DELETED_PLACEHOLDER,
};
