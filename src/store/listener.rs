//! 状态监听器回调接口

use async_trait::async_trait;

/// 状态监听器，界面层据此重新渲染
#[async_trait]
pub trait StoreListener: Send + Sync {
    /// 快照发生变化，`version` 为变化后的版本号
    async fn on_state_changed(&self, version: u64);

    /// 群组侧动作失败
    async fn on_group_error(&self, error: String);

    /// 群聊侧动作失败
    async fn on_chat_error(&self, error: String);
}

/// 空实现（默认监听器）
pub struct EmptyStoreListener;

#[async_trait]
impl StoreListener for EmptyStoreListener {
    async fn on_state_changed(&self, _version: u64) {}
    async fn on_group_error(&self, _error: String) {}
    async fn on_chat_error(&self, _error: String) {}
}
