//! 状态模块
//!
//! 群组与群聊的内存快照、动作与监听器

pub mod listener;
pub mod refresh;
pub mod service;
pub mod state;
mod validated;

// 重新导出主要类型
pub use listener::{EmptyStoreListener, StoreListener};
pub use refresh::{Branch, RefreshOutcome, RefreshPolicy};
pub use service::GroupStore;
pub use state::{Domain, GroupState};
