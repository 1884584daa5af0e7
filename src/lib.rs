pub mod chat;
pub mod config;
pub mod gateway;
pub mod groups;
pub mod serialization;
pub mod store;
pub mod validation;
pub mod views;

// 重新导出常用类型和函数，方便外部使用
pub use config::ClientConfig;
pub use gateway::{Gateway, MemoryGateway, Query, RestGateway};
pub use store::{GroupState, GroupStore, RefreshOutcome, StoreListener};
pub use validation::ValidationError;
