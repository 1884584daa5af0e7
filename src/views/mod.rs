//! 派生视图
//!
//! 对状态快照的纯同步投影：按项目 / 角色 / 时间窗口 / 消息类型过滤，以及健康度计算。

pub mod chat;
pub mod geo;
pub mod groups;

pub use geo::distance_km;
