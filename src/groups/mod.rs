//! 群组模块
//!
//! 群组、成员、设置、邀请与群组统计的数据模型和数据访问

pub mod dao;
pub mod models;

// 重新导出主要类型
pub use dao::GroupDao;
pub use models::{
    CreateGroupRequest, GeoFilter, Group, GroupAnalytics, GroupInvitation, GroupLocation,
    GroupMember, GroupRole, GroupSearchFilters, GroupSettings, GroupSettingsUpdate,
    InvitationStatus, MemberPermissions, MemberStatus, PrivacyMode, UpdateGroupRequest,
    UserProfile,
};
