//! 群组数据模型
//!
//! 字段名与后端表列保持一致（snake_case）。

use crate::serialization::deserialize_vec_or_null;
use serde::{Deserialize, Serialize};

/// 群组隐私模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyMode {
    #[default]
    Public,
    Private,
    InviteOnly,
}

/// 技术水平要求
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
    Any,
}

/// 性别偏好
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderPreference {
    Any,
    Male,
    Female,
    Mixed,
}

/// 群组活动地点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupLocation {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// 活动半径（公里）
    #[serde(default)]
    pub radius_km: Option<f64>,
}

/// 加入条件
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JoinRequirements {
    #[serde(default)]
    pub min_age: Option<u32>,
    #[serde(default)]
    pub max_age: Option<u32>,
    #[serde(default)]
    pub skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub gender_preference: Option<GenderPreference>,
}

/// 用户资料（关系展开时嵌入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// 群组
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    pub sport: String,
    #[serde(default)]
    pub location: Option<GroupLocation>,
    #[serde(default)]
    pub privacy: PrivacyMode,
    #[serde(default)]
    pub member_limit: Option<u32>,
    pub created_by: String,
    /// 冗余计数，由活跃成员行重新统计得到
    #[serde(default)]
    pub member_count: u32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "deserialize_vec_or_null")]
    pub rules: Vec<String>,
    #[serde(default)]
    pub requirements: Option<JoinRequirements>,
    pub created_at: String,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Group {
    /// 是否还有空位（无上限视为有空位）
    pub fn has_available_spots(&self) -> bool {
        match self.member_limit {
            None => true,
            Some(limit) => self.member_count < limit,
        }
    }
}

/// 创建群组请求
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub sport: String,
    #[serde(default)]
    pub location: Option<GroupLocation>,
    #[serde(default)]
    pub privacy: PrivacyMode,
    #[serde(default)]
    pub member_limit: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
    #[serde(default)]
    pub requirements: Option<JoinRequirements>,
}

/// 更新群组请求（仅序列化有值的字段）
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct UpdateGroupRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sport: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<GroupLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy: Option<PrivacyMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_limit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<JoinRequirements>,
}

/// 地理位置过滤条件
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoFilter {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_km: f64,
}

/// 群组搜索条件
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupSearchFilters {
    /// 名称模糊匹配
    pub query: Option<String>,
    pub sport: Option<String>,
    /// 任一标签命中即可
    pub tags: Vec<String>,
    pub near: Option<GeoFilter>,
    pub offset: usize,
    pub limit: Option<usize>,
}

/// 成员角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupRole {
    Admin,
    Moderator,
    Member,
}

impl GroupRole {
    /// 角色对应的固定权限表
    pub fn permissions(self) -> MemberPermissions {
        match self {
            GroupRole::Admin => MemberPermissions {
                can_invite: true,
                can_edit_group: true,
                can_create_events: true,
                can_moderate: true,
            },
            GroupRole::Moderator => MemberPermissions {
                can_invite: true,
                can_edit_group: false,
                can_create_events: true,
                can_moderate: true,
            },
            GroupRole::Member => MemberPermissions {
                can_invite: false,
                can_edit_group: false,
                can_create_events: true,
                can_moderate: false,
            },
        }
    }
}

/// 成员权限集
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPermissions {
    pub can_invite: bool,
    pub can_edit_group: bool,
    pub can_create_events: bool,
    pub can_moderate: bool,
}

/// 成员状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Active,
    Pending,
    Banned,
    Left,
}

/// 群组成员
///
/// 权限不单独保存：后端行里的 `permissions` 列在读取时忽略，
/// 始终由 [`GroupRole::permissions`] 推导。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: String,
    pub group_id: String,
    pub user_id: String,
    pub role: GroupRole,
    pub status: MemberStatus,
    pub joined_at: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl GroupMember {
    pub fn permissions(&self) -> MemberPermissions {
        self.role.permissions()
    }

    pub fn is_active(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// 邀请状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
    Expired,
}

/// 入群邀请
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupInvitation {
    pub id: String,
    pub group_id: String,
    pub invited_user_id: String,
    pub invited_by: String,
    #[serde(default)]
    pub message: Option<String>,
    pub status: InvitationStatus,
    pub created_at: String,
    pub expires_at: String,
}

impl GroupInvitation {
    /// 按 `now`（ISO 时间戳）判断是否已过期
    pub fn is_expired_at(&self, now: &str) -> bool {
        self.status == InvitationStatus::Expired
            || (self.status == InvitationStatus::Pending && self.expires_at.as_str() <= now)
    }
}

/// 群组设置（每个群组一行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSettings {
    pub group_id: String,
    #[serde(default = "default_true")]
    pub allow_member_invites: bool,
    #[serde(default)]
    pub require_approval: bool,
    #[serde(default = "default_true")]
    pub allow_media_sharing: bool,
    #[serde(default = "default_true")]
    pub allow_event_creation: bool,
    #[serde(default = "default_true")]
    pub show_member_list: bool,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

impl GroupSettings {
    pub fn defaults_for(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            allow_member_invites: true,
            require_approval: false,
            allow_media_sharing: true,
            allow_event_creation: true,
            show_member_list: true,
            notifications_enabled: true,
        }
    }
}

/// 群组设置更新
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GroupSettingsUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_member_invites: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub require_approval: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_media_sharing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_event_creation: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_member_list: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
}

/// 成员活跃度
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberActivity {
    pub user_id: String,
    pub message_count: u64,
}

/// 热门时段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopularTime {
    pub hour: u32,
    pub count: u64,
}

/// 群组统计快照（按需计算，不持久化）
///
/// `events_this_month`、`retention_rate`、`attendance_rate`、`member_activity`、
/// `popular_times` 目前没有后端数据来源，恒为 0 / 空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupAnalytics {
    pub group_id: String,
    pub total_members: u64,
    pub active_members: u64,
    pub new_members_this_week: u64,
    pub new_members_this_month: u64,
    pub total_messages: u64,
    pub messages_this_week: u64,
    pub events_this_month: u64,
    pub engagement_rate: f64,
    pub growth_rate: f64,
    pub retention_rate: f64,
    pub attendance_rate: f64,
    pub member_activity: Vec<MemberActivity>,
    pub popular_times: Vec<PopularTime>,
    pub generated_at: String,
}
