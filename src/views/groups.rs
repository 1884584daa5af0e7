//! 群组派生视图
//!
//! 对状态快照的纯同步过滤 / 聚合，不触发任何网络访问。

use crate::groups::models::{
    Group, GroupAnalytics, GroupInvitation, GroupMember, GroupRole, InvitationStatus,
    MemberPermissions, PrivacyMode,
};
use crate::serialization::{format_iso, parse_iso};
use crate::views::geo::distance_km;
use chrono::{DateTime, Duration, Utc};

/// 默认的“最近创建”窗口（天）
pub const RECENT_DAYS: i64 = 7;

/// 按运动项目过滤（大小写不敏感的精确匹配）
pub fn by_sport<'a>(groups: &'a [Group], sport: &str) -> Vec<&'a Group> {
    groups
        .iter()
        .filter(|g| g.sport.to_lowercase() == sport.to_lowercase())
        .collect()
}

pub fn by_privacy(groups: &[Group], privacy: PrivacyMode) -> Vec<&Group> {
    groups.iter().filter(|g| g.privacy == privacy).collect()
}

/// 任一查询标签出现在群组标签中即命中
pub fn by_tags<'a>(groups: &'a [Group], tags: &[String]) -> Vec<&'a Group> {
    groups
        .iter()
        .filter(|g| tags.iter().any(|t| g.tags.contains(t)))
        .collect()
}

/// 名称包含关键字（大小写不敏感）
pub fn search_by_name<'a>(groups: &'a [Group], query: &str) -> Vec<&'a Group> {
    let query = query.trim().to_lowercase();
    groups
        .iter()
        .filter(|g| g.name.to_lowercase().contains(&query))
        .collect()
}

/// 无人数上限，或当前人数小于上限
pub fn with_available_spots(groups: &[Group]) -> Vec<&Group> {
    groups.iter().filter(|g| g.has_available_spots()).collect()
}

/// `now` 之前 `days` 天内创建的群组
pub fn recently_created_at(groups: &[Group], days: i64, now: DateTime<Utc>) -> Vec<&Group> {
    let cutoff = format_iso(now - Duration::days(days));
    groups
        .iter()
        .filter(|g| parse_iso(&g.created_at).is_some() && g.created_at >= cutoff)
        .collect()
}

pub fn recently_created(groups: &[Group], days: i64) -> Vec<&Group> {
    recently_created_at(groups, days, Utc::now())
}

/// 按成员数降序（稳定排序，同数保持原顺序）
pub fn most_active(groups: &[Group], limit: Option<usize>) -> Vec<&Group> {
    let mut sorted: Vec<&Group> = groups.iter().collect();
    sorted.sort_by(|a, b| b.member_count.cmp(&a.member_count));
    sorted.truncate(limit.unwrap_or(usize::MAX));
    sorted
}

/// 活动地点在半径内（含边界）的群组，没有地点的群组不参与
pub fn nearby(groups: &[Group], latitude: f64, longitude: f64, radius_km: f64) -> Vec<&Group> {
    groups
        .iter()
        .filter(|g| {
            g.location.as_ref().is_some_and(|loc| {
                distance_km(latitude, longitude, loc.latitude, loc.longitude) <= radius_km
            })
        })
        .collect()
}

pub fn members_by_role(members: &[GroupMember], role: GroupRole) -> Vec<&GroupMember> {
    members.iter().filter(|m| m.role == role).collect()
}

pub fn admins(members: &[GroupMember]) -> Vec<&GroupMember> {
    members_by_role(members, GroupRole::Admin)
}

pub fn moderators(members: &[GroupMember]) -> Vec<&GroupMember> {
    members_by_role(members, GroupRole::Moderator)
}

/// 某用户在成员列表中的角色
pub fn role_of(members: &[GroupMember], user_id: &str) -> Option<GroupRole> {
    members
        .iter()
        .find(|m| m.user_id == user_id && m.is_active())
        .map(|m| m.role)
}

/// 某用户的权限集；非成员返回 None
pub fn permissions_of(members: &[GroupMember], user_id: &str) -> Option<MemberPermissions> {
    role_of(members, user_id).map(GroupRole::permissions)
}

pub fn is_admin(members: &[GroupMember], user_id: &str) -> bool {
    role_of(members, user_id) == Some(GroupRole::Admin)
}

pub fn can_invite(members: &[GroupMember], user_id: &str) -> bool {
    permissions_of(members, user_id).is_some_and(|p| p.can_invite)
}

pub fn can_edit_group(members: &[GroupMember], user_id: &str) -> bool {
    permissions_of(members, user_id).is_some_and(|p| p.can_edit_group)
}

pub fn can_moderate(members: &[GroupMember], user_id: &str) -> bool {
    permissions_of(members, user_id).is_some_and(|p| p.can_moderate)
}

pub fn can_create_events(members: &[GroupMember], user_id: &str) -> bool {
    permissions_of(members, user_id).is_some_and(|p| p.can_create_events)
}

/// 仍可处理的邀请（pending 且未过期）
pub fn pending_invitations<'a>(
    invitations: &'a [GroupInvitation],
    now: DateTime<Utc>,
) -> Vec<&'a GroupInvitation> {
    let now = format_iso(now);
    invitations
        .iter()
        .filter(|i| i.status == InvitationStatus::Pending && !i.is_expired_at(&now))
        .collect()
}

/// 群组健康度：`0.3*参与 + 0.2*增长 + 0.3*留存 + 0.2*出勤`，截断到 [0, 100]
pub fn health_score(analytics: &GroupAnalytics) -> f64 {
    let score = 0.3 * analytics.engagement_rate
        + 0.2 * analytics.growth_rate
        + 0.3 * analytics.retention_rate
        + 0.2 * analytics.attendance_rate;
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}
