//! 群组数据访问层（DAO）
//!
//! 把群组 / 成员 / 设置 / 邀请 / 统计相关的操作翻译为网关调用。
//! 查询不到数据时返回 `Ok(None)` 或空集合；网关错误原样向上传递，
//! 由状态层在动作边界统一降级。

use crate::gateway::{decode_first, decode_rows, escape_like, Gateway, Query};
use crate::groups::models::{
    CreateGroupRequest, Group, GroupAnalytics, GroupInvitation, GroupMember, GroupRole,
    GroupSearchFilters, GroupSettings, GroupSettingsUpdate, InvitationStatus, MemberStatus,
    UpdateGroupRequest,
};
use crate::serialization::{days_ago_iso, format_iso, now_iso};
use crate::views::geo::distance_km;
use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const GROUPS: &str = "groups";
pub const GROUP_MEMBERS: &str = "group_members";
pub const GROUP_SETTINGS: &str = "group_settings";
pub const GROUP_INVITATIONS: &str = "group_invitations";

/// 邀请有效期（天）
pub const INVITATION_TTL_DAYS: i64 = 7;

const MEMBER_SELECT: &str = "*,user:profiles(*)";

/// 群组 DAO
#[derive(Clone)]
pub struct GroupDao {
    gateway: Arc<dyn Gateway>,
}

impl GroupDao {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }

    /// 创建群组：写入群组行、创建者的管理员成员行和默认设置
    pub async fn create_group(&self, req: &CreateGroupRequest, creator_id: &str) -> Result<Group> {
        let now = now_iso();
        let row = json!({
            "name": req.name.trim(),
            "description": req.description,
            "avatar_url": req.avatar_url,
            "sport": req.sport,
            "location": req.location,
            "privacy": req.privacy,
            "member_limit": req.member_limit,
            "created_by": creator_id,
            "member_count": 1,
            "is_active": true,
            "tags": req.tags,
            "rules": req.rules,
            "requirements": req.requirements,
            "created_at": now,
            "updated_at": now,
        });
        let inserted = self
            .gateway
            .insert(GROUPS, row)
            .await
            .context("创建群组失败")?;
        let group: Group = serde_json::from_value(inserted).context("解析群组失败")?;
        info!("[GroupDao] 创建群组 {} ({})", group.name, group.id);

        let setup = async {
            self.insert_membership(&group.id, creator_id, GroupRole::Admin)
                .await?;
            let settings = serde_json::to_value(GroupSettings::defaults_for(&group.id))?;
            self.gateway
                .insert(GROUP_SETTINGS, settings)
                .await
                .context("创建群组设置失败")?;
            Ok::<_, anyhow::Error>(())
        };
        if let Err(err) = setup.await {
            self.discard_group(&group.id).await;
            return Err(err);
        }

        Ok(group)
    }

    /// 创建过程中途失败时撤销已写入的行，不留下没有管理员的群组
    async fn discard_group(&self, group_id: &str) {
        for table in [GROUP_SETTINGS, GROUP_MEMBERS] {
            if let Err(err) = self
                .gateway
                .delete(&Query::table(table).eq("group_id", group_id))
                .await
            {
                warn!("[GroupDao] 撤销群组 {} 的 {} 失败: {:#}", group_id, table, err);
            }
        }
        match self
            .gateway
            .delete(&Query::table(GROUPS).eq("id", group_id))
            .await
        {
            Ok(_) => warn!("[GroupDao] 群组 {} 创建未完成，已撤销", group_id),
            Err(err) => warn!("[GroupDao] 撤销群组 {} 失败: {:#}", group_id, err),
        }
    }

    pub async fn get_group(&self, group_id: &str) -> Result<Option<Group>> {
        let rows = self
            .gateway
            .select(&Query::table(GROUPS).eq("id", group_id).limit(1))
            .await
            .context("查询群组失败")?;
        decode_first(rows)
    }

    /// 用户以活跃身份加入的全部群组，新建的在前
    pub async fn get_user_groups(&self, user_id: &str) -> Result<Vec<Group>> {
        let memberships = self
            .gateway
            .select(
                &Query::table(GROUP_MEMBERS)
                    .select("group_id")
                    .eq("user_id", user_id)
                    .eq("status", "active"),
            )
            .await
            .context("查询用户成员关系失败")?;

        let ids: Vec<String> = memberships
            .iter()
            .filter_map(|row| row.get("group_id").and_then(Value::as_str))
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            debug!("[GroupDao] 用户 {} 未加入任何群组", user_id);
            return Ok(Vec::new());
        }

        let rows = self
            .gateway
            .select(
                &Query::table(GROUPS)
                    .in_list("id", ids)
                    .eq("is_active", true)
                    .order("created_at", false),
            )
            .await
            .context("查询群组列表失败")?;
        decode_rows(rows)
    }

    /// 搜索公开可见的活跃群组
    pub async fn search_groups(&self, filters: &GroupSearchFilters) -> Result<Vec<Group>> {
        let mut query = Query::table(GROUPS)
            .eq("is_active", true)
            .eq("privacy", "public")
            .order("created_at", false);
        if let Some(q) = filters.query.as_deref().filter(|q| !q.trim().is_empty()) {
            query = query.ilike("name", format!("%{}%", escape_like(q.trim())));
        }
        if let Some(sport) = filters.sport.as_deref() {
            // 大小写不敏感的精确匹配
            query = query.ilike("sport", escape_like(sport));
        }
        if !filters.tags.is_empty() {
            query = query.overlaps("tags", filters.tags.clone());
        }
        // 距离过滤在本地完成，分页只能放在过滤之后
        if filters.near.is_none() {
            if let Some(limit) = filters.limit {
                query = query.range(filters.offset, limit);
            }
        }

        let rows = self
            .gateway
            .select(&query)
            .await
            .context("搜索群组失败")?;
        let groups: Vec<Group> = decode_rows(rows)?;

        let Some(near) = filters.near else {
            return Ok(groups);
        };
        let nearby = groups.into_iter().filter(|g| {
            g.location.as_ref().is_some_and(|loc| {
                distance_km(near.latitude, near.longitude, loc.latitude, loc.longitude)
                    <= near.radius_km
            })
        });
        Ok(nearby
            .skip(filters.offset)
            .take(filters.limit.unwrap_or(usize::MAX))
            .collect())
    }

    pub async fn update_group(
        &self,
        group_id: &str,
        update: &UpdateGroupRequest,
    ) -> Result<Option<Group>> {
        let mut patch = serde_json::to_value(update)?;
        if let Value::Object(obj) = &mut patch {
            obj.insert("updated_at".into(), Value::String(now_iso()));
        }
        let rows = self
            .gateway
            .update(&Query::table(GROUPS).eq("id", group_id), patch)
            .await
            .context("更新群组失败")?;
        decode_first(rows)
    }

    /// 软停用
    pub async fn deactivate_group(&self, group_id: &str) -> Result<bool> {
        let rows = self
            .gateway
            .update(
                &Query::table(GROUPS).eq("id", group_id),
                json!({"is_active": false, "updated_at": now_iso()}),
            )
            .await
            .context("停用群组失败")?;
        Ok(!rows.is_empty())
    }

    /// 物理删除
    pub async fn delete_group(&self, group_id: &str) -> Result<bool> {
        let removed = self
            .gateway
            .delete(&Query::table(GROUPS).eq("id", group_id))
            .await
            .context("删除群组失败")?;
        warn!("[GroupDao] 物理删除群组 {}，删除行数 {}", group_id, removed);
        Ok(removed > 0)
    }

    /// 活跃成员，按加入时间升序
    pub async fn get_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>> {
        let rows = self
            .gateway
            .select(
                &Query::table(GROUP_MEMBERS)
                    .select(MEMBER_SELECT)
                    .eq("group_id", group_id)
                    .eq("status", "active")
                    .order("joined_at", true),
            )
            .await
            .context("查询群组成员失败")?;
        decode_rows(rows)
    }

    pub async fn get_member(&self, group_id: &str, user_id: &str) -> Result<Option<GroupMember>> {
        let rows = self
            .gateway
            .select(
                &Query::table(GROUP_MEMBERS)
                    .select(MEMBER_SELECT)
                    .eq("group_id", group_id)
                    .eq("user_id", user_id)
                    .limit(1),
            )
            .await
            .context("查询成员失败")?;
        decode_first(rows)
    }

    fn membership_row(group_id: &str, user_id: &str, role: GroupRole) -> Result<Value> {
        Ok(json!({
            "group_id": group_id,
            "user_id": user_id,
            "role": role,
            "status": MemberStatus::Active,
            "permissions": serde_json::to_value(role.permissions())?,
            "joined_at": now_iso(),
        }))
    }

    async fn insert_membership(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<GroupMember> {
        let row = Self::membership_row(group_id, user_id, role)?;
        let inserted = self
            .gateway
            .insert(GROUP_MEMBERS, row)
            .await
            .context("写入成员失败")?;
        Ok(serde_json::from_value(inserted)?)
    }

    /// 添加成员；已有（离开 / 待审核）记录时重新激活，之后重算成员数
    pub async fn add_member(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<GroupMember> {
        let member = match self.get_member(group_id, user_id).await? {
            Some(existing) => {
                debug!(
                    "[GroupDao] 用户 {} 在群组 {} 已有记录（{:?}），重新激活",
                    user_id, group_id, existing.status
                );
                let rows = self
                    .gateway
                    .update(
                        &Query::table(GROUP_MEMBERS).eq("id", existing.id.as_str()),
                        Self::membership_row(group_id, user_id, role)?,
                    )
                    .await
                    .context("重新激活成员失败")?;
                decode_first::<GroupMember>(rows)?.ok_or_else(|| anyhow!("成员记录已不存在: {}", existing.id))?
            }
            None => self.insert_membership(group_id, user_id, role).await?,
        };

        self.update_member_count(group_id).await?;
        info!("[GroupDao] 用户 {} 加入群组 {}，角色 {:?}", user_id, group_id, role);
        Ok(member)
    }

    /// 移除成员（状态置为 left），之后重算成员数
    pub async fn remove_member(&self, group_id: &str, user_id: &str) -> Result<bool> {
        let rows = self
            .gateway
            .update(
                &Query::table(GROUP_MEMBERS)
                    .eq("group_id", group_id)
                    .eq("user_id", user_id)
                    .eq("status", "active"),
                json!({"status": MemberStatus::Left}),
            )
            .await
            .context("移除成员失败")?;

        self.update_member_count(group_id).await?;
        info!(
            "[GroupDao] 用户 {} 离开群组 {}，影响行数 {}",
            user_id,
            group_id,
            rows.len()
        );
        Ok(!rows.is_empty())
    }

    /// 修改角色，同时整体覆盖权限集
    pub async fn update_member_role(
        &self,
        group_id: &str,
        user_id: &str,
        role: GroupRole,
    ) -> Result<Option<GroupMember>> {
        let rows = self
            .gateway
            .update(
                &Query::table(GROUP_MEMBERS)
                    .eq("group_id", group_id)
                    .eq("user_id", user_id),
                json!({
                    "role": role,
                    "permissions": serde_json::to_value(role.permissions())?,
                }),
            )
            .await
            .context("更新成员角色失败")?;
        decode_first(rows)
    }

    /// 按活跃成员行重新统计并写回 `member_count`
    pub async fn update_member_count(&self, group_id: &str) -> Result<u64> {
        let count = self
            .gateway
            .count(
                &Query::table(GROUP_MEMBERS)
                    .eq("group_id", group_id)
                    .eq("status", "active"),
            )
            .await
            .context("统计成员数失败")?;
        self.gateway
            .update(
                &Query::table(GROUPS).eq("id", group_id),
                json!({"member_count": count}),
            )
            .await
            .context("写回成员数失败")?;
        debug!("[GroupDao] 群组 {} 成员数 -> {}", group_id, count);
        Ok(count)
    }

    pub async fn get_group_settings(&self, group_id: &str) -> Result<Option<GroupSettings>> {
        let rows = self
            .gateway
            .select(&Query::table(GROUP_SETTINGS).eq("group_id", group_id).limit(1))
            .await
            .context("查询群组设置失败")?;
        decode_first(rows)
    }

    /// 原地更新设置；群组还没有设置行时以默认值补建
    pub async fn update_group_settings(
        &self,
        group_id: &str,
        update: &GroupSettingsUpdate,
    ) -> Result<GroupSettings> {
        let patch = serde_json::to_value(update)?;
        let rows = self
            .gateway
            .update(
                &Query::table(GROUP_SETTINGS).eq("group_id", group_id),
                patch.clone(),
            )
            .await
            .context("更新群组设置失败")?;
        if let Some(settings) = decode_first(rows)? {
            return Ok(settings);
        }

        let mut row = serde_json::to_value(GroupSettings::defaults_for(group_id))?;
        if let (Value::Object(base), Value::Object(patch)) = (&mut row, patch) {
            base.extend(patch);
        }
        let inserted = self
            .gateway
            .insert(GROUP_SETTINGS, row)
            .await
            .context("创建群组设置失败")?;
        Ok(serde_json::from_value(inserted)?)
    }

    /// 发出邀请，有效期固定 7 天
    pub async fn invite_user(
        &self,
        group_id: &str,
        invited_user_id: &str,
        invited_by: &str,
        message: Option<&str>,
    ) -> Result<GroupInvitation> {
        let now = Utc::now();
        let row = json!({
            "group_id": group_id,
            "invited_user_id": invited_user_id,
            "invited_by": invited_by,
            "message": message,
            "status": InvitationStatus::Pending,
            "created_at": format_iso(now),
            "expires_at": format_iso(now + Duration::days(INVITATION_TTL_DAYS)),
        });
        let inserted = self
            .gateway
            .insert(GROUP_INVITATIONS, row)
            .await
            .context("创建邀请失败")?;
        info!(
            "[GroupDao] {} 邀请 {} 加入群组 {}",
            invited_by, invited_user_id, group_id
        );
        Ok(serde_json::from_value(inserted)?)
    }

    /// 用户待处理的邀请，新的在前
    pub async fn get_user_invitations(&self, user_id: &str) -> Result<Vec<GroupInvitation>> {
        let rows = self
            .gateway
            .select(
                &Query::table(GROUP_INVITATIONS)
                    .eq("invited_user_id", user_id)
                    .eq("status", "pending")
                    .order("created_at", false),
            )
            .await
            .context("查询邀请失败")?;
        decode_rows(rows)
    }

    /// 接受或拒绝邀请
    ///
    /// 只有 pending 状态的邀请可以转换一次；已过期的邀请在此时被标记为 expired
    /// 并返回 false。接受时以普通成员身份入群。
    pub async fn respond_to_invitation(&self, invitation_id: &str, accept: bool) -> Result<bool> {
        let pending = Query::table(GROUP_INVITATIONS)
            .eq("id", invitation_id)
            .eq("status", "pending");
        let rows = self
            .gateway
            .select(&pending)
            .await
            .context("查询邀请失败")?;
        let Some(invitation) = decode_first::<GroupInvitation>(rows)? else {
            warn!("[GroupDao] 邀请 {} 不存在或已处理", invitation_id);
            return Ok(false);
        };

        if invitation.is_expired_at(&now_iso()) {
            self.gateway
                .update(&pending, json!({"status": InvitationStatus::Expired}))
                .await
                .context("标记邀请过期失败")?;
            warn!("[GroupDao] 邀请 {} 已过期", invitation_id);
            return Ok(false);
        }

        let status = if accept {
            InvitationStatus::Accepted
        } else {
            InvitationStatus::Declined
        };
        let updated = self
            .gateway
            .update(&pending, json!({"status": status}))
            .await
            .context("更新邀请状态失败")?;
        if updated.is_empty() {
            return Ok(false);
        }

        if accept {
            if let Err(err) = self
                .add_member(
                    &invitation.group_id,
                    &invitation.invited_user_id,
                    GroupRole::Member,
                )
                .await
            {
                // 入群失败时把邀请退回 pending，允许重试
                let reopen = Query::table(GROUP_INVITATIONS)
                    .eq("id", invitation_id)
                    .eq("status", "accepted");
                if let Err(revert) = self
                    .gateway
                    .update(&reopen, json!({"status": InvitationStatus::Pending}))
                    .await
                {
                    warn!("[GroupDao] 邀请 {} 回退失败: {:#}", invitation_id, revert);
                }
                return Err(err);
            }
        }
        info!("[GroupDao] 邀请 {} -> {:?}", invitation_id, status);
        Ok(true)
    }

    /// 计算群组统计快照
    pub async fn get_group_analytics(&self, group_id: &str) -> Result<GroupAnalytics> {
        let week_ago = days_ago_iso(7);
        let month_ago = days_ago_iso(30);
        let members = Query::table(GROUP_MEMBERS)
            .eq("group_id", group_id)
            .eq("status", "active");
        let messages = Query::table(crate::chat::dao::GROUP_MESSAGES)
            .eq("group_id", group_id)
            .eq("is_deleted", false);

        let joined_this_week = members.clone().gte("joined_at", week_ago.as_str());
        let joined_this_month = members.clone().gte("joined_at", month_ago.as_str());
        let week_messages = messages
            .clone()
            .select("sender_id")
            .gte("created_at", week_ago.as_str());

        let (total_members, new_week, new_month, total_messages, week_senders) =
            futures_util::try_join!(
                self.gateway.count(&members),
                self.gateway.count(&joined_this_week),
                self.gateway.count(&joined_this_month),
                self.gateway.count(&messages),
                self.gateway.select(&week_messages),
            )
            .context("统计群组数据失败")?;

        let messages_this_week = week_senders.len() as u64;
        let active_members = week_senders
            .iter()
            .filter_map(|row| row.get("sender_id").and_then(Value::as_str))
            .collect::<HashSet<_>>()
            .len() as u64;

        let engagement_rate = if total_members > 0 {
            (active_members as f64 / total_members as f64 * 100.0).min(100.0)
        } else {
            0.0
        };
        let base = total_members.saturating_sub(new_month);
        let growth_rate = if base > 0 {
            (new_month as f64 / base as f64 * 100.0).min(100.0)
        } else if new_month > 0 {
            100.0
        } else {
            0.0
        };

        Ok(GroupAnalytics {
            group_id: group_id.to_string(),
            total_members,
            active_members,
            new_members_this_week: new_week,
            new_members_this_month: new_month,
            total_messages,
            messages_this_week,
            events_this_month: 0,
            engagement_rate,
            growth_rate,
            retention_rate: 0.0,
            attendance_rate: 0.0,
            member_activity: Vec::new(),
            popular_times: Vec::new(),
            generated_at: now_iso(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::groups::models::{GeoFilter, GroupLocation, PrivacyMode};

    fn setup() -> (Arc<MemoryGateway>, GroupDao) {
        let gw = Arc::new(MemoryGateway::new());
        (gw.clone(), GroupDao::new(gw))
    }

    fn request(name: &str) -> CreateGroupRequest {
        CreateGroupRequest {
            name: name.to_string(),
            sport: "Running".to_string(),
            privacy: PrivacyMode::Public,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_group_adds_admin_and_settings() {
        let (gw, dao) = setup();
        let group = dao.create_group(&request("Sunday Runners"), "u1").await.unwrap();

        assert_eq!(group.member_count, 1);
        assert!(group.is_active);
        let members = dao.get_group_members(&group.id).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].user_id, "u1");
        assert_eq!(members[0].role, GroupRole::Admin);
        assert_eq!(gw.rows(GROUP_SETTINGS).len(), 1);
        assert_eq!(
            gw.rows(GROUP_MEMBERS)[0]["permissions"]["can_edit_group"],
            true
        );
    }

    #[tokio::test]
    async fn member_count_tracks_active_rows() {
        let (_gw, dao) = setup();
        let group = dao.create_group(&request("Climbers"), "u1").await.unwrap();

        dao.add_member(&group.id, "u2", GroupRole::Member).await.unwrap();
        dao.add_member(&group.id, "u3", GroupRole::Member).await.unwrap();
        assert!(dao.remove_member(&group.id, "u2").await.unwrap());
        assert_eq!(dao.get_group(&group.id).await.unwrap().unwrap().member_count, 2);

        // 再次加入复用已有行
        dao.add_member(&group.id, "u2", GroupRole::Moderator).await.unwrap();
        let g = dao.get_group(&group.id).await.unwrap().unwrap();
        assert_eq!(g.member_count, 3);
        let m = dao.get_member(&group.id, "u2").await.unwrap().unwrap();
        assert_eq!(m.role, GroupRole::Moderator);
        assert!(m.is_active());

        assert!(!dao.remove_member(&group.id, "nobody").await.unwrap());
    }

    #[tokio::test]
    async fn role_update_rewrites_whole_permission_set() {
        let (gw, dao) = setup();
        let group = dao.create_group(&request("Padel"), "u1").await.unwrap();
        dao.add_member(&group.id, "u2", GroupRole::Admin).await.unwrap();

        let m = dao
            .update_member_role(&group.id, "u2", GroupRole::Member)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(m.permissions(), GroupRole::Member.permissions());
        let row = gw
            .rows(GROUP_MEMBERS)
            .into_iter()
            .find(|r| r["user_id"] == "u2")
            .unwrap();
        assert_eq!(
            row["permissions"],
            serde_json::to_value(GroupRole::Member.permissions()).unwrap()
        );
    }

    #[tokio::test]
    async fn user_groups_only_include_active_memberships() {
        let (_gw, dao) = setup();
        let a = dao.create_group(&request("A group"), "u1").await.unwrap();
        let b = dao.create_group(&request("B group"), "u2").await.unwrap();
        dao.add_member(&b.id, "u1", GroupRole::Member).await.unwrap();
        dao.remove_member(&b.id, "u1").await.unwrap();

        let groups = dao.get_user_groups("u1").await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].id, a.id);
        assert!(dao.get_user_groups("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_by_name_tags_and_distance() {
        let (_gw, dao) = setup();
        let mut near = request("Morning Runners");
        near.tags = vec!["5k".into()];
        near.location = Some(GroupLocation {
            name: "Park".into(),
            latitude: 0.0,
            longitude: 0.0,
            radius_km: None,
        });
        let mut far = request("Evening Runners");
        far.tags = vec!["trail".into()];
        far.location = Some(GroupLocation {
            name: "Hills".into(),
            latitude: 0.0,
            longitude: 2.0,
            radius_km: None,
        });
        let mut hidden = request("Secret Runners");
        hidden.privacy = PrivacyMode::Private;
        let mut invite_only = request("Invite Runners");
        invite_only.privacy = PrivacyMode::InviteOnly;
        dao.create_group(&near, "u1").await.unwrap();
        dao.create_group(&far, "u1").await.unwrap();
        dao.create_group(&hidden, "u1").await.unwrap();
        dao.create_group(&invite_only, "u1").await.unwrap();

        let everything = dao
            .search_groups(&GroupSearchFilters::default())
            .await
            .unwrap();
        assert_eq!(everything.len(), 2);
        assert!(everything.iter().all(|g| g.privacy == PrivacyMode::Public));

        let by_name = dao
            .search_groups(&GroupSearchFilters {
                query: Some("runners".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_name.len(), 2);

        let by_tag = dao
            .search_groups(&GroupSearchFilters {
                tags: vec!["trail".into(), "marathon".into()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].name, "Evening Runners");

        let nearby = dao
            .search_groups(&GroupSearchFilters {
                near: Some(GeoFilter {
                    latitude: 0.0,
                    longitude: 1.0,
                    radius_km: 112.0,
                }),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(nearby.len(), 2);
    }

    #[tokio::test]
    async fn sport_filter_matches_literally() {
        let (_gw, dao) = setup();
        dao.create_group(&request("Road Crew"), "u1").await.unwrap();
        let mut padel = request("Padel Club");
        padel.sport = "Padel".into();
        dao.create_group(&padel, "u1").await.unwrap();

        let sport = |s: &str| GroupSearchFilters {
            sport: Some(s.into()),
            ..Default::default()
        };
        assert_eq!(dao.search_groups(&sport("padel")).await.unwrap().len(), 1);
        assert!(dao.search_groups(&sport("%")).await.unwrap().is_empty());
        assert!(dao.search_groups(&sport("p_del")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invitation_accept_adds_member_once() {
        let (_gw, dao) = setup();
        let group = dao.create_group(&request("Swimmers"), "u1").await.unwrap();
        let inv = dao
            .invite_user(&group.id, "u2", "u1", Some("join us"))
            .await
            .unwrap();
        assert_eq!(inv.status, InvitationStatus::Pending);
        assert!(inv.expires_at > inv.created_at);
        assert_eq!(dao.get_user_invitations("u2").await.unwrap().len(), 1);

        assert!(dao.respond_to_invitation(&inv.id, true).await.unwrap());
        assert!(!dao.respond_to_invitation(&inv.id, false).await.unwrap());
        assert!(dao.get_user_invitations("u2").await.unwrap().is_empty());
        assert_eq!(dao.get_group(&group.id).await.unwrap().unwrap().member_count, 2);
    }

    #[tokio::test]
    async fn failed_accept_reopens_invitation() {
        let (gw, dao) = setup();
        let group = dao.create_group(&request("Rowers"), "u1").await.unwrap();
        let inv = dao.invite_user(&group.id, "u2", "u1", None).await.unwrap();

        gw.fail_table(GROUP_MEMBERS);
        assert!(dao.respond_to_invitation(&inv.id, true).await.is_err());
        assert_eq!(gw.rows(GROUP_INVITATIONS)[0]["status"], "pending");

        gw.heal_table(GROUP_MEMBERS);
        assert!(dao.respond_to_invitation(&inv.id, true).await.unwrap());
        assert!(dao.get_member(&group.id, "u2").await.unwrap().unwrap().is_active());
        assert_eq!(gw.rows(GROUP_INVITATIONS)[0]["status"], "accepted");
    }

    #[tokio::test]
    async fn failed_create_leaves_no_orphan_group() {
        let (gw, dao) = setup();
        gw.fail_table(GROUP_MEMBERS);
        assert!(dao.create_group(&request("Orphans"), "u1").await.is_err());
        assert!(gw.rows(GROUPS).is_empty());

        gw.heal_table(GROUP_MEMBERS);
        gw.fail_table(GROUP_SETTINGS);
        assert!(dao.create_group(&request("Orphans"), "u1").await.is_err());
        assert!(gw.rows(GROUPS).is_empty());
        assert!(gw.rows(GROUP_MEMBERS).is_empty());
        assert!(dao.get_user_groups("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_invitation_cannot_be_accepted() {
        let (gw, dao) = setup();
        gw.seed(
            GROUP_INVITATIONS,
            vec![json!({
                "id": "inv-old",
                "group_id": "g1",
                "invited_user_id": "u2",
                "invited_by": "u1",
                "status": "pending",
                "created_at": "2020-01-01T00:00:00.000Z",
                "expires_at": "2020-01-08T00:00:00.000Z",
            })],
        );
        assert!(!dao.respond_to_invitation("inv-old", true).await.unwrap());
        assert_eq!(gw.rows(GROUP_INVITATIONS)[0]["status"], "expired");
        assert!(gw.rows(GROUP_MEMBERS).is_empty());
    }

    #[tokio::test]
    async fn settings_update_in_place_or_create() {
        let (gw, dao) = setup();
        let update = GroupSettingsUpdate {
            require_approval: Some(true),
            ..Default::default()
        };
        let created = dao.update_group_settings("g-new", &update).await.unwrap();
        assert!(created.require_approval);
        assert!(created.allow_member_invites);

        let update = GroupSettingsUpdate {
            allow_media_sharing: Some(false),
            ..Default::default()
        };
        let updated = dao.update_group_settings("g-new", &update).await.unwrap();
        assert!(updated.require_approval);
        assert!(!updated.allow_media_sharing);
        assert_eq!(gw.rows(GROUP_SETTINGS).len(), 1);
    }

    #[tokio::test]
    async fn analytics_counts_members_and_messages() {
        let (gw, dao) = setup();
        let group = dao.create_group(&request("Cyclists"), "u1").await.unwrap();
        dao.add_member(&group.id, "u2", GroupRole::Member).await.unwrap();
        gw.seed(
            crate::chat::dao::GROUP_MESSAGES,
            vec![
                json!({"id": "m1", "group_id": group.id, "sender_id": "u1",
                       "is_deleted": false, "created_at": now_iso()}),
                json!({"id": "m2", "group_id": group.id, "sender_id": "u1",
                       "is_deleted": false, "created_at": now_iso()}),
                json!({"id": "m3", "group_id": group.id, "sender_id": "u2",
                       "is_deleted": true, "created_at": now_iso()}),
            ],
        );

        let a = dao.get_group_analytics(&group.id).await.unwrap();
        assert_eq!(a.total_members, 2);
        assert_eq!(a.new_members_this_week, 2);
        assert_eq!(a.total_messages, 2);
        assert_eq!(a.messages_this_week, 2);
        assert_eq!(a.active_members, 1);
        assert_eq!(a.engagement_rate, 50.0);
        assert_eq!(a.growth_rate, 100.0);
        assert_eq!(a.retention_rate, 0.0);
        assert!(a.popular_times.is_empty());
    }

    #[tokio::test]
    async fn gateway_errors_propagate() {
        let (gw, dao) = setup();
        gw.fail_table(GROUPS);
        assert!(dao.get_group("g1").await.is_err());
        assert!(dao.create_group(&request("Broken"), "u1").await.is_err());
    }
}
