//! 运动群组 CLI 客户端
//!
//! 非交互式 CLI：每次执行一个子命令，通过 REST 网关驱动状态容器并打印结果

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use sports_groups_sdk::chat::models::{MessageType, SendMessageRequest};
use sports_groups_sdk::groups::models::{
    CreateGroupRequest, GeoFilter, GroupRole, GroupSearchFilters, PrivacyMode,
};
use sports_groups_sdk::store::{GroupStore, StoreListener};
use sports_groups_sdk::views;
use sports_groups_sdk::{ClientConfig, RestGateway};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 运动群组 CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "groups-cli")]
#[command(about = "运动群组 CLI 客户端 - 浏览群组、成员与群聊", long_about = None)]
struct Args {
    /// 后端基础地址
    #[arg(long, env = "GROUPS_API_URL")]
    api_url: String,

    /// 后端 api key
    #[arg(long, env = "GROUPS_API_KEY")]
    api_key: String,

    /// 登录后的用户 token
    #[arg(long, env = "GROUPS_ACCESS_TOKEN")]
    access_token: Option<String>,

    /// 当前用户 ID
    #[arg(short, long, env = "GROUPS_USER_ID")]
    user: Option<String>,

    /// 日志级别（默认: info,sports_groups_sdk=debug）
    #[arg(long, default_value = "info,sports_groups_sdk=debug")]
    log_level: String,

    /// 额外写入的日志文件
    #[arg(long)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 我加入的群组
    Groups,
    /// 创建群组
    Create {
        name: String,
        sport: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        member_limit: Option<u32>,
        #[arg(long)]
        private: bool,
    },
    /// 搜索公开群组
    Search {
        query: Option<String>,
        #[arg(long)]
        sport: Option<String>,
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// 纬度,经度,半径公里，例如 `51.5,-0.12,5`
        #[arg(long, allow_hyphen_values = true)]
        near: Option<String>,
    },
    /// 群组详情（成员、设置、统计）
    Show { group_id: String },
    /// 添加成员
    AddMember { group_id: String, user_id: String },
    /// 发送文本消息
    Send { group_id: String, content: String },
    /// 最近的消息
    Messages {
        group_id: String,
        /// 额外向前翻页的次数
        #[arg(long, default_value = "0")]
        pages: u32,
    },
    /// 未读数；`--mark` 时先把最新消息标记为已读
    Unread {
        group_id: String,
        #[arg(long)]
        mark: bool,
    },
    /// 按群聊保留期清理过期消息
    Retention { group_id: String },
    /// 邀请用户
    Invite {
        group_id: String,
        user_id: String,
        #[arg(long)]
        message: Option<String>,
    },
    /// 待处理的邀请
    Invitations,
    /// 接受 / 拒绝邀请
    Respond {
        invitation_id: String,
        #[arg(long)]
        decline: bool,
    },
}

/// 初始化日志（输出到 stdout，可选同时写文件）
fn init_logger(log_level: &str, log_file: Option<&str>) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("无法创建日志文件 {}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false)
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_file {
        info!("[CLI] 📝 日志已同时输出到控制台和文件: {}", path);
    }
    Ok(())
}

/// 解析 `纬度,经度,半径`
fn parse_near(raw: &str) -> Result<GeoFilter> {
    let parts = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("无效的坐标: {}", raw))?;
    match parts.as_slice() {
        [latitude, longitude, radius_km] => Ok(GeoFilter {
            latitude: *latitude,
            longitude: *longitude,
            radius_km: *radius_km,
        }),
        _ => Err(anyhow!("--near 需要 纬度,经度,半径: {}", raw)),
    }
}

struct CliStoreListener;

#[async_trait::async_trait]
impl StoreListener for CliStoreListener {
    async fn on_state_changed(&self, _version: u64) {}

    async fn on_group_error(&self, error: String) {
        error!("[CLI/Group] ❌ {}", error);
    }

    async fn on_chat_error(&self, error: String) {
        error!("[CLI/Chat] ❌ {}", error);
    }
}

fn build_store(args: &Args) -> Result<GroupStore> {
    let mut config = ClientConfig::new(args.api_url.clone(), args.api_key.clone());
    config.access_token = args.access_token.clone();
    config.user_id = args.user.clone();

    let gateway = RestGateway::new(&config)?;
    Ok(GroupStore::with_listener(
        Arc::new(gateway),
        config,
        Arc::new(CliStoreListener),
    ))
}

async fn run(store: &GroupStore, command: Command) -> Result<()> {
    match command {
        Command::Groups => {
            let groups = store.load_user_groups().await;
            info!("[CLI] 📋 群组列表（共 {} 个）:", groups.len());
            for g in &groups {
                info!(
                    "[CLI]   - {} | {} | {} 人 | {}",
                    g.id, g.name, g.member_count, g.sport
                );
            }
        }
        Command::Create {
            name,
            sport,
            description,
            member_limit,
            private,
        } => {
            let req = CreateGroupRequest {
                name,
                sport,
                description,
                member_limit,
                privacy: if private {
                    PrivacyMode::Private
                } else {
                    PrivacyMode::Public
                },
                ..Default::default()
            };
            match store.create_group_with_validation(&req).await? {
                Some(group) => info!("[CLI] ✅ 已创建群组 {} ({})", group.name, group.id),
                None => warn!("[CLI] 创建群组失败"),
            }
        }
        Command::Search {
            query,
            sport,
            tags,
            near,
        } => {
            let near = near.as_deref().map(parse_near).transpose()?;
            let filters = GroupSearchFilters {
                query,
                sport,
                tags,
                near,
                ..Default::default()
            };
            let groups = store.search_groups(&filters).await;
            info!("[CLI] 🔍 搜索结果（共 {} 个）:", groups.len());
            for g in views::groups::most_active(&groups, None) {
                let spots = if g.has_available_spots() { "可加入" } else { "已满" };
                info!("[CLI]   - {} | {} | {} 人 | {}", g.id, g.name, g.member_count, spots);
            }
        }
        Command::Show { group_id } => {
            let outcome = store.refresh_group(&group_id).await;
            if !outcome.is_complete() {
                return Err(anyhow!(outcome.error_message().unwrap_or_default()));
            }
            let state = store.snapshot().await;
            let Some(group) = state.current_group.as_ref() else {
                return Err(anyhow!("群组不存在: {}", group_id));
            };
            info!("[CLI] 🏃 {} | {} | {} 人", group.name, group.sport, group.member_count);
            info!(
                "[CLI]   管理员 {} 人，协管 {} 人",
                views::groups::admins(&state.members).len(),
                views::groups::moderators(&state.members).len()
            );
            if let Some(analytics) = state.analytics.as_ref() {
                info!(
                    "[CLI]   健康度 {:.1}，本周新成员 {}，本周消息 {}",
                    views::groups::health_score(analytics),
                    analytics.new_members_this_week,
                    analytics.messages_this_week
                );
            }
        }
        Command::AddMember { group_id, user_id } => {
            match store.add_member(&group_id, &user_id, GroupRole::Member).await {
                Some(member) => info!("[CLI] ✅ {} 已加入群组 {}", member.user_id, group_id),
                None => warn!("[CLI] 添加成员失败"),
            }
        }
        Command::Send { group_id, content } => {
            let req = SendMessageRequest {
                group_id,
                message_type: MessageType::Text,
                content,
                ..Default::default()
            };
            if let Some(message) = store.send_message_with_validation(&req).await? {
                info!("[CLI] 📨 已发送 {}", message.id);
            }
        }
        Command::Messages { group_id, pages } => {
            store.load_messages(&group_id).await;
            for _ in 0..pages {
                if store.load_more_messages().await.is_empty() {
                    break;
                }
            }
            let state = store.snapshot().await;
            for m in state.messages.iter().rev() {
                info!("[CLI] {} | {} | {}", m.created_at, m.sender_id, m.content);
            }
        }
        Command::Unread { group_id, mark } => {
            if mark {
                let latest = store.load_messages(&group_id).await.into_iter().next();
                if let Some(latest) = latest {
                    store.mark_as_read(&group_id, &latest.id).await;
                }
            }
            let unread = store.refresh_unread_count(&group_id).await;
            info!("[CLI] 📬 群组 {} 未读数: {}", group_id, unread);
        }
        Command::Retention { group_id } => {
            let removed = store.apply_retention(&group_id).await;
            info!("[CLI] 🧹 群组 {} 清理过期消息 {} 条", group_id, removed);
        }
        Command::Invite {
            group_id,
            user_id,
            message,
        } => {
            if let Some(invitation) = store
                .invite_user(&group_id, &user_id, message.as_deref())
                .await
            {
                info!("[CLI] ✉️ 已邀请 {}，有效期至 {}", user_id, invitation.expires_at);
            }
        }
        Command::Invitations => {
            let now = chrono::Utc::now();
            let invitations = store.load_invitations().await;
            for inv in views::groups::pending_invitations(&invitations, now) {
                info!("[CLI] ✉️ {} | 群组 {} | 来自 {}", inv.id, inv.group_id, inv.invited_by);
            }
        }
        Command::Respond {
            invitation_id,
            decline,
        } => {
            let ok = store.respond_to_invitation(&invitation_id, !decline).await;
            info!("[CLI] 邀请 {} 处理结果: {}", invitation_id, ok);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level, args.log_file.as_deref())?;

    info!("[CLI] 🚀 运动群组 CLI 客户端");
    info!("[CLI] 🌐 后端: {}", args.api_url);

    let store = build_store(&args)?;
    run(&store, args.command).await?;

    let state = store.snapshot().await;
    if state.group_error.is_some() || state.chat_error.is_some() {
        return Err(anyhow!("命令执行失败"));
    }
    Ok(())
}
