//! 客户端配置

use anyhow::{Context, Result};

/// 客户端配置
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// 后端基础地址，例如 `https://project.example.co`
    pub api_base_url: String,
    /// 后端公开的 api key（匿名角色）
    pub api_key: String,
    /// 登录后的用户 token，未登录时使用 api key 作为 Bearer
    pub access_token: Option<String>,
    /// 当前登录用户 ID
    pub user_id: Option<String>,
    /// 聊天消息分页大小
    pub message_page_size: usize,
    /// 群组搜索分页大小
    pub search_page_size: usize,
}

impl ClientConfig {
    /// 创建默认配置
    pub fn new(api_base_url: String, api_key: String) -> Self {
        Self {
            api_base_url,
            api_key,
            access_token: None,
            user_id: None,
            message_page_size: 50,
            search_page_size: 20,
        }
    }

    /// 从环境变量读取配置
    ///
    /// - `GROUPS_API_URL`（必填）
    /// - `GROUPS_API_KEY`（必填）
    /// - `GROUPS_ACCESS_TOKEN`、`GROUPS_USER_ID`（可选）
    pub fn from_env() -> Result<Self> {
        let api_base_url = std::env::var("GROUPS_API_URL").context("缺少环境变量 GROUPS_API_URL")?;
        let api_key = std::env::var("GROUPS_API_KEY").context("缺少环境变量 GROUPS_API_KEY")?;

        let mut config = Self::new(api_base_url, api_key);
        config.access_token = std::env::var("GROUPS_ACCESS_TOKEN").ok();
        config.user_id = std::env::var("GROUPS_USER_ID").ok();
        Ok(config)
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}
