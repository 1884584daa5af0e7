//! PostgREST 风格的 HTTP 网关
//!
//! 负责把 [`Query`] 编码为查询字符串并发送 HTTP 请求。认证信息（apikey 与
//! Bearer token）在创建客户端时通过 `default_headers` 统一注入。

use super::{Filter, Gateway, Query};
use crate::config::ClientConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use serde_json::Value;
use tracing::{debug, error};

/// REST 网关
pub struct RestGateway {
    client: reqwest::Client,
    /// 形如 `https://xxx.example.co/rest/v1`
    rest_url: String,
}

impl RestGateway {
    /// 根据客户端配置创建网关
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("apikey"),
            HeaderValue::from_str(&config.api_key).context("无效的 api key")?,
        );
        let bearer = config.access_token.as_deref().unwrap_or(&config.api_key);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", bearer)).context("无效的 access token")?,
        );

        let client = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .build()
            .context("创建 HTTP 客户端失败")?;

        Ok(Self::with_client(client, &config.api_base_url))
    }

    /// 使用外部已配置好认证信息的客户端
    pub fn with_client(client: reqwest::Client, api_base_url: &str) -> Self {
        Self {
            client,
            rest_url: format!("{}/rest/v1", api_base_url.trim_end_matches('/')),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}", self.rest_url, table)
    }

    /// 读取响应；非 2xx 视为错误
    async fn read_body(response: reqwest::Response, operation: &str) -> Result<Value> {
        let status = response.status();
        let body = response.text().await.context("读取响应 body 失败")?;

        if !status.is_success() {
            error!(
                "[RestGateway] {}请求失败，HTTP状态: {}, 响应: {}",
                operation, status, body
            );
            return Err(anyhow!("HTTP 错误 {}: {}", status, body));
        }
        debug!("[RestGateway] {}请求成功，HTTP状态: {}", operation, status);

        if body.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }
        serde_json::from_str(&body).with_context(|| format!("解析 JSON 失败: {}", body))
    }

    fn into_rows(value: Value) -> Vec<Value> {
        match value {
            Value::Array(rows) => rows,
            Value::Null => Vec::new(),
            other => vec![other],
        }
    }
}

/// 标量值在查询字符串中的写法
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn list(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| match v {
            // 含分隔符的字符串需要加引号
            Value::String(s) if s.contains([',', '(', ')', '{', '}']) => format!("\"{}\"", s),
            other => scalar(other),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn encode_filter(filter: &Filter) -> (String, String) {
    let column = filter.column().to_string();
    let value = match filter {
        Filter::Eq(_, v) => format!("eq.{}", scalar(v)),
        Filter::Neq(_, v) => format!("neq.{}", scalar(v)),
        Filter::Gt(_, v) => format!("gt.{}", scalar(v)),
        Filter::Gte(_, v) => format!("gte.{}", scalar(v)),
        Filter::Lt(_, v) => format!("lt.{}", scalar(v)),
        Filter::Lte(_, v) => format!("lte.{}", scalar(v)),
        Filter::ILike(_, p) => format!("ilike.{}", p),
        Filter::In(_, vs) => format!("in.({})", list(vs)),
        Filter::Overlaps(_, vs) => format!("ov.{{{}}}", list(vs)),
        Filter::IsNull(_) => "is.null".to_string(),
    };
    (column, value)
}

/// 过滤条件编码（不含投影与分页），供 update / delete / count 使用
fn filter_params(query: &Query) -> Vec<(String, String)> {
    query.filters.iter().map(encode_filter).collect()
}

/// 完整的查询参数
pub(crate) fn query_params(query: &Query) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.select.clone())];
    params.extend(filter_params(query));
    if let Some(order) = &query.order {
        let dir = if order.ascending { "asc" } else { "desc" };
        params.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(offset) = query.offset {
        params.push(("offset".to_string(), offset.to_string()));
    }
    if let Some(limit) = query.limit {
        params.push(("limit".to_string(), limit.to_string()));
    }
    params
}

/// 解析 `Content-Range: 0-9/42` 或 `*/42` 中的总数
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait]
impl Gateway for RestGateway {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        let url = self.table_url(&query.table);
        debug!("[RestGateway] GET {} {:?}", url, query.filters);

        let response = self
            .client
            .get(&url)
            .query(&query_params(query))
            .send()
            .await
            .context("请求失败")?;
        let body = Self::read_body(response, "查询").await?;
        Ok(Self::into_rows(body))
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let url = self.table_url(&query.table);
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(query));

        let response = self
            .client
            .head(&url)
            .header("Prefer", "count=exact")
            .query(&params)
            .send()
            .await
            .context("请求失败")?;

        let status = response.status();
        if !status.is_success() {
            error!("[RestGateway] 计数请求失败，HTTP状态: {}", status);
            return Err(anyhow!("HTTP 错误 {}", status));
        }
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .ok_or_else(|| anyhow!("响应中缺少 Content-Range"))
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let url = self.table_url(table);
        let response = self
            .client
            .post(&url)
            .header("Prefer", "return=representation")
            .json(&row)
            .send()
            .await
            .context("请求失败")?;
        let body = Self::read_body(response, "插入").await?;
        Self::into_rows(body)
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("插入后未返回数据: {}", table))
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        let url = self.table_url(&query.table);
        let response = self
            .client
            .patch(&url)
            .header("Prefer", "return=representation")
            .query(&filter_params(query))
            .json(&patch)
            .send()
            .await
            .context("请求失败")?;
        let body = Self::read_body(response, "更新").await?;
        Ok(Self::into_rows(body))
    }

    async fn delete(&self, query: &Query) -> Result<u64> {
        let url = self.table_url(&query.table);
        let response = self
            .client
            .delete(&url)
            .header("Prefer", "return=representation")
            .query(&filter_params(query))
            .send()
            .await
            .context("请求失败")?;
        let body = Self::read_body(response, "删除").await?;
        Ok(Self::into_rows(body).len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> RestGateway {
        let mut config = ClientConfig::new(server.uri(), "anon-key".to_string());
        config.access_token = Some("user-jwt".to_string());
        RestGateway::new(&config).unwrap()
    }

    #[test]
    fn encodes_postgrest_operators() {
        let q = Query::table("groups")
            .select("*,creator:profiles(*)")
            .eq("is_active", true)
            .ilike("name", "%run%")
            .in_list("id", vec!["a", "b"])
            .overlaps("tags", vec!["trail", "10k"])
            .is_null("deleted_at")
            .order("created_at", false)
            .range(20, 10);

        let params = query_params(&q);
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("select"), Some("*,creator:profiles(*)"));
        assert_eq!(get("is_active"), Some("eq.true"));
        assert_eq!(get("name"), Some("ilike.%run%"));
        assert_eq!(get("id"), Some("in.(a,b)"));
        assert_eq!(get("tags"), Some("ov.{trail,10k}"));
        assert_eq!(get("deleted_at"), Some("is.null"));
        assert_eq!(get("order"), Some("created_at.desc"));
        assert_eq!(get("offset"), Some("20"));
        assert_eq!(get("limit"), Some("10"));
    }

    #[test]
    fn content_range_total() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("*/*"), None);
    }

    #[tokio::test]
    async fn select_sends_auth_headers_and_filters() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/groups"))
            .and(query_param("id", "eq.g1"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer user-jwt"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "g1"}])))
            .mount(&server)
            .await;

        let rows = gateway(&server)
            .select(&Query::table("groups").eq("id", "g1"))
            .await
            .unwrap();
        assert_eq!(rows, vec![json!({"id": "g1"})]);
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/group_messages"))
            .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .insert("group_messages", json!({"content": "hi"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("409"));
    }

    #[tokio::test]
    async fn insert_returns_representation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/groups"))
            .and(header("prefer", "return=representation"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!([{"id": "g9", "name": "x"}])),
            )
            .mount(&server)
            .await;

        let row = gateway(&server)
            .insert("groups", json!({"name": "x"}))
            .await
            .unwrap();
        assert_eq!(row["id"], "g9");
    }

    #[tokio::test]
    async fn count_reads_content_range() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/rest/v1/group_members"))
            .and(query_param("status", "eq.active"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-range", "*/3"))
            .mount(&server)
            .await;

        let n = gateway(&server)
            .count(&Query::table("group_members").eq("status", "active"))
            .await
            .unwrap();
        assert_eq!(n, 3);
    }
}
