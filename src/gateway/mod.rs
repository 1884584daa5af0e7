//! 远程数据网关
//!
//! 托管的表式后端（select / insert / update / delete + 过滤条件）的抽象。
//! 数据访问层只依赖 [`Gateway`] trait，具体实现见 [`rest`] 与 [`memory`]。

pub mod memory;
pub mod rest;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

pub use memory::MemoryGateway;
pub use rest::RestGateway;

/// 单个过滤条件
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Neq(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    /// 大小写不敏感的模式匹配，`%` 为通配符
    ILike(String, String),
    In(String, Vec<Value>),
    /// 数组列与给定集合存在交集
    Overlaps(String, Vec<Value>),
    IsNull(String),
}

impl Filter {
    /// 过滤条件作用的列名
    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Neq(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::ILike(c, _)
            | Filter::In(c, _)
            | Filter::Overlaps(c, _)
            | Filter::IsNull(c) => c,
        }
    }
}

/// 排序
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// 表查询描述（表名、投影、过滤、排序、分页）
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub table: String,
    /// 投影表达式，可包含关系展开，如 `*,sender:profiles(*)`
    pub select: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            select: "*".to_string(),
            filters: Vec::new(),
            order: None,
            offset: None,
            limit: None,
        }
    }

    pub fn select(mut self, expr: impl Into<String>) -> Self {
        self.select = expr.into();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Neq(column.to_string(), value.into()));
        self
    }

    pub fn gt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gt(column.to_string(), value.into()));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Gte(column.to_string(), value.into()));
        self
    }

    pub fn lt(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lt(column.to_string(), value.into()));
        self
    }

    pub fn lte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Lte(column.to_string(), value.into()));
        self
    }

    pub fn ilike(mut self, column: &str, pattern: impl Into<String>) -> Self {
        self.filters
            .push(Filter::ILike(column.to_string(), pattern.into()));
        self
    }

    pub fn in_list<V: Into<Value>>(mut self, column: &str, values: Vec<V>) -> Self {
        self.filters.push(Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn overlaps<V: Into<Value>>(mut self, column: &str, values: Vec<V>) -> Self {
        self.filters.push(Filter::Overlaps(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn is_null(mut self, column: &str) -> Self {
        self.filters.push(Filter::IsNull(column.to_string()));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn range(mut self, offset: usize, limit: usize) -> Self {
        self.offset = Some(offset);
        self.limit = Some(limit);
        self
    }
}

/// 远程表式后端
///
/// 约定：查询不到数据返回空集合 / 0，只有网络或服务端错误才返回 `Err`。
#[async_trait]
pub trait Gateway: Send + Sync {
    /// 按条件查询行
    async fn select(&self, query: &Query) -> Result<Vec<Value>>;

    /// 按条件计数
    async fn count(&self, query: &Query) -> Result<u64>;

    /// 插入一行，返回后端写入后的完整行（含默认值）
    async fn insert(&self, table: &str, row: Value) -> Result<Value>;

    /// 按条件更新，返回更新后的行
    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>>;

    /// 按条件删除，返回删除的行数
    async fn delete(&self, query: &Query) -> Result<u64>;
}

/// 将网关返回的 JSON 行反序列化为记录
pub(crate) fn decode_rows<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(anyhow::Error::from))
        .collect()
}

/// 取第一行并反序列化
pub(crate) fn decode_first<T: serde::de::DeserializeOwned>(rows: Vec<Value>) -> Result<Option<T>> {
    match rows.into_iter().next() {
        Some(row) => Ok(Some(serde_json::from_value(row)?)),
        None => Ok(None),
    }
}

/// 转义 LIKE 模式中的通配符（`%`、`_`）和转义符本身，用户输入按字面匹配
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
