//! 内存网关
//!
//! 以 JSON 行保存各表数据，语义与远程后端保持一致（过滤、排序、分页、默认列），
//! 用于单元测试与离线演示。可按表注入故障以覆盖错误路径。

use super::{Filter, Gateway, Query};
use crate::serialization::now_iso;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    rows: HashMap<String, Vec<Value>>,
    failing: HashSet<String>,
}

/// 内存表网关
#[derive(Default)]
pub struct MemoryGateway {
    inner: Mutex<Tables>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 直接写入若干行（不补默认列）
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.tables()
            .rows
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// 读取某张表的全部行（按写入顺序）
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.tables().rows.get(table).cloned().unwrap_or_default()
    }

    /// 之后对该表的所有调用都返回错误
    pub fn fail_table(&self, table: &str) {
        self.tables().failing.insert(table.to_string());
    }

    /// 取消故障注入
    pub fn heal_table(&self, table: &str) {
        self.tables().failing.remove(table);
    }

    fn check(tables: &Tables, table: &str) -> Result<()> {
        if tables.failing.contains(table) {
            return Err(anyhow!("网关不可用: {}", table));
        }
        Ok(())
    }
}

/// 比较两个 JSON 标量；类型不兼容时返回 None
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn equals(a: &Value, b: &Value) -> bool {
    a == b || compare(a, b) == Some(Ordering::Equal)
}

/// 大小写不敏感的 LIKE 匹配：`%` 任意串，`_` 单个字符，`\` 转义下一个字符
fn like_match(text: &str, pattern: &str) -> bool {
    enum Token {
        Any,
        One,
        Lit(char),
    }

    let mut tokens = Vec::new();
    let mut chars = pattern.chars().flat_map(char::to_lowercase);
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => Token::Any,
            '_' => Token::One,
            '\\' => chars.next().map_or(Token::Lit('\\'), Token::Lit),
            c => Token::Lit(c),
        });
    }
    let text: Vec<char> = text.chars().flat_map(char::to_lowercase).collect();

    // matched[j]: 模式前缀能否匹配文本前 j 个字符
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for token in &tokens {
        let mut next = vec![false; text.len() + 1];
        match token {
            Token::Any => {
                let mut reachable = false;
                for j in 0..=text.len() {
                    reachable |= matched[j];
                    next[j] = reachable;
                }
            }
            Token::One => {
                for j in 0..text.len() {
                    next[j + 1] = matched[j];
                }
            }
            Token::Lit(c) => {
                for j in 0..text.len() {
                    next[j + 1] = matched[j] && text[j] == *c;
                }
            }
        }
        matched = next;
    }
    matched[text.len()]
}

fn field<'a>(row: &'a Value, column: &str) -> Option<&'a Value> {
    row.get(column).filter(|v| !v.is_null())
}

fn matches(row: &Value, filter: &Filter) -> bool {
    match filter {
        Filter::IsNull(c) => field(row, c).is_none(),
        Filter::Eq(c, v) => field(row, c).is_some_and(|f| equals(f, v)),
        Filter::Neq(c, v) => field(row, c).is_some_and(|f| !equals(f, v)),
        Filter::Gt(c, v) => field(row, c).and_then(|f| compare(f, v)) == Some(Ordering::Greater),
        Filter::Gte(c, v) => matches!(
            field(row, c).and_then(|f| compare(f, v)),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Filter::Lt(c, v) => field(row, c).and_then(|f| compare(f, v)) == Some(Ordering::Less),
        Filter::Lte(c, v) => matches!(
            field(row, c).and_then(|f| compare(f, v)),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Filter::ILike(c, p) => field(row, c)
            .and_then(Value::as_str)
            .is_some_and(|s| like_match(s, p)),
        Filter::In(c, vs) => field(row, c).is_some_and(|f| vs.iter().any(|v| equals(f, v))),
        Filter::Overlaps(c, vs) => field(row, c)
            .and_then(Value::as_array)
            .is_some_and(|arr| arr.iter().any(|a| vs.iter().any(|v| equals(a, v)))),
    }
}

fn matches_all(row: &Value, query: &Query) -> bool {
    query.filters.iter().all(|f| matches(row, f))
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn select(&self, query: &Query) -> Result<Vec<Value>> {
        let tables = self.tables();
        Self::check(&tables, &query.table)?;

        let mut rows: Vec<Value> = tables
            .rows
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_all(row, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            // 稳定排序，空值排在最后
            rows.sort_by(|a, b| {
                match (field(a, &order.column), field(b, &order.column)) {
                    (Some(x), Some(y)) => {
                        let ord = compare(x, y).unwrap_or(Ordering::Equal);
                        if order.ascending {
                            ord
                        } else {
                            ord.reverse()
                        }
                    }
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                }
            });
        }

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        let rows: Vec<Value> = rows.into_iter().skip(offset).take(limit).collect();
        debug!("[MemoryGateway] select {} -> {} 行", query.table, rows.len());
        Ok(rows)
    }

    async fn count(&self, query: &Query) -> Result<u64> {
        let tables = self.tables();
        Self::check(&tables, &query.table)?;
        let n = tables
            .rows
            .get(&query.table)
            .map(|rows| rows.iter().filter(|row| matches_all(row, query)).count())
            .unwrap_or(0);
        Ok(n as u64)
    }

    async fn insert(&self, table: &str, row: Value) -> Result<Value> {
        let mut tables = self.tables();
        Self::check(&tables, table)?;

        let mut obj: Map<String, Value> = match row {
            Value::Object(obj) => obj,
            other => return Err(anyhow!("插入的行必须是对象: {}", other)),
        };
        if obj.get("id").map_or(true, Value::is_null) {
            obj.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        if obj.get("created_at").map_or(true, Value::is_null) {
            obj.insert("created_at".into(), Value::String(now_iso()));
        }

        let row = Value::Object(obj);
        tables
            .rows
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    async fn update(&self, query: &Query, patch: Value) -> Result<Vec<Value>> {
        let mut tables = self.tables();
        Self::check(&tables, &query.table)?;

        let patch = match patch {
            Value::Object(obj) => obj,
            other => return Err(anyhow!("更新内容必须是对象: {}", other)),
        };

        let mut updated = Vec::new();
        if let Some(rows) = tables.rows.get_mut(&query.table) {
            for row in rows.iter_mut().filter(|row| matches_all(row, query)) {
                if let Value::Object(obj) = row {
                    for (k, v) in &patch {
                        obj.insert(k.clone(), v.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        Ok(updated)
    }

    async fn delete(&self, query: &Query) -> Result<u64> {
        let mut tables = self.tables();
        Self::check(&tables, &query.table)?;

        let Some(rows) = tables.rows.get_mut(&query.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|row| !matches_all(row, query));
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn like_pattern_matching() {
        assert!(like_match("Sunday Runners", "%run%"));
        assert!(like_match("Sunday Runners", "sunday%"));
        assert!(like_match("Sunday Runners", "%RUNNERS"));
        assert!(!like_match("Sunday Runners", "runners%"));
        assert!(like_match("abc", "abc"));
        assert!(!like_match("ab", "a%b%c"));
        assert!(like_match("Padel", "p_del"));
        assert!(!like_match("Padel", "p\\_del"));
        assert!(like_match("p_del", "p\\_del"));
        assert!(like_match("100% effort", "%100\\%%"));
    }

    #[tokio::test]
    async fn insert_fills_id_and_created_at() {
        let gw = MemoryGateway::new();
        let row = gw.insert("groups", json!({"name": "a"})).await.unwrap();
        assert!(row["id"].as_str().is_some());
        assert!(row["created_at"].as_str().is_some());
    }

    #[tokio::test]
    async fn select_filters_orders_and_paginates() {
        let gw = MemoryGateway::new();
        gw.seed(
            "m",
            vec![
                json!({"id": "1", "g": "a", "t": "2026-01-01", "tags": ["x"]}),
                json!({"id": "2", "g": "a", "t": "2026-01-03", "tags": ["y"]}),
                json!({"id": "3", "g": "b", "t": "2026-01-02", "tags": []}),
                json!({"id": "4", "g": "a", "t": "2026-01-02", "tags": ["x", "z"]}),
            ],
        );

        let rows = gw
            .select(&Query::table("m").eq("g", "a").order("t", false))
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["2", "4", "1"]);

        let rows = gw
            .select(&Query::table("m").order("t", true).range(1, 2))
            .await
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["3", "4"]);

        let n = gw
            .count(&Query::table("m").overlaps("tags", vec!["x"]))
            .await
            .unwrap();
        assert_eq!(n, 2);

        let n = gw
            .count(&Query::table("m").lt("t", "2026-01-02"))
            .await
            .unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn update_and_delete_by_filter() {
        let gw = MemoryGateway::new();
        gw.seed(
            "t",
            vec![json!({"id": "1", "v": 1}), json!({"id": "2", "v": 2})],
        );

        let updated = gw
            .update(&Query::table("t").eq("id", "2"), json!({"v": 20}))
            .await
            .unwrap();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0]["v"], 20);

        let removed = gw.delete(&Query::table("t").gte("v", 10)).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(gw.rows("t").len(), 1);
    }

    #[tokio::test]
    async fn failing_table_returns_error() {
        let gw = MemoryGateway::new();
        gw.fail_table("groups");
        assert!(gw.select(&Query::table("groups")).await.is_err());
        gw.heal_table("groups");
        assert!(gw.select(&Query::table("groups")).await.unwrap().is_empty());
    }
}
