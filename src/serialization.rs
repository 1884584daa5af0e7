//! 序列化与时间戳工具
//!
//! 所有时间戳均为 ISO-8601（RFC 3339，UTC）字符串，字典序与时间先后一致。

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer};

/// 反序列化数组字段，处理 null 值
pub(crate) fn deserialize_vec_or_null<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// 格式化为统一的时间戳字符串
pub fn format_iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 当前时间
pub fn now_iso() -> String {
    format_iso(Utc::now())
}

/// `days` 天前
pub fn days_ago_iso(days: i64) -> String {
    format_iso(Utc::now() - Duration::days(days))
}

/// 当天 00:00（UTC）
pub fn start_of_today_iso() -> String {
    let midnight = Utc::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc())
        .unwrap_or_else(Utc::now);
    format_iso(midnight)
}

/// 解析时间戳，格式不合法时返回 None
pub fn parse_iso(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
