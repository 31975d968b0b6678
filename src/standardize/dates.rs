//! Publication date parsing.

use chrono::NaiveDate;
use serde_json::Value;

/// Parse a date given as a `[year, month, day]` triple (or a shorter prefix
/// of one), an ISO-8601 string, or a bare four-digit year
///
/// Missing month or day default to 1, so a bare year becomes `YYYY-01-01`.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => parse_date_str(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|y| i32::try_from(y).ok())
            .and_then(year_start),
        Value::Array(parts) => parse_date_parts(parts),
        Value::Object(map) => map.get("date-parts").and_then(parse_date),
        _ => None,
    }
}

/// Parse a date string: `YYYY-MM-DD` (time suffix ignored), `YYYY-MM` or `YYYY`
pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    let s = s.trim();

    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        return s.parse().ok().and_then(year_start);
    }

    if let Some(prefix) = s.get(..10) {
        if let Ok(date) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d") {
            return Some(date);
        }
    }

    if let Some(prefix) = s.get(..7) {
        if let Ok(date) = NaiveDate::parse_from_str(&format!("{}-01", prefix), "%Y-%m-%d") {
            return Some(date);
        }
    }

    None
}

/// Crossref-style `date-parts`: `[[2020, 5, 17]]` or `[2020, 5]`
fn parse_date_parts(parts: &[Value]) -> Option<NaiveDate> {
    if let Some(Value::Array(inner)) = parts.first() {
        return parse_date_parts(inner);
    }

    let nums: Vec<i64> = parts.iter().map_while(as_int).collect();
    let year = i32::try_from(*nums.first()?).ok()?;
    let month = nums.get(1).copied().unwrap_or(1);
    let day = nums.get(2).copied().unwrap_or(1);

    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}
