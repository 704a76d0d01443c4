//! Size and date parsing shared by the query parser, filter validation and
//! evaluation, plus the human-readable formatting used in progress reports.
//!
//! Size grammar: `^(\d+(\.\d+)?)([KMGTP]?B)?$`, case-insensitive, powers of
//! 1024, truncated to whole bytes. Bare digits are bytes.
//!
//! Date grammar: `today`, `yesterday`, `YYYY-MM-DD` or `YYYY/MM/DD`. A date
//! stands for midnight (local time) of that day. Values coming from raw filter
//! dicts may also carry a full ISO timestamp (`YYYY-MM-DDTHH:MM:SS`).

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use regex::Regex;
use std::sync::OnceLock;

const KIB: u64 = 1024;

fn size_regex() -> &'static Regex {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    SIZE_RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d+(?:\.\d+)?)([KMGTP]?B)?$").expect("size pattern is valid")
    })
}

/// Parse a size such as `512`, `10MB` or `1.5kb` into a byte count.
pub fn parse_size(text: &str) -> Option<u64> {
    let text = text.trim();
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }

    let caps = size_regex().captures(text)?;
    let number: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_ascii_uppercase())
        .unwrap_or_else(|| "B".to_string());
    let multiplier = match unit.as_str() {
        "B" => 1,
        "KB" => KIB,
        "MB" => KIB.pow(2),
        "GB" => KIB.pow(3),
        "TB" => KIB.pow(4),
        "PB" => KIB.pow(5),
        _ => return None,
    };
    Some((number * multiplier as f64) as u64)
}

/// Parse a size from a raw JSON filter value. Numbers are taken as bytes.
pub fn parse_size_value(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => parse_size(s),
        _ => None,
    }
}

/// Parse a calendar date, resolving `today`/`yesterday` against `today`.
pub fn parse_date_on(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let normalized = text.trim().to_lowercase();
    match normalized.as_str() {
        "today" => Some(today),
        "yesterday" => Some(today - Duration::days(1)),
        _ => ["%Y-%m-%d", "%Y/%m/%d"]
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(&normalized, fmt).ok()),
    }
}

/// Parse a date bound from a raw filter value: either a date (midnight) or
/// a full ISO timestamp.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    parse_datetime_on(text, Local::now().date_naive())
}

pub fn parse_datetime_on(text: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    if let Some(date) = parse_date_on(text, today) {
        return Some(date.and_time(NaiveTime::MIN));
    }
    let trimmed = text.trim();
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
}

/// Epoch seconds of a local wall-clock time.
pub fn local_timestamp(at: NaiveDateTime) -> i64 {
    match Local.from_local_datetime(&at).earliest() {
        Some(dt) => dt.timestamp(),
        // Inside a DST gap: the wall-clock time never happened locally.
        None => at.and_utc().timestamp(),
    }
}

/// Local calendar date of an epoch-second timestamp.
pub fn local_date(secs: i64) -> Option<NaiveDate> {
    Local
        .timestamp_opt(secs, 0)
        .earliest()
        .map(|dt| dt.date_naive())
}

/// Render a date bound the way it was most likely written: a bare date for
/// midnight, a full timestamp otherwise.
pub fn format_datetime(at: &NaiveDateTime) -> String {
    if at.time() == NaiveTime::MIN {
        at.date().format("%Y-%m-%d").to_string()
    } else {
        at.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_idx])
}

/// Format a byte rate using the largest unit that keeps the value at or above 1.
pub fn format_rate(bytes_per_sec: f64) -> String {
    const UNITS: &[&str] = &["B/s", "KB/s", "MB/s", "GB/s"];
    let mut rate = bytes_per_sec.max(0.0);
    let mut unit_idx = 0;

    while rate >= 1024.0 && unit_idx < UNITS.len() - 1 {
        rate /= 1024.0;
        unit_idx += 1;
    }

    format!("{:.1} {}", rate, UNITS[unit_idx])
}

pub fn format_eta(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours > 0 {
        format!("ETA {}h {}m", hours, mins)
    } else if mins > 0 {
        format!("ETA {}m {}s", mins, secs)
    } else {
        format!("ETA {}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("10MB"), Some(10 * 1024 * 1024));
        assert_eq!(parse_size("10mb"), Some(10 * 1024 * 1024));
        assert_eq!(parse_size("1.5KB"), Some(1536));
        assert_eq!(parse_size("2b"), Some(2));
        assert_eq!(parse_size("1PB"), Some(1024u64.pow(5)));
        assert_eq!(parse_size(" 42 "), Some(42));
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert_eq!(parse_size(""), None);
        assert_eq!(parse_size("10 MB"), None);
        assert_eq!(parse_size("ten"), None);
        assert_eq!(parse_size("10XB"), None);
        assert_eq!(parse_size("-5"), None);
    }

    #[test]
    fn test_parse_size_bare_integers_round_trip() {
        for n in [0u64, 1, 999, 1024, 10_485_760, u64::MAX] {
            assert_eq!(parse_size(&n.to_string()), Some(n));
        }
    }

    #[test]
    fn test_parse_size_value_accepts_numbers() {
        assert_eq!(parse_size_value(&serde_json::json!(2048)), Some(2048));
        assert_eq!(parse_size_value(&serde_json::json!(12.9)), Some(12));
        assert_eq!(parse_size_value(&serde_json::json!("1KB")), Some(1024));
        assert_eq!(parse_size_value(&serde_json::json!(-1)), None);
        assert_eq!(parse_size_value(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_parse_date_forms() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date_on("today", today), Some(today));
        assert_eq!(
            parse_date_on("Yesterday", today),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            parse_date_on("2023-12-31", today),
            NaiveDate::from_ymd_opt(2023, 12, 31)
        );
        assert_eq!(
            parse_date_on("2023/01/05", today),
            NaiveDate::from_ymd_opt(2023, 1, 5)
        );
        assert_eq!(parse_date_on("not-a-date", today), None);
        assert_eq!(parse_date_on("2023-13-01", today), None);
    }

    #[test]
    fn test_parse_datetime_accepts_iso_timestamps() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let midnight = parse_datetime_on("2024-01-02", today).unwrap();
        assert_eq!(format_datetime(&midnight), "2024-01-02");

        let stamped = parse_datetime_on("2024-01-02T10:30:00", today).unwrap();
        assert_eq!(format_datetime(&stamped), "2024-01-02T10:30:00");
    }

    #[test]
    fn test_local_timestamp_and_date_agree() {
        let at = NaiveDate::from_ymd_opt(2022, 6, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let secs = local_timestamp(at);
        assert_eq!(local_date(secs), Some(at.date()));
    }

    #[test]
    fn test_format_rate_picks_largest_unit() {
        assert_eq!(format_rate(512.0), "512.0 B/s");
        assert_eq!(format_rate(2048.0), "2.0 KB/s");
        assert_eq!(format_rate(5.0 * 1024.0 * 1024.0), "5.0 MB/s");
        assert_eq!(format_rate(3.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0), "3072.0 GB/s");
    }

    #[test]
    fn test_format_eta_buckets() {
        assert_eq!(format_eta(42), "ETA 42s");
        assert_eq!(format_eta(125), "ETA 2m 5s");
        assert_eq!(format_eta(3 * 3600 + 7 * 60 + 9), "ETA 3h 7m");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
    }
}
