use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::FeedConfig;

const MINUTE_MS: u64 = 60 * 1000;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;
const WEEK_MS: u64 = 7 * DAY_MS;

fn interval_re() -> &'static Regex {
    static INTERVAL_RE: OnceLock<Regex> = OnceLock::new();
    INTERVAL_RE.get_or_init(|| Regex::new(r"^([0-9]+)([mhdw])$").expect("valid interval regex"))
}

/// Turns a scan interval such as `30m`, `1h`, `2d` or `1w` into milliseconds.
pub fn parse_scan_interval(scan_interval: &str) -> Result<u64> {
    let invalid = || AppError::InvalidInterval(scan_interval.to_string());

    let caps = interval_re().captures(scan_interval).ok_or_else(invalid)?;
    let value: u64 = caps[1].parse().map_err(|_| invalid())?;
    let factor = match &caps[2] {
        "m" => MINUTE_MS,
        "h" => HOUR_MS,
        "d" => DAY_MS,
        "w" => WEEK_MS,
        _ => return Err(invalid()),
    };

    value.checked_mul(factor).ok_or_else(invalid)
}

/// Whether a feed's scan interval has elapsed since it was last checked.
/// Feeds that were never checked are always due.
pub fn is_due(feed: &FeedConfig, now: DateTime<Utc>) -> Result<bool> {
    let interval_ms = parse_scan_interval(&feed.scan_interval)?;

    let Ok(last_checked) = DateTime::parse_from_rfc3339(&feed.last_checked) else {
        return Ok(true);
    };

    let elapsed_ms = now
        .signed_duration_since(last_checked.with_timezone(&Utc))
        .num_milliseconds();
    Ok(elapsed_ms >= 0 && elapsed_ms as u64 >= interval_ms)
}
