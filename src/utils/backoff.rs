//! Retry delay computation
//!
//! Pure functions of the attempt index and response headers so the schedule
//! can be tested without any transport.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

/// Obsolete HTTP-date layouts still accepted by recipients: RFC 850 and asctime
const LEGACY_HTTP_DATE_FORMATS: [&str; 2] = ["%A, %d-%b-%y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

/// Parse any of the three HTTP-date forms into UTC
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(when) = DateTime::parse_from_rfc2822(value) {
        return Some(when.with_timezone(&Utc));
    }
    LEGACY_HTTP_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

/// Parse a `Retry-After` header value, either delta-seconds or an HTTP date.
///
/// Dates in the past and negative values yield a zero delay. Anything else
/// unparseable yields `None`.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(seconds) = value.parse::<f64>() {
        if seconds.is_finite() {
            return Some(Duration::from_millis((seconds.max(0.0) * 1000.0) as u64));
        }
        return None;
    }

    parse_http_date(value).map(|when| {
        let millis = (when - now).num_milliseconds();
        Duration::from_millis(millis.max(0) as u64)
    })
}

/// `base * 2^attempt + jitter`, saturating instead of overflowing
pub fn exponential_delay(attempt: u32, base: Duration, jitter_ms: u64) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt))
        .saturating_add(Duration::from_millis(jitter_ms))
}

/// Delay before retry number `attempt` (0-indexed).
///
/// A parseable `Retry-After` wins over the exponential schedule.
pub fn retry_delay(
    attempt: u32,
    base: Duration,
    retry_after: Option<&str>,
    now: DateTime<Utc>,
    jitter_ms: u64,
) -> Duration {
    retry_after
        .and_then(|value| parse_retry_after(value, now))
        .unwrap_or_else(|| exponential_delay(attempt, base, jitter_ms))
}
