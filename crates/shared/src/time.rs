use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a backend timestamp. Accepts RFC 3339 and naive ISO-8601 (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

/// Like [`parse_timestamp`], falling back to the current time.
pub fn parse_timestamp_or_now(raw: &str) -> DateTime<Utc> {
    parse_timestamp(raw).unwrap_or_else(Utc::now)
}
