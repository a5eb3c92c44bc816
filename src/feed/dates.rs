use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Extra date dialects tried after chrono's own RFC-3339/RFC-2822 parsers,
/// covering the common-CMS formats real feeds emit without a timezone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%a, %d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M:%S",
    "%Y-%m-%d",
];

/// Tries RFC-3339, RFC-2822 (covers RFC-1123/RFC-822 style dates with a
/// numeric or named zone), then a handful of naive CMS dialects assumed UTC.
pub fn parse_flexible(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()));
        }
    }

    None
}

/// Resolves an entry's effective date per the fallback chain of spec §4.4:
/// the entry's own date, else the feed-level `updated`, else fetch time.
/// Future-dated entries are accepted as-is; no clamping.
pub fn resolve_entry_date(
    entry_date: Option<DateTime<Utc>>,
    feed_updated: Option<DateTime<Utc>>,
    fetch_time: DateTime<Utc>,
) -> DateTime<Utc> {
    entry_date.or(feed_updated).unwrap_or(fetch_time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_rfc3339() {
        let dt = parse_flexible("2025-01-01T00:00:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_rfc1123() {
        let dt = parse_flexible("Wed, 01 Jan 2025 00:00:00 GMT").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_naive_cms_dialect() {
        let dt = parse_flexible("2025-01-01 12:30:00").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 1, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn returns_none_for_garbage() {
        assert!(parse_flexible("not a date").is_none());
    }

    #[test]
    fn falls_back_through_chain() {
        let feed_updated = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let fetch_time = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            resolve_entry_date(None, Some(feed_updated), fetch_time),
            feed_updated
        );
        assert_eq!(resolve_entry_date(None, None, fetch_time), fetch_time);
    }
}
