use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime};

/// Current UTC time as an RFC3339 string.
pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .expect("RFC3339 formatting should not fail")
}

/// Current UTC time.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Parse an RFC3339 timestamp. Returns `None` on malformed input so read
/// paths can isolate the record instead of failing the whole store.
pub fn parse_rfc3339(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

/// Format a date as a partition name: `YYYY-MM-DD`.
pub fn partition_name(date: Date) -> String {
    date.format(format_description!("[year]-[month]-[day]"))
        .expect("date formatting should not fail")
}

/// Parse a `YYYY-MM-DD` partition name back into a date.
pub fn parse_partition_name(s: &str) -> Option<Date> {
    Date::parse(s, format_description!("[year]-[month]-[day]")).ok()
}

/// Today's UTC calendar date.
pub fn today_utc() -> Date {
    OffsetDateTime::now_utc().date()
}
