use chrono::{NaiveDateTime, Timelike};

/// Formats accepted for flight-log `datetime(utc)` cells.
const LOG_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S%.f",
];

/// Parse a subtitle timestamp such as `2023-01-11 16:04:03,681,492`.
///
/// Everything from the first comma on is ignored, and any remaining
/// fractional part is truncated so the result is whole seconds.
pub fn parse_subtitle_time(text: &str) -> Option<NaiveDateTime> {
    let head = text.split(',').next()?.trim();
    NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .and_then(|t| t.with_nanosecond(0))
}

/// Parse a flight-log timestamp, trying the common export formats.
pub fn parse_log_time(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    LOG_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

/// Clock part (`HH:MM:SS`) of a subtitle timestamp: the text before the first
/// comma, after its first space. `None` when there is no date/time separator.
pub fn clock_time(text: &str) -> Option<&str> {
    let head = text.split(',').next()?;
    let (_, time) = head.split_once(' ')?;
    let time = time.split(' ').next()?;
    if time.is_empty() { None } else { Some(time) }
}
