//! Formatting helpers shared by the report and the CLI.

use chrono::{DateTime, NaiveDate, Utc};

/// Report date format (`2024-05-01`).
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a timestamp as a UTC calendar date.
pub fn format_date(ts: DateTime<Utc>) -> String {
    ts.format(DATE_FORMAT).to_string()
}

/// Format an optional timestamp as a date, or an empty string if missing.
pub fn format_date_opt(ts: Option<DateTime<Utc>>) -> String {
    ts.map(format_date).unwrap_or_default()
}

/// Format a calendar date for file names.
pub fn format_day(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

/// Format a timestamp relative to `now` (e.g., "2h ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else if duration.num_days() < 7 {
        format!("{}d ago", duration.num_days())
    } else {
        format_date(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_format_date() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(format_date(ts), "2024-03-07");
        assert_eq!(format_date_opt(Some(ts)), "2024-03-07");
        assert_eq!(format_date_opt(None), "");
    }

    #[test]
    fn test_format_relative_time() {
        let now = Utc.with_ymd_and_hms(2024, 3, 20, 12, 0, 0).unwrap();
        assert_eq!(format_relative_time(now - Duration::seconds(5), now), "5s ago");
        assert_eq!(format_relative_time(now - Duration::hours(3), now), "3h ago");
        assert_eq!(format_relative_time(now - Duration::days(2), now), "2d ago");
        assert_eq!(format_relative_time(now - Duration::days(10), now), "2024-03-10");
        assert_eq!(format_relative_time(now + Duration::minutes(1), now), "just now");
    }
}
