//! Timestamp labels shown next to messages.

use std::fmt::Display;

use chrono::{DateTime, Local, TimeZone, Utc};

/// Clock time such as `3:05 PM`.
pub fn time_label<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    at.format("%-I:%M %p").to_string()
}

/// `Today` when `at` falls on the same calendar day as `now`, otherwise a
/// short date such as `Oct 19`.
pub fn day_label<Tz: TimeZone>(at: &DateTime<Tz>, now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    if at.date_naive() == now.date_naive() {
        "Today".to_string()
    } else {
        at.format("%b %-d").to_string()
    }
}

/// Convert a stored timestamp to the local zone for display.
pub fn to_local(at: &DateTime<Utc>) -> DateTime<Local> {
    at.with_timezone(&Local)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn test_time_label_twelve_hour() {
        assert_eq!(time_label(&at(2026, 10, 19, 15, 5)), "3:05 PM");
        assert_eq!(time_label(&at(2026, 10, 19, 9, 30)), "9:30 AM");
        assert_eq!(time_label(&at(2026, 10, 19, 0, 0)), "12:00 AM");
        assert_eq!(time_label(&at(2026, 10, 19, 12, 45)), "12:45 PM");
    }

    #[test]
    fn test_day_label_today() {
        let now = at(2026, 10, 19, 18, 0);
        assert_eq!(day_label(&at(2026, 10, 19, 8, 0), &now), "Today");
    }

    #[test]
    fn test_day_label_other_day() {
        let now = at(2026, 10, 19, 18, 0);
        assert_eq!(day_label(&at(2026, 10, 18, 23, 59), &now), "Oct 18");
        assert_eq!(day_label(&at(2026, 3, 5, 12, 0), &now), "Mar 5");
    }
}
