//! Monthly trigger schedule.
//!
//! Accepts the subset of cron expressions that fire once a month at a fixed local time:
//! `min hour dom * *` or `sec min hour dom * *`. Month and day-of-week must be wildcards
//! (`?` is accepted for day-of-week). Local time is a fixed UTC offset.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use thiserror::Error;

/// Upper bound on months scanned for a matching day. Every day 1..=31 occurs within a year.
const MAX_MONTHS_SCANNED: u32 = 24;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("expected 5 or 6 cron fields, found {0}")]
    FieldCount(usize),
    #[error("cron field `{field}` must be a number, found `{value}`")]
    NotNumeric { field: &'static str, value: String },
    #[error("cron field `{field}` must be in range {min}..={max}, found {value}")]
    OutOfRange { field: &'static str, value: u32, min: u32, max: u32 },
    #[error("cron field `{field}` must be `*` for a monthly schedule, found `{value}`")]
    NotMonthly { field: &'static str, value: String },
    #[error("invalid utc offset `{0}` (expected `Z` or `+HH:MM` / `-HH:MM`)")]
    InvalidOffset(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonthlySchedule {
    second: u32,
    minute: u32,
    hour: u32,
    day_of_month: u32,
    offset: FixedOffset,
}

impl MonthlySchedule {
    pub fn parse(expression: &str, utc_offset: &str) -> Result<Self, ScheduleError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let (second, rest) = match fields.len() {
            5 => ("0", &fields[..]),
            6 => (fields[0], &fields[1..]),
            other => return Err(ScheduleError::FieldCount(other)),
        };

        let month = rest[3];
        if month != "*" {
            return Err(ScheduleError::NotMonthly { field: "month", value: month.to_string() });
        }
        let day_of_week = rest[4];
        if day_of_week != "*" && day_of_week != "?" {
            return Err(ScheduleError::NotMonthly {
                field: "day_of_week",
                value: day_of_week.to_string(),
            });
        }

        Ok(Self {
            second: parse_field("second", second, 0, 59)?,
            minute: parse_field("minute", rest[0], 0, 59)?,
            hour: parse_field("hour", rest[1], 0, 23)?,
            day_of_month: parse_field("day_of_month", rest[2], 1, 31)?,
            offset: parse_offset(utc_offset)?,
        })
    }

    /// First fire time strictly after `after`. Months without the configured day are skipped.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&self.offset);
        let (mut year, mut month) = (local.year(), local.month());

        for _ in 0..MAX_MONTHS_SCANNED {
            if let Some(candidate) = self.fire_time_in(year, month) {
                if candidate > after {
                    return Some(candidate);
                }
            }

            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }

        None
    }

    /// Calendar date of `at` in the schedule's local time.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    fn fire_time_in(&self, year: i32, month: u32) -> Option<DateTime<Utc>> {
        let naive = NaiveDate::from_ymd_opt(year, month, self.day_of_month)?.and_hms_opt(
            self.hour,
            self.minute,
            self.second,
        )?;
        self.offset.from_local_datetime(&naive).single().map(|local| local.with_timezone(&Utc))
    }
}

impl fmt::Display for MonthlySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "day {} of every month at {:02}:{:02}:{:02} ({})",
            self.day_of_month, self.hour, self.minute, self.second, self.offset
        )
    }
}

fn parse_field(
    field: &'static str,
    value: &str,
    min: u32,
    max: u32,
) -> Result<u32, ScheduleError> {
    let parsed = value
        .parse::<u32>()
        .map_err(|_| ScheduleError::NotNumeric { field, value: value.to_string() })?;
    if parsed < min || parsed > max {
        return Err(ScheduleError::OutOfRange { field, value: parsed, min, max });
    }
    Ok(parsed)
}

fn parse_offset(value: &str) -> Result<FixedOffset, ScheduleError> {
    let trimmed = value.trim();
    let invalid = || ScheduleError::InvalidOffset(value.to_string());

    if trimmed.eq_ignore_ascii_case("z") || trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'+') => (1, &trimmed[1..]),
        Some(b'-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = digits.split_once(':').ok_or_else(invalid)?;
    if hours.len() != 2 || minutes.len() != 2 {
        return Err(invalid());
    }
    let hours = hours.parse::<i32>().map_err(|_| invalid())?;
    let minutes = minutes.parse::<i32>().map_err(|_| invalid())?;
    if hours > 18 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3_600 + minutes * 60)).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, Utc};

    use super::{MonthlySchedule, ScheduleError};

    fn ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }

    #[test]
    fn first_of_month_fires_at_next_month_start() {
        let schedule = MonthlySchedule::parse("0 0 1 * *", "+00:00").expect("valid schedule");

        assert_eq!(
            schedule.next_after(ts("2026-10-17T08:30:00Z")),
            Some(ts("2026-11-01T00:00:00Z"))
        );
    }

    #[test]
    fn december_rolls_into_next_year() {
        let schedule = MonthlySchedule::parse("0 0 1 * *", "Z").expect("valid schedule");

        assert_eq!(
            schedule.next_after(ts("2026-12-02T00:00:00Z")),
            Some(ts("2027-01-01T00:00:00Z"))
        );
    }

    #[test]
    fn fire_time_itself_schedules_the_following_month() {
        let schedule = MonthlySchedule::parse("0 0 1 * *", "+00:00").expect("valid schedule");

        assert_eq!(
            schedule.next_after(ts("2026-11-01T00:00:00Z")),
            Some(ts("2026-12-01T00:00:00Z"))
        );
    }

    #[test]
    fn local_offset_shifts_the_utc_fire_time() {
        let schedule = MonthlySchedule::parse("0 0 0 1 * ?", "+09:00").expect("valid schedule");
        let fire = schedule.next_after(ts("2026-10-17T00:00:00Z")).expect("fire time");

        assert_eq!(fire, ts("2026-10-31T15:00:00Z"));
        assert_eq!(
            schedule.local_date(fire),
            NaiveDate::from_ymd_opt(2026, 11, 1).expect("valid date")
        );
    }

    #[test]
    fn missing_days_skip_the_month() {
        let schedule = MonthlySchedule::parse("0 12 31 * *", "+00:00").expect("valid schedule");

        assert_eq!(
            schedule.next_after(ts("2026-03-31T13:00:00Z")),
            Some(ts("2026-05-31T12:00:00Z"))
        );
    }

    #[test]
    fn non_monthly_expressions_are_rejected() {
        assert!(matches!(
            MonthlySchedule::parse("0 0 1 6 *", "+00:00"),
            Err(ScheduleError::NotMonthly { field: "month", .. })
        ));
        assert!(matches!(
            MonthlySchedule::parse("0 0 * * *", "+00:00"),
            Err(ScheduleError::NotNumeric { field: "day_of_month", .. })
        ));
        assert_eq!(MonthlySchedule::parse("0 0 1 *", "+00:00"), Err(ScheduleError::FieldCount(4)));
        assert!(matches!(
            MonthlySchedule::parse("0 24 1 * *", "+00:00"),
            Err(ScheduleError::OutOfRange { field: "hour", .. })
        ));
    }

    #[test]
    fn malformed_offsets_are_rejected() {
        for offset in ["09:00", "+9:00", "+09", "+25:00", "Asia/Seoul"] {
            assert!(
                matches!(
                    MonthlySchedule::parse("0 0 1 * *", offset),
                    Err(ScheduleError::InvalidOffset(_))
                ),
                "offset {offset} should be rejected"
            );
        }
        assert!(MonthlySchedule::parse("0 0 1 * *", "-05:30").is_ok());
    }
}
