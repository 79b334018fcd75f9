//! Five-field cron expressions evaluated in an IANA timezone.
//!
//! Supported syntax per field: `*`, single values, `a-b` ranges, `/step`
//! on either, and comma lists. Day-of-week accepts `0` and `7` for Sunday.
//! When both day-of-month and day-of-week are restricted a day matches if
//! either does.

use std::str::FromStr;

use chrono::{DateTime, Datelike, LocalResult, NaiveTime, TimeDelta, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ValidationError;

/// Upper bound on days scanned when searching for the next instant. Covers
/// leap-day-only schedules.
const MAX_DAYS_SEARCHED: u32 = 366 * 8;

/// A parsed cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minutes: u64,
    hours: u64,
    days_of_month: u64,
    months: u64,
    days_of_week: u64,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl FromStr for CronExpression {
    type Err = ValidationError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| ValidationError::InvalidCron {
            expression: expression.to_string(),
            reason,
        };
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let [minute, hour, dom, month, dow] = fields.as_slice() else {
            return Err(invalid("expected 5 fields"));
        };

        let mut days_of_week = parse_field(dow, 0, 7).map_err(invalid)?;
        if days_of_week & (1 << 7) != 0 {
            days_of_week = (days_of_week | 1) & !(1 << 7);
        }

        Ok(Self {
            source: expression.to_string(),
            minutes: parse_field(minute, 0, 59).map_err(invalid)?,
            hours: parse_field(hour, 0, 23).map_err(invalid)?,
            days_of_month: parse_field(dom, 1, 31).map_err(invalid)?,
            months: parse_field(month, 1, 12).map_err(invalid)?,
            days_of_week,
            dom_restricted: *dom != "*",
            dow_restricted: *dow != "*",
        })
    }
}

fn parse_field(field: &str, min: u32, max: u32) -> Result<u64, &'static str> {
    let mut mask = 0u64;
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step.parse().map_err(|_| "step is not a number")?;
                if step == 0 {
                    return Err("step must be positive");
                }
                (range, Some(step))
            }
            None => (item, None),
        };
        let (low, high) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            (parse_value(low, min, max)?, parse_value(high, min, max)?)
        } else {
            let value = parse_value(range, min, max)?;
            // `5/10` runs from 5 to the end of the field
            (value, if step.is_some() { max } else { value })
        };
        if low > high {
            return Err("range start is after range end");
        }
        for value in (low..=high).step_by(step.unwrap_or(1) as usize) {
            mask |= 1 << value;
        }
    }
    Ok(mask)
}

fn parse_value(raw: &str, min: u32, max: u32) -> Result<u32, &'static str> {
    let value: u32 = raw.parse().map_err(|_| "value is not a number")?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err("value out of range")
    }
}

fn has(mask: u64, value: u32) -> bool {
    mask & (1 << value) != 0
}

fn members(mask: u64) -> impl Iterator<Item = u32> {
    (0..64).filter(move |bit| has(mask, *bit))
}

impl CronExpression {
    fn matches_date(&self, date: chrono::NaiveDate) -> bool {
        if !has(self.months, date.month()) {
            return false;
        }
        let dom = has(self.days_of_month, date.day());
        let dow = has(self.days_of_week, date.weekday().num_days_from_sunday());
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }

    /// The first matching instant strictly after `after`, in `tz` wall
    /// time.
    ///
    /// Local times skipped by a DST transition never match. A repeated
    /// local time matches at its first occurrence after `after`. Returns
    /// `None` when nothing matches within the search horizon (e.g. `30 2
    /// 31 2 *`).
    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
        let local = after.with_timezone(&tz).naive_local();
        let start = local.with_second(0)?.with_nanosecond(0)? + TimeDelta::minutes(1);
        let mut date = start.date();

        for _ in 0..MAX_DAYS_SEARCHED {
            if self.matches_date(date) {
                let earliest = (date == start.date()).then(|| start.time());
                for hour in members(self.hours) {
                    for minute in members(self.minutes) {
                        let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) else {
                            continue;
                        };
                        if earliest.is_some_and(|earliest| time < earliest) {
                            continue;
                        }
                        let found = match tz.from_local_datetime(&date.and_time(time)) {
                            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
                            LocalResult::Ambiguous(first, second) => [first, second]
                                .into_iter()
                                .map(|dt| dt.with_timezone(&Utc))
                                .find(|dt| *dt > after),
                            LocalResult::None => None,
                        };
                        if let Some(instant) = found.filter(|dt| *dt > after) {
                            return Some(instant);
                        }
                    }
                }
            }
            date = date.succ_opt()?;
        }
        None
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl std::fmt::Display for CronExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.source)
    }
}

/// A cron expression bound to the timezone its fields are read in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub expression: CronExpression,
    pub timezone: Tz,
}

impl Schedule {
    /// Parse a schedule trigger's fields. UTC when `timezone` is absent.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidCron`] or
    /// [`ValidationError::UnknownTimezone`].
    pub fn parse(cron: &str, timezone: Option<&str>) -> Result<Self, ValidationError> {
        Ok(Self {
            expression: cron.parse()?,
            timezone: timezone.map_or(Ok(Tz::UTC), parse_timezone)?,
        })
    }

    #[must_use]
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expression.next_after(after, self.timezone)
    }
}

/// Parse an IANA timezone name such as `Europe/Paris`.
///
/// # Errors
///
/// Returns [`ValidationError::UnknownTimezone`] when the name is not in the
/// tz database.
pub fn parse_timezone(name: &str) -> Result<Tz, ValidationError> {
    name.parse::<Tz>()
        .map_err(|_| ValidationError::UnknownTimezone(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn cron(s: &str) -> CronExpression {
        s.parse().unwrap()
    }

    #[test]
    fn should_find_next_step_minute() {
        let next = cron("*/15 * * * *").next_after(utc("2026-01-10T10:07:00Z"), Tz::UTC);
        assert_eq!(next, Some(utc("2026-01-10T10:15:00Z")));
    }

    #[test]
    fn should_be_strictly_after_given_instant() {
        let next = cron("0 * * * *").next_after(utc("2026-01-10T10:00:00Z"), Tz::UTC);
        assert_eq!(next, Some(utc("2026-01-10T11:00:00Z")));
    }

    #[test]
    fn should_skip_weekend_when_weekday_range() {
        // 2026-03-07 is a Saturday
        let next = cron("0 9 * * 1-5").next_after(utc("2026-03-07T08:00:00Z"), Tz::UTC);
        assert_eq!(next, Some(utc("2026-03-09T09:00:00Z")));
    }

    #[test]
    fn should_treat_seven_as_sunday() {
        let next = cron("0 12 * * 7").next_after(utc("2026-03-02T00:00:00Z"), Tz::UTC);
        assert_eq!(next, Some(utc("2026-03-08T12:00:00Z")));
    }

    #[test]
    fn should_match_either_day_field_when_both_restricted() {
        // first Friday after the 1st comes before the 13th
        let next = cron("0 0 13 * 5").next_after(utc("2026-03-01T00:00:00Z"), Tz::UTC);
        assert_eq!(next, Some(utc("2026-03-06T00:00:00Z")));
    }

    #[test]
    fn should_evaluate_in_named_timezone() {
        let paris = parse_timezone("Europe/Paris").unwrap();
        let next = cron("0 6 * * *").next_after(utc("2026-01-15T00:00:00Z"), paris);
        assert_eq!(next, Some(utc("2026-01-15T05:00:00Z")));
    }

    #[test]
    fn should_skip_local_time_that_does_not_exist() {
        // 2026-03-08 02:30 does not exist in New York
        let ny = parse_timezone("America/New_York").unwrap();
        let next = cron("30 2 * * *").next_after(utc("2026-03-08T05:00:00Z"), ny);
        assert_eq!(next, Some(utc("2026-03-09T06:30:00Z")));
    }

    #[test]
    fn should_return_none_when_date_never_occurs() {
        assert_eq!(
            cron("0 0 31 2 *").next_after(utc("2026-01-01T00:00:00Z"), Tz::UTC),
            None
        );
    }

    #[test]
    fn should_reject_malformed_expressions() {
        for bad in ["* * *", "61 * * * *", "*/0 * * * *", "5-1 * * * *", "a * * * *"] {
            assert!(
                matches!(
                    bad.parse::<CronExpression>(),
                    Err(ValidationError::InvalidCron { .. })
                ),
                "{bad} should not parse"
            );
        }
    }

    #[test]
    fn should_default_schedule_to_utc() {
        let schedule = Schedule::parse("0 6 * * *", None).unwrap();
        assert_eq!(schedule.timezone, Tz::UTC);
        assert_eq!(
            schedule.next_after(utc("2026-01-15T07:00:00Z")),
            Some(utc("2026-01-16T06:00:00Z"))
        );
    }

    #[test]
    fn should_reject_unknown_timezone() {
        assert_eq!(
            parse_timezone("Mars/Olympus_Mons"),
            Err(ValidationError::UnknownTimezone("Mars/Olympus_Mons".to_string()))
        );
    }
}
