// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cron expression parsing and next-fire computation.
//!
//! Standard 5-field form (`minute hour day-of-month month day-of-week`),
//! evaluated in the connector's local timezone. A 6-field form with a
//! leading seconds field is accepted for sub-minute schedules. Fields take
//! `*`, numbers, ranges (`a-b`), lists (`a,b,c`), and steps (`*/n`, `a-b/n`).
//! Day-of-month and day-of-week combine with the classic OR rule when both
//! are restricted.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveDate, TimeZone, Timelike};
use thiserror::Error;

/// Errors from cron expression parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("expected 5 or 6 fields, got {0}")]
    FieldCount(usize),
    #[error("invalid {field} field: {text}")]
    Field { field: &'static str, text: String },
    #[error("{field} value {value} out of range {min}-{max}")]
    Range { field: &'static str, value: u32, min: u32, max: u32 },
}

/// A parsed cron expression. Parse once per routine revision and cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    /// Present only for 6-field expressions.
    seconds: Option<u64>,
    minutes: u64,
    hours: u32,
    days_of_month: u32,
    months: u16,
    days_of_week: u8,
    /// `*` in both day fields means no day restriction at all.
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        let (seconds, rest) = match fields.len() {
            5 => (None, &fields[..]),
            6 => (Some(parse_field(fields[0], "seconds", 0, 59)? as u64), &fields[1..]),
            n => return Err(CronError::FieldCount(n)),
        };

        let dom_restricted = rest[2] != "*";
        let dow_restricted = rest[4] != "*";
        Ok(Self {
            seconds,
            minutes: parse_field(rest[0], "minute", 0, 59)?,
            hours: parse_field(rest[1], "hour", 0, 23)? as u32,
            days_of_month: parse_field(rest[2], "day-of-month", 1, 31)? as u32,
            months: parse_field(rest[3], "month", 1, 12)? as u16,
            days_of_week: parse_dow(rest[4])?,
            dom_restricted,
            dow_restricted,
        })
    }

    fn month_matches(&self, month: u32) -> bool {
        self.months & (1 << month) != 0
    }

    /// Classic cron day rule: when both day fields are restricted, a day
    /// matches if either does.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month & (1 << date.day()) != 0;
        let dow = self.days_of_week & (1 << date.weekday().num_days_from_sunday()) != 0;
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// The next fire time strictly after `after`, in local time.
    ///
    /// Returns `None` only for expressions that can never fire again within
    /// four years (e.g. Feb 30).
    pub fn next_fire(&self, after: DateTime<Local>) -> Option<DateTime<Local>> {
        // Step resolution: seconds for 6-field expressions, else minutes.
        let mut t = if self.seconds.is_some() {
            after.naive_local() + ChronoDuration::seconds(1)
        } else {
            after.naive_local().with_second(0)? + ChronoDuration::minutes(1)
        };
        t = t.with_nanosecond(0)?;

        let mut date = t.date();
        for _ in 0..(4 * 366) {
            if !self.month_matches(date.month()) || !self.day_matches(date) {
                date = date.succ_opt()?;
                if t.date() < date {
                    t = date.and_hms_opt(0, 0, 0)?;
                }
                continue;
            }

            let day_start = date.and_hms_opt(0, 0, 0)?;
            let from = if t.date() == date { t } else { day_start };
            if let Some(naive) = self.first_in_day(date, from) {
                // Resolve against the local timezone; a nonexistent wall
                // time (DST gap) skips forward.
                match Local.from_local_datetime(&naive).earliest() {
                    Some(resolved) => return Some(resolved),
                    None => {
                        t = naive + ChronoDuration::minutes(1);
                        date = t.date();
                        continue;
                    }
                }
            }
            date = date.succ_opt()?;
            t = date.and_hms_opt(0, 0, 0)?;
        }
        None
    }

    /// First matching time within `date` at or after `from`.
    fn first_in_day(
        &self,
        date: NaiveDate,
        from: chrono::NaiveDateTime,
    ) -> Option<chrono::NaiveDateTime> {
        for hour in 0..24u32 {
            if self.hours & (1 << hour) == 0 {
                continue;
            }
            for minute in 0..60u32 {
                if self.minutes & (1 << minute) == 0 {
                    continue;
                }
                match self.seconds {
                    None => {
                        let candidate = date.and_hms_opt(hour, minute, 0)?;
                        if candidate >= from {
                            return Some(candidate);
                        }
                    }
                    Some(seconds) => {
                        for second in 0..60u32 {
                            if seconds & (1 << second) == 0 {
                                continue;
                            }
                            let candidate = date.and_hms_opt(hour, minute, second)?;
                            if candidate >= from {
                                return Some(candidate);
                            }
                        }
                    }
                }
            }
        }
        None
    }
}

/// Parse one field into a bitmask over `[min, max]`.
fn parse_field(text: &str, field: &'static str, min: u32, max: u32) -> Result<u64, CronError> {
    let mut mask: u64 = 0;
    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .ok()
                    .filter(|s| *s > 0)
                    .ok_or_else(|| CronError::Field { field, text: part.to_string() })?;
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let a = parse_value(a, field)?;
            let b = parse_value(b, field)?;
            if a > b {
                return Err(CronError::Field { field, text: part.to_string() });
            }
            (a, b)
        } else {
            let v = parse_value(range, field)?;
            // A bare value with a step (`3/5`) extends to the field maximum.
            if step > 1 {
                (v, max)
            } else {
                (v, v)
            }
        };

        if start < min || end > max {
            let value = if start < min { start } else { end };
            return Err(CronError::Range { field, value, min, max });
        }
        let mut v = start;
        while v <= end {
            mask |= 1 << v;
            v += step;
        }
    }
    if mask == 0 {
        return Err(CronError::Field { field, text: text.to_string() });
    }
    Ok(mask)
}

fn parse_value(text: &str, field: &'static str) -> Result<u32, CronError> {
    text.parse().map_err(|_| CronError::Field { field, text: text.to_string() })
}

/// Day-of-week accepts 0-7 with both 0 and 7 meaning Sunday.
fn parse_dow(text: &str) -> Result<u8, CronError> {
    let mask = parse_field(text, "day-of-week", 0, 7)?;
    let mut out = (mask & 0x7f) as u8;
    if mask & (1 << 7) != 0 {
        out |= 1;
    }
    Ok(out)
}

#[cfg(test)]
#[path = "cron_tests.rs"]
mod tests;
