use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::str::FromStr;

use crate::config::CalendarConfig;
use crate::error::{AppError, Result};
use crate::models::Priority;

/// Which clock a deadline accrues against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarKind {
    /// 24×7: elapsed time accrues continuously
    AlwaysOn,
    /// Only configured working days/hours accrue elapsed time
    BusinessHours,
}

impl CalendarKind {
    /// P1 deadlines are always-on regardless of the policy's normal
    /// calendar; every other priority is business-hours. Deliberate
    /// business rule, preserved exactly.
    pub fn for_priority(priority: Priority) -> Self {
        if priority.is_always_on() {
            CalendarKind::AlwaysOn
        } else {
            CalendarKind::BusinessHours
        }
    }
}

/// Business calendar: a daily window on a set of working days, interpreted
/// in the tenant's timezone. Default 09:00–18:00 Monday–Friday.
#[derive(Debug, Clone)]
pub struct BusinessCalendar {
    window_start: NaiveTime,
    window_end: NaiveTime,
    business_days: Vec<Weekday>,
    timezone: Tz,
}

impl BusinessCalendar {
    pub fn new(
        window_start: NaiveTime,
        window_end: NaiveTime,
        business_days: Vec<Weekday>,
        timezone: Tz,
    ) -> Result<Self> {
        if window_start >= window_end {
            return Err(AppError::Configuration(format!(
                "Business window start {} must precede end {}",
                window_start, window_end
            )));
        }
        if business_days.is_empty() {
            return Err(AppError::Configuration(
                "At least one business day is required".to_string(),
            ));
        }

        Ok(Self {
            window_start,
            window_end,
            business_days,
            timezone,
        })
    }

    pub fn from_config(config: &CalendarConfig) -> Result<Self> {
        let window_start = NaiveTime::parse_from_str(&config.window_start, "%H:%M")
            .map_err(|e| AppError::Configuration(format!("Bad window_start: {}", e)))?;
        let window_end = NaiveTime::parse_from_str(&config.window_end, "%H:%M")
            .map_err(|e| AppError::Configuration(format!("Bad window_end: {}", e)))?;

        let business_days = config
            .business_days
            .iter()
            .map(|day| {
                Weekday::from_str(day)
                    .map_err(|_| AppError::Configuration(format!("Bad business day: {}", day)))
            })
            .collect::<Result<Vec<Weekday>>>()?;

        let timezone = config
            .timezone
            .parse::<Tz>()
            .map_err(|_| AppError::Configuration(format!("Bad timezone: {}", config.timezone)))?;

        Self::new(window_start, window_end, business_days, timezone)
    }

    /// Pure predicate: is this instant inside the business window?
    pub fn is_business_hour(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.timezone);
        let time = local.time();

        self.business_days.contains(&local.weekday())
            && time >= self.window_start
            && time < self.window_end
    }

    /// Add `minutes` of elapsed time to `start` under the given calendar.
    ///
    /// For `BusinessHours`, each business day contributes at most the
    /// window length before the calculation advances to the next business
    /// day; the result never falls inside an excluded span (it may land
    /// exactly on the window-end boundary).
    pub fn add_minutes(
        &self,
        start: DateTime<Utc>,
        minutes: i64,
        kind: CalendarKind,
    ) -> DateTime<Utc> {
        let minutes = minutes.max(0);

        match kind {
            CalendarKind::AlwaysOn => start + Duration::minutes(minutes),
            CalendarKind::BusinessHours => self.add_business_minutes(start, minutes),
        }
    }

    /// Convenience: add minutes under the calendar mandated by the
    /// ticket's priority.
    pub fn add_minutes_for(
        &self,
        start: DateTime<Utc>,
        minutes: i64,
        priority: Priority,
    ) -> DateTime<Utc> {
        self.add_minutes(start, minutes, CalendarKind::for_priority(priority))
    }

    fn add_business_minutes(&self, start: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
        let local = start.with_timezone(&self.timezone);
        let (mut date, mut time) = (local.date_naive(), local.time());

        // Snap forward to the next open window
        if !self.business_days.contains(&date.weekday()) || time >= self.window_end {
            date = self.next_business_day(date);
            time = self.window_start;
        } else if time < self.window_start {
            time = self.window_start;
        }

        let mut remaining = minutes;
        loop {
            let available = (self.window_end - time).num_minutes();
            if remaining <= available {
                return self.resolve_local(date, time + Duration::minutes(remaining));
            }
            remaining -= available;
            date = self.next_business_day(date);
            time = self.window_start;
        }
    }

    fn next_business_day(&self, mut date: NaiveDate) -> NaiveDate {
        loop {
            date += Duration::days(1);
            if self.business_days.contains(&date.weekday()) {
                return date;
            }
        }
    }

    fn resolve_local(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let naive = date.and_time(time);
        // DST gaps have no exact local representation; take the earliest
        // valid mapping, or the following hour when the instant was skipped
        self.timezone
            .from_local_datetime(&naive)
            .earliest()
            .unwrap_or_else(|| {
                self.timezone
                    .from_local_datetime(&(naive + Duration::hours(1)))
                    .earliest()
                    .expect("local time one hour past a DST gap is valid")
                    .with_timezone(&self.timezone)
            })
            .with_timezone(&Utc)
    }
}

impl Default for BusinessCalendar {
    fn default() -> Self {
        Self {
            window_start: NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
            window_end: NaiveTime::from_hms_opt(18, 0, 0).expect("valid time"),
            business_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            timezone: chrono_tz::UTC,
        }
    }
}
