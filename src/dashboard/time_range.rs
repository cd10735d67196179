use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::DashboardError;

/// Longest custom range accepted, in days
const MAX_CUSTOM_DAYS: u64 = 3_660;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TimeRange {
    Today,
    Last7Days,
    Last30Days,
    ThisYear,
    /// Inclusive calendar dates in the business timezone
    Custom { from: NaiveDate, to: NaiveDate },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Granularity {
    Day,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    pub start: DateTime<Utc>,
    pub label: String,
}

/// A time range pinned to concrete instants: `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub granularity: Granularity,
    pub buckets: Vec<Bucket>,
}

impl ResolvedRange {
    /// Bucket holding `at`, if it falls inside the range
    pub fn bucket_index(&self, at: DateTime<Utc>) -> Option<usize> {
        if at < self.start || at >= self.end {
            return None;
        }
        self.buckets.partition_point(|b| b.start <= at).checked_sub(1)
    }
}

impl TimeRange {
    /// Resolve against the local calendar day of `now` in `tz`
    pub fn resolve(&self, now: DateTime<Utc>, tz: Tz) -> Result<ResolvedRange, DashboardError> {
        let today = now.with_timezone(&tz).date_naive();

        match *self {
            TimeRange::Today => daily(tz, today, today),
            TimeRange::Last7Days => daily(tz, days_before(today, 6)?, today),
            TimeRange::Last30Days => daily(tz, days_before(today, 29)?, today),
            TimeRange::ThisYear => monthly_year(tz, today.year()),
            TimeRange::Custom { from, to } => {
                if from > to {
                    return Err(DashboardError::Validation(format!(
                        "custom range starts after it ends: {} > {}",
                        from, to
                    )));
                }
                let span = (to - from).num_days().unsigned_abs();
                if span > MAX_CUSTOM_DAYS {
                    return Err(DashboardError::Validation(format!(
                        "custom range spans {} days, at most {} allowed",
                        span, MAX_CUSTOM_DAYS
                    )));
                }
                daily(tz, from, to)
            }
        }
    }
}

fn days_before(date: NaiveDate, days: u64) -> Result<NaiveDate, DashboardError> {
    date.checked_sub_days(Days::new(days))
        .ok_or_else(|| DashboardError::Validation(format!("date out of range: {}", date)))
}

fn next_day(date: NaiveDate) -> Result<NaiveDate, DashboardError> {
    date.succ_opt()
        .ok_or_else(|| DashboardError::Validation(format!("date out of range: {}", date)))
}

/// First instant of `date` in `tz`. A midnight skipped by a DST jump starts
/// the day at the first valid local time after it.
pub fn local_day_start(tz: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=2)
        .find_map(|hours| {
            tz.from_local_datetime(&(midnight + chrono::Duration::hours(hours)))
                .earliest()
        })
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}

fn daily(tz: Tz, first: NaiveDate, last: NaiveDate) -> Result<ResolvedRange, DashboardError> {
    let mut buckets = Vec::new();
    let mut day = first;
    while day <= last {
        buckets.push(Bucket {
            start: local_day_start(tz, day),
            label: day.format("%Y-%m-%d").to_string(),
        });
        day = next_day(day)?;
    }

    Ok(ResolvedRange {
        start: local_day_start(tz, first),
        end: local_day_start(tz, next_day(last)?),
        granularity: Granularity::Day,
        buckets,
    })
}

fn monthly_year(tz: Tz, year: i32) -> Result<ResolvedRange, DashboardError> {
    let jan_first = NaiveDate::from_ymd_opt(year, 1, 1)
        .ok_or_else(|| DashboardError::Validation(format!("year out of range: {}", year)))?;

    let mut buckets = Vec::with_capacity(12);
    for offset in 0..12 {
        let month_start = jan_first
            .checked_add_months(Months::new(offset))
            .ok_or_else(|| DashboardError::Validation(format!("year out of range: {}", year)))?;
        buckets.push(Bucket {
            start: local_day_start(tz, month_start),
            label: month_start.format("%Y-%m").to_string(),
        });
    }

    let next_year = jan_first
        .checked_add_months(Months::new(12))
        .ok_or_else(|| DashboardError::Validation(format!("year out of range: {}", year)))?;

    Ok(ResolvedRange {
        start: local_day_start(tz, jan_first),
        end: local_day_start(tz, next_year),
        granularity: Granularity::Month,
        buckets,
    })
}
