//! Period window resolution.
//!
//! Converts a period kind plus a reference instant into the concrete
//! scoring window for that kind. Resolution is pure: the same inputs always
//! produce the same window, which is what makes upsert-by-natural-key safe
//! for repeated rebuilds.

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};

use crate::domain::models::{Period, PeriodKind};

/// Resolve the scoring window containing `reference`.
///
/// - Weekly: ISO week, Monday 00:00:00 through Sunday 23:59:59.999
/// - Monthly: first through last calendar day of the reference month
/// - AllTime: Unix epoch through the end of the reference day
pub fn resolve(kind: PeriodKind, reference: DateTime<Utc>) -> Period {
    let day = reference.date_naive();
    let (start_date, end_date) = match kind {
        PeriodKind::Weekly => {
            let monday = day - Duration::days(day.weekday().num_days_from_monday() as i64);
            (monday, monday + Duration::days(6))
        }
        PeriodKind::Monthly => {
            let first = day.with_day(1).expect("day 1 exists in every month");
            (first, last_day_of_month(first))
        }
        PeriodKind::AllTime => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date is valid");
            (epoch, day)
        }
    };
    Period {
        kind,
        start: day_start(start_date),
        end: day_end(end_date),
    }
}

fn last_day_of_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("first of next month is valid") - Duration::days(1)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid"))
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(
        &date
            .and_hms_milli_opt(23, 59, 59, 999)
            .expect("end of day is valid"),
    )
}
