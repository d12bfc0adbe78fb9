//! Conversions between local wall-clock times and stored UTC instants.

use std::ops::Range;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

use crate::error::TrackError;

/// Converts a local time to UTC. In a DST fold the earlier instant is used.
pub fn to_utc<Tz: TimeZone>(tz: &Tz, local: NaiveDateTime) -> Result<DateTime<Utc>, TrackError> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or(TrackError::InvalidLocalTime(local))
}

/// The local calendar day containing `at`, as a UTC range.
pub fn local_day<Tz: TimeZone>(tz: &Tz, at: DateTime<Utc>) -> Range<DateTime<Utc>> {
    day_range(tz, at.with_timezone(tz).date_naive()).unwrap_or(at..at + Duration::days(1))
}

/// Local midnight of `date` up to local midnight of the next day.
pub fn day_range<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<Range<DateTime<Utc>>> {
    let start = midnight(tz, date)?;
    let end = date
        .succ_opt()
        .and_then(|next| midnight(tz, next))
        .unwrap_or(start + Duration::days(1));
    Some(start..end)
}

fn midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> Option<DateTime<Utc>> {
    // Zones that skip midnight start the day at the first valid instant.
    (0..4)
        .map(|hour| date.and_time(NaiveTime::MIN) + Duration::hours(hour))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}
