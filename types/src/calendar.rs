use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// UTC calendar day used for the daily spin allowance.
pub fn utc_day(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Instant of the next UTC midnight after `now`.
pub fn next_daily_reset(now: DateTime<Utc>) -> DateTime<Utc> {
    utc_day(now)
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// ISO week containing `now`, rendered as `YYYY-Www`.
///
/// The ISO year is used (not the calendar year) so the last days of December that belong to
/// week 1 of the following year map to that week.
pub fn iso_week_key(now: DateTime<Utc>) -> String {
    let week = now.iso_week();
    format!("{:04}-W{:02}", week.year(), week.week())
}
