//! Next-run-date arithmetic.
//!
//! Each step moves the previous run date by one calendar unit. Month-based units
//! clamp the day to the end of the target month on every step, so a schedule that
//! starts on Jan 31 runs Feb 28 and then Mar 28. Time-of-day and offset are kept.

use time::{util::days_in_year_month, Date, Duration, OffsetDateTime};

use crate::{
    error::{ApiError, Result},
    models::schedule::Frequency,
};

/// Move `from` forward by one `frequency` step
pub fn advance(from: OffsetDateTime, frequency: Frequency) -> Result<OffsetDateTime> {
    let date = from.date();
    let next = match frequency {
        Frequency::Daily => date.checked_add(Duration::days(1)),
        Frequency::Weekly => date.checked_add(Duration::weeks(1)),
        Frequency::Monthly => add_months(date, 1),
        Frequency::Quarterly => add_months(date, 3),
        Frequency::Yearly => add_months(date, 12),
    }
    .ok_or_else(|| {
        ApiError::Validation(format!(
            "next run after {} is outside the supported date range",
            from
        ))
    })?;

    Ok(from.replace_date(next))
}

/// Advance once from `prior`, then keep stepping while the result is still not in
/// the future. Returns the new run date and how many occurrences were passed over.
pub fn advance_past(
    prior: OffsetDateTime,
    frequency: Frequency,
    now: OffsetDateTime,
) -> Result<(OffsetDateTime, u32)> {
    let mut next = advance(prior, frequency)?;
    let mut skipped = 0;
    while next <= now {
        next = advance(next, frequency)?;
        skipped += 1;
    }
    Ok((next, skipped))
}

fn add_months(date: Date, months: u8) -> Option<Date> {
    let month_index = date.month() as i32 - 1 + months as i32;
    let year = date.year() + month_index / 12;
    let month = date.month().nth_next(months);
    let day = date.day().min(days_in_year_month(year, month));

    Date::from_calendar_date(year, month, day).ok()
}
