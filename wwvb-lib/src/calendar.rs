//! Civil-calendar helpers.
//!
//! The broadcast carries the date as an ordinal day of year; everything
//! downstream (the RTC, the display) wants month and day. These conversions
//! are the only calendar math the engine needs.

use serde::{Deserialize, Serialize};

/// Civil calendar time as held by the clock store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// Day of week, 0 = Sunday.
    pub weekday: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Gregorian leap-year test.
#[must_use]
pub fn is_leap_year(year: u16) -> bool {
    (year % 400 == 0 || year % 100 != 0) && year % 4 == 0
}

#[must_use]
pub fn days_in_month(month: u8, leap: bool) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if leap {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// Convert an ordinal day of year to `(month, day)`.
///
/// Returns `None` when `day_of_year` is zero or exceeds the year kind's
/// maximum (365, or 366 in a leap year).
#[must_use]
pub fn yday_to_date(day_of_year: u16, leap: bool) -> Option<(u8, u8)> {
    let max = if leap { 366 } else { 365 };
    if day_of_year == 0 || day_of_year > max {
        return None;
    }

    let mut remaining = day_of_year;
    for month in 1..=12u8 {
        let len = u16::from(days_in_month(month, leap));
        if remaining <= len {
            return Some((month, remaining as u8));
        }
        remaining -= len;
    }
    None
}

/// Inverse of [`yday_to_date`].
#[must_use]
pub fn date_to_yday(month: u8, day: u8, leap: bool) -> u16 {
    let mut days = u16::from(day);
    for earlier in 1..month {
        days += u16::from(days_in_month(earlier, leap));
    }
    days
}

/// Day of week for a Gregorian date, 0 = Sunday (Sakamoto's method).
#[must_use]
pub fn day_of_week(year: u16, month: u8, day: u8) -> u8 {
    const OFFSETS: [u16; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let y = if month < 3 { year - 1 } else { year };
    let index = usize::from(month - 1);
    ((y + y / 4 - y / 100 + y / 400 + OFFSETS[index] + u16::from(day)) % 7) as u8
}
