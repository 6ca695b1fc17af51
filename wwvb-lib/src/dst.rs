//! Local-time derivation.
//!
//! The store keeps UTC; displays want local civil time. The GMT offset is a
//! whole number of hours from NVRAM and the daylight-saving adjustment is a
//! pure function of the broadcast DST state and the standard-time hour:
//! on the start day the clock springs forward at 02:00 standard, and on the
//! end day only the repeated 01:00 hour still carries the extra hour.
//! Recomputing from broadcast state every minute makes the adjustment
//! idempotent, so a transition can never be applied twice.

use crate::{
    calendar::{self, CalendarTime},
    decode::DstState,
};

/// Hours of daylight saving in effect at the given local standard-time hour.
#[must_use]
pub fn dst_offset_hours(state: DstState, standard_hour: u8) -> u8 {
    match state {
        DstState::Standard => 0,
        DstState::Enabled => 1,
        DstState::Starting => u8::from(standard_hour >= 2),
        DstState::Ending => u8::from(standard_hour < 1),
    }
}

/// Shift a calendar time by whole hours, rolling the date in either
/// direction. Offsets stay within one day (GMT offsets span -12..=+14).
#[must_use]
pub fn shift_hours(time: &CalendarTime, offset_hours: i8) -> CalendarTime {
    let mut shifted = *time;
    let hour = i16::from(time.hour) + i16::from(offset_hours);

    if hour < 0 {
        shifted.hour = (hour + 24) as u8;
        previous_day(&mut shifted);
    } else if hour >= 24 {
        shifted.hour = (hour - 24) as u8;
        next_day(&mut shifted);
    } else {
        shifted.hour = hour as u8;
    }

    shifted.weekday = calendar::day_of_week(shifted.year, shifted.month, shifted.day);
    shifted
}

fn previous_day(time: &mut CalendarTime) {
    if time.day > 1 {
        time.day -= 1;
        return;
    }
    if time.month == 1 {
        time.year -= 1;
        time.month = 12;
    } else {
        time.month -= 1;
    }
    time.day = calendar::days_in_month(time.month, calendar::is_leap_year(time.year));
}

fn next_day(time: &mut CalendarTime) {
    let last = calendar::days_in_month(time.month, calendar::is_leap_year(time.year));
    if time.day < last {
        time.day += 1;
        return;
    }
    time.day = 1;
    if time.month == 12 {
        time.year += 1;
        time.month = 1;
    } else {
        time.month += 1;
    }
}

/// Local civil time for a stored UTC time, GMT offset, and DST state.
#[must_use]
pub fn local_calendar(utc: &CalendarTime, gmt_offset_hours: i8, dst: DstState) -> CalendarTime {
    let standard = shift_hours(utc, gmt_offset_hours);
    match dst_offset_hours(dst, standard.hour) {
        0 => standard,
        _ => shift_hours(&standard, 1),
    }
}
