//! Frame decoding.
//!
//! Field positions follow the WWVB amplitude broadcast: BCD digits are
//! transmitted MSB first in fixed runs of seconds, separated by the interior
//! markers. Decoding validates every digit and field range; a frame that
//! fails any check is rejected whole, with one exception: an unrecognized
//! DUT sign pattern only invalidates the DUT correction.

use serde::Serialize;

use crate::{
    calendar::{self, CalendarTime},
    frame::{FrameDefect, RawFrame},
};

// Broadcast second positions of each field, MSB first.
const MINUTE_TENS: (u8, u8) = (1, 3);
const MINUTE_ONES: (u8, u8) = (5, 8);
const HOUR_TENS: (u8, u8) = (12, 13);
const HOUR_ONES: (u8, u8) = (15, 18);
const DOY_HUNDREDS: (u8, u8) = (22, 23);
const DOY_TENS: (u8, u8) = (25, 28);
const DOY_ONES: (u8, u8) = (30, 33);
const DUT_SIGN: (u8, u8) = (36, 38);
const DUT_TENTHS: (u8, u8) = (40, 43);
const YEAR_TENS: (u8, u8) = (45, 48);
const YEAR_ONES: (u8, u8) = (50, 53);
const LEAP_YEAR: u8 = 55;
const LEAP_SECOND: u8 = 56;
const DST_STATUS: (u8, u8) = (57, 58);

/// Pack `value` (0..=99) into two BCD digits.
#[must_use]
pub fn int2bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Unpack two BCD digits.
#[must_use]
pub fn bcd2int(bcd: u8) -> u8 {
    (bcd >> 4) * 10 + (bcd & 0x0f)
}

/// Sign of the broadcast UT1 - UTC correction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DutSign {
    Positive,
    Negative,
    /// The three-bit sign pattern matched neither known encoding; the DUT
    /// correction is skipped for this minute.
    Invalid,
}

impl DutSign {
    /// Decode the sign pattern from seconds 36-38: `010` is positive, `001`
    /// negative.
    #[must_use]
    fn from_pattern(bits: u16) -> Self {
        match bits {
            0b010 => DutSign::Positive,
            0b001 => DutSign::Negative,
            _ => DutSign::Invalid,
        }
    }
}

/// Daylight-saving status broadcast in the last two data seconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum DstState {
    Standard,
    /// DST ends today at 02:00 local.
    Ending,
    /// DST begins today at 02:00 local.
    Starting,
    Enabled,
}

impl DstState {
    /// Decode broadcast bits 57 and 58.
    #[must_use]
    pub fn from_bits(bit57: u16, bit58: u16) -> Self {
        match (bit57, bit58) {
            (0, 0) => DstState::Standard,
            (1, 0) => DstState::Ending,
            (0, 1) => DstState::Starting,
            _ => DstState::Enabled,
        }
    }

    /// NVRAM byte encoding.
    #[must_use]
    pub fn to_nvram(self) -> u8 {
        match self {
            DstState::Standard => 0,
            DstState::Ending => 1,
            DstState::Starting => 2,
            DstState::Enabled => 3,
        }
    }

    /// Decode the NVRAM byte; unknown values fall back to standard time.
    #[must_use]
    pub fn from_nvram(value: u8) -> Self {
        match value {
            1 => DstState::Ending,
            2 => DstState::Starting,
            3 => DstState::Enabled,
            _ => DstState::Standard,
        }
    }
}

/// A fully validated decode of one minute frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DecodedTime {
    pub minute: u8,
    pub hour: u8,
    pub day_of_year: u16,
    /// Broadcast two-digit year.
    pub year: u8,
    pub dut_sign: DutSign,
    pub dut_tenths: u8,
    pub leap_year: bool,
    /// A leap second is inserted at the end of the current month.
    pub leap_second_pending: bool,
    pub dst: DstState,
}

impl DecodedTime {
    /// Full Gregorian year. The broadcast carries two digits; the century is
    /// fixed to 2000 as this receiver will not outlive it.
    #[must_use]
    pub fn full_year(&self) -> u16 {
        2000 + u16::from(self.year)
    }

    /// The UT1 - UTC correction in signed tenths of a second, zero when the
    /// sign pattern was invalid.
    #[must_use]
    pub fn dut_signed_tenths(&self) -> i32 {
        match self.dut_sign {
            DutSign::Positive => i32::from(self.dut_tenths),
            DutSign::Negative => -i32::from(self.dut_tenths),
            DutSign::Invalid => 0,
        }
    }

    /// Expand to a calendar date and time.
    ///
    /// Seconds are owned by the top-of-minute resync and read zero here.
    /// Returns `None` when the day of year does not map into the broadcast
    /// year, which [`decode`] has already ruled out for its results.
    #[must_use]
    pub fn to_calendar(&self) -> Option<CalendarTime> {
        let (month, day) = calendar::yday_to_date(self.day_of_year, self.leap_year)?;
        Some(CalendarTime {
            year: self.full_year(),
            month,
            day,
            weekday: calendar::day_of_week(self.full_year(), month, day),
            hour: self.hour,
            minute: self.minute,
            second: 0,
        })
    }
}

fn digit(frame: &RawFrame, field: (u8, u8), name: &'static str) -> Result<u16, FrameDefect> {
    let value = frame.field(field.0, field.1);
    if value > 9 {
        return Err(FrameDefect::FieldRange { field: name, value });
    }
    Ok(value)
}

fn two_digits(
    frame: &RawFrame,
    tens: (u8, u8),
    ones: (u8, u8),
    name: &'static str,
    max: u16,
) -> Result<u16, FrameDefect> {
    let tens = frame.field(tens.0, tens.1);
    let ones = digit(frame, ones, name)?;
    let value = tens * 10 + ones;
    if tens > 9 || value > max {
        return Err(FrameDefect::FieldRange { field: name, value });
    }
    Ok(value)
}

/// Decode the BCD fields of a collected frame.
///
/// # Errors
/// [`FrameDefect`] when any digit is non-decimal, a field exceeds its range,
/// or the day of year is impossible for the broadcast year kind.
pub fn decode(frame: &RawFrame) -> Result<DecodedTime, FrameDefect> {
    let minute = two_digits(frame, MINUTE_TENS, MINUTE_ONES, "minute", 59)?;
    let hour = two_digits(frame, HOUR_TENS, HOUR_ONES, "hour", 23)?;
    let year = two_digits(frame, YEAR_TENS, YEAR_ONES, "year", 99)?;

    let hundreds = frame.field(DOY_HUNDREDS.0, DOY_HUNDREDS.1);
    let tens = digit(frame, DOY_TENS, "day-of-year tens")?;
    let ones = digit(frame, DOY_ONES, "day-of-year ones")?;
    let day_of_year = hundreds * 100 + tens * 10 + ones;

    let leap_year = frame.bit(LEAP_YEAR) == 1;
    let max_doy = if leap_year { 366 } else { 365 };
    if day_of_year == 0 || day_of_year > max_doy {
        return Err(FrameDefect::DayOfYearRange {
            doy: day_of_year,
            max: max_doy,
        });
    }

    let dut_sign = DutSign::from_pattern(frame.field(DUT_SIGN.0, DUT_SIGN.1));
    let dut_tenths = digit(frame, DUT_TENTHS, "dut magnitude")?;

    Ok(DecodedTime {
        minute: minute as u8,
        hour: hour as u8,
        day_of_year,
        year: year as u8,
        dut_sign,
        dut_tenths: dut_tenths as u8,
        leap_year,
        leap_second_pending: frame.bit(LEAP_SECOND) == 1,
        dst: DstState::from_bits(frame.bit(DST_STATUS.0), frame.bit(DST_STATUS.1)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bit values for a frame carrying the given fields, markers as zeros.
    pub(crate) fn frame_bits(
        minute: u8,
        hour: u8,
        day_of_year: u16,
        year: u8,
        dut_sign: [u8; 3],
        dut_tenths: u8,
        leap_year: bool,
        leap_second: bool,
        dst: (u8, u8),
    ) -> [u8; 60] {
        let mut bits = [0u8; 60];
        let mut put = |field: (u8, u8), value: u16| {
            let width = field.1 - field.0 + 1;
            for (i, second) in (field.0..=field.1).enumerate() {
                bits[second as usize] = ((value >> (width - 1 - i as u8)) & 1) as u8;
            }
        };
        put(MINUTE_TENS, u16::from(minute / 10));
        put(MINUTE_ONES, u16::from(minute % 10));
        put(HOUR_TENS, u16::from(hour / 10));
        put(HOUR_ONES, u16::from(hour % 10));
        put(DOY_HUNDREDS, day_of_year / 100);
        put(DOY_TENS, day_of_year / 10 % 10);
        put(DOY_ONES, day_of_year % 10);
        put(DUT_TENTHS, u16::from(dut_tenths));
        put(YEAR_TENS, u16::from(year / 10));
        put(YEAR_ONES, u16::from(year % 10));
        bits[DUT_SIGN.0 as usize] = dut_sign[0];
        bits[DUT_SIGN.0 as usize + 1] = dut_sign[1];
        bits[DUT_SIGN.0 as usize + 2] = dut_sign[2];
        bits[LEAP_YEAR as usize] = u8::from(leap_year);
        bits[LEAP_SECOND as usize] = u8::from(leap_second);
        bits[DST_STATUS.0 as usize] = dst.0;
        bits[DST_STATUS.1 as usize] = dst.1;
        bits
    }

    fn canonical() -> RawFrame {
        // 2023-06-15 23:59 UTC, DUT +0.2, DST in effect
        RawFrame::from_bit_values(&frame_bits(
            59,
            23,
            166,
            23,
            [0, 1, 0],
            2,
            false,
            false,
            (1, 1),
        ))
    }

    #[test]
    fn bcd_round_trips_for_two_digit_values() {
        for value in 0..=99u8 {
            assert_eq!(bcd2int(int2bcd(value)), value);
        }
        assert_eq!(int2bcd(59), 0x59);
        assert_eq!(bcd2int(0x23), 23);
    }

    #[test]
    fn canonical_frame_decodes_every_field() {
        let decoded = decode(&canonical()).unwrap();
        assert_eq!(decoded.minute, 59);
        assert_eq!(decoded.hour, 23);
        assert_eq!(decoded.day_of_year, 166);
        assert_eq!(decoded.year, 23);
        assert_eq!(decoded.dut_sign, DutSign::Positive);
        assert_eq!(decoded.dut_tenths, 2);
        assert_eq!(decoded.dut_signed_tenths(), 2);
        assert!(!decoded.leap_year);
        assert!(!decoded.leap_second_pending);
        assert_eq!(decoded.dst, DstState::Enabled);

        let cal = decoded.to_calendar().unwrap();
        assert_eq!((cal.year, cal.month, cal.day), (2023, 6, 15));
        assert_eq!(cal.weekday, 4);
        assert_eq!(cal.second, 0);
    }

    #[test]
    fn negative_dut_sign_pattern_decodes() {
        let frame = RawFrame::from_bit_values(&frame_bits(
            30,
            12,
            100,
            23,
            [0, 0, 1],
            3,
            false,
            false,
            (0, 0),
        ));
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.dut_sign, DutSign::Negative);
        assert_eq!(decoded.dut_signed_tenths(), -3);
    }

    #[test]
    fn unknown_dut_sign_pattern_is_invalid_but_frame_is_accepted() {
        let frame = RawFrame::from_bit_values(&frame_bits(
            30,
            12,
            100,
            23,
            [1, 1, 1],
            4,
            false,
            false,
            (0, 0),
        ));
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded.dut_sign, DutSign::Invalid);
        assert_eq!(decoded.dut_signed_tenths(), 0, "correction skipped");
        assert_eq!(decoded.minute, 30);
    }

    #[test]
    fn leap_day_requires_the_leap_year_bit() {
        let with_bit = RawFrame::from_bit_values(&frame_bits(
            0,
            10,
            366,
            24,
            [0, 1, 0],
            0,
            true,
            false,
            (0, 0),
        ));
        let decoded = decode(&with_bit).unwrap();
        assert_eq!(decoded.to_calendar().unwrap().month, 12);
        assert_eq!(decoded.to_calendar().unwrap().day, 31);

        let without_bit = RawFrame::from_bit_values(&frame_bits(
            0,
            10,
            366,
            24,
            [0, 1, 0],
            0,
            false,
            false,
            (0, 0),
        ));
        assert_eq!(
            decode(&without_bit),
            Err(FrameDefect::DayOfYearRange { doy: 366, max: 365 })
        );
    }

    #[test]
    fn zero_day_of_year_is_rejected() {
        let frame = RawFrame::from_bit_values(&frame_bits(
            0,
            0,
            0,
            23,
            [0, 1, 0],
            0,
            false,
            false,
            (0, 0),
        ));
        assert_eq!(
            decode(&frame),
            Err(FrameDefect::DayOfYearRange { doy: 0, max: 365 })
        );
    }

    #[test]
    fn non_decimal_digit_is_rejected() {
        let mut bits = frame_bits(0, 0, 100, 23, [0, 1, 0], 0, false, false, (0, 0));
        // minutes ones = 0b1111
        for second in MINUTE_ONES.0..=MINUTE_ONES.1 {
            bits[second as usize] = 1;
        }
        assert_eq!(
            decode(&RawFrame::from_bit_values(&bits)),
            Err(FrameDefect::FieldRange {
                field: "minute",
                value: 15
            })
        );
    }

    #[test]
    fn dst_states_follow_the_broadcast_encoding() {
        assert_eq!(DstState::from_bits(0, 0), DstState::Standard);
        assert_eq!(DstState::from_bits(1, 0), DstState::Ending);
        assert_eq!(DstState::from_bits(0, 1), DstState::Starting);
        assert_eq!(DstState::from_bits(1, 1), DstState::Enabled);
    }

    #[test]
    fn dst_nvram_encoding_round_trips() {
        for state in [
            DstState::Standard,
            DstState::Ending,
            DstState::Starting,
            DstState::Enabled,
        ] {
            assert_eq!(DstState::from_nvram(state.to_nvram()), state);
        }
        assert_eq!(DstState::from_nvram(0xff), DstState::Standard);
    }
}
