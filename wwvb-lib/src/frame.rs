//! Frame accumulation.
//!
//! Once the minute boundary is locked the 58 interior seconds are collected
//! one bit at a time. Marker seconds anchor the frame structure and carry no
//! value; data seconds must be phase-valid zeros or ones landing within the
//! configured offset of their nominal second. The first defect abandons the
//! minute.

use tracing::debug;

use crate::{
    classify::{BitClassifier, ClassifiedBit, Symbol},
    config::Config,
    pulse::{PulseSource, Ticks},
};

/// A structural defect in the received minute.
///
/// Defects are recoverable: the pipeline logs them, discards the partial
/// frame, and returns to searching for the next minute boundary.
#[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum FrameDefect {
    /// Bit arrived outside the one-second cadence window.
    #[error("bit at second {second} arrived out of phase")]
    PhaseInvalid { second: u8 },

    /// Data bit landed too far from its nominal second within the minute.
    #[error("bit at second {second} off nominal by {offset_ms} ms")]
    OffsetOutOfTolerance { second: u8, offset_ms: i32 },

    /// A marker position held a data symbol.
    #[error("expected marker at second {second}")]
    MarkerExpected { second: u8 },

    /// A data position held a marker.
    #[error("unexpected marker at second {second}")]
    MarkerUnexpected { second: u8 },

    /// The pulse stream ended mid-minute.
    #[error("pulse stream ended at second {second}")]
    StreamEnded { second: u8 },

    /// A decoded field held a non-decimal digit or out-of-range value.
    #[error("{field} out of range: {value}")]
    FieldRange { field: &'static str, value: u16 },

    /// Day-of-year exceeded the year's maximum.
    #[error("day-of-year {doy} exceeds {max}")]
    DayOfYearRange { doy: u16, max: u16 },
}

/// One received 60-second frame.
///
/// Bits are indexed by broadcast second. The frame-reference second and the
/// five interior markers carry no value and read as zero, as does second 59,
/// whose marker is consumed by the next boundary search.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RawFrame {
    bits: u64,
    len: u8,
}

impl RawFrame {
    pub const SECONDS: u8 = 60;

    /// Assemble a frame from per-second bit values. Marker seconds should be
    /// given as zero.
    #[must_use]
    pub fn from_bit_values(values: &[u8; 60]) -> Self {
        let mut frame = RawFrame::default();
        for value in values {
            frame.push(*value != 0);
        }
        frame
    }

    /// Bit value at `second`.
    #[must_use]
    pub fn bit(&self, second: u8) -> u16 {
        debug_assert!(second < Self::SECONDS);
        ((self.bits >> (Self::SECONDS - 1 - second)) & 1) as u16
    }

    /// Binary value of the contiguous run `first..=last`, transmitted MSB
    /// first.
    #[must_use]
    pub fn field(&self, first: u8, last: u8) -> u16 {
        let mut value = 0;
        for second in first..=last {
            value = (value << 1) | self.bit(second);
        }
        value
    }

    fn push(&mut self, one: bool) {
        self.bits = (self.bits << 1) | u64::from(one);
        self.len += 1;
    }
}

/// Signed distance from an edge to its nearest nominal second boundary.
///
/// Offsets past the half-second point are re-expressed as a negative
/// distance to the following second.
fn phase_offset_ms(edge: Ticks, minute_start: Ticks) -> i32 {
    let rem = (edge.saturating_sub(minute_start) % 1000) as i32;
    if rem > 500 {
        rem - 1000
    } else {
        rem
    }
}

fn check_position(
    bit: &ClassifiedBit,
    second: u8,
    minute_start: Ticks,
    config: &Config,
) -> Result<(), FrameDefect> {
    if !bit.phase_valid {
        return Err(FrameDefect::PhaseInvalid { second });
    }
    if second % 10 == 9 {
        if bit.symbol != Symbol::Marker {
            return Err(FrameDefect::MarkerExpected { second });
        }
        return Ok(());
    }
    match (bit.symbol, bit.edge) {
        (Symbol::Zero | Symbol::One, Some(edge)) => {
            let offset_ms = phase_offset_ms(edge, minute_start);
            if offset_ms.unsigned_abs() > config.tolerance_ms {
                return Err(FrameDefect::OffsetOutOfTolerance { second, offset_ms });
            }
            Ok(())
        }
        (Symbol::Marker, _) => Err(FrameDefect::MarkerUnexpected { second }),
        _ => Err(FrameDefect::PhaseInvalid { second }),
    }
}

/// Collect the interior seconds of the minute beginning at `minute_start`.
///
/// Reads seconds 1 through 58 from the classifier. Second 0 is the boundary
/// marker already consumed by the synchronizer and second 59's marker is
/// left for the next boundary search.
///
/// # Errors
/// [`FrameDefect`] for the first structural problem encountered; collection
/// does not continue past it.
pub fn collect_frame<S>(
    bits: &mut BitClassifier<S>,
    minute_start: Ticks,
    config: &Config,
) -> Result<RawFrame, FrameDefect>
where
    S: PulseSource,
{
    let mut frame = RawFrame::default();
    frame.push(false); // second 0: the boundary marker

    for second in 1..=58u8 {
        let Some(bit) = bits.next_bit() else {
            return Err(FrameDefect::StreamEnded { second });
        };
        if let Err(defect) = check_position(&bit, second, minute_start, config) {
            debug!(%defect, partial = frame.len, "abandoning frame");
            return Err(defect);
        }
        frame.push(bit.symbol == Symbol::One);
    }
    frame.push(false); // second 59: marker, no value

    Ok(frame)
}
