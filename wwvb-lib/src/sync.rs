//! Minute-boundary synchronization.
//!
//! The broadcast marks the top of each minute with back-to-back markers:
//! second 59 of the old minute and second 0 of the new one. The
//! synchronizer scans the classified bit stream for that pair, requiring
//! the second marker to arrive on the one-second cadence, and hands the new
//! minute's start edge to the accumulator. When the previous minute decoded
//! a pending leap second at a month boundary, the inserted second 60 makes
//! it three markers in a row.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::{
    calendar,
    classify::{BitClassifier, Symbol},
    config::Config,
    decode::DecodedTime,
    pulse::{PulseSource, Ticks},
    store::ClockStore,
    Error, Result,
};

/// Carry-over from the previously decoded minute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MinuteContext {
    /// Signed DUT correction in tenths of a second, zero before the first
    /// decode or when the broadcast sign pattern was invalid.
    pub dut_tenths: i32,
    /// The minute now ending is 23:59 on the last day of a month with the
    /// leap-second bit set, so the next boundary carries an inserted second.
    pub leap_second: bool,
}

impl MinuteContext {
    /// Context to carry into the next minute after a successful decode.
    #[must_use]
    pub fn after_decode(decoded: &DecodedTime) -> Self {
        let leap_second = decoded.leap_second_pending
            && decoded.hour == 23
            && decoded.minute == 59
            && is_last_day_of_month(decoded);
        MinuteContext {
            dut_tenths: decoded.dut_signed_tenths(),
            leap_second,
        }
    }
}

fn is_last_day_of_month(decoded: &DecodedTime) -> bool {
    match calendar::yday_to_date(decoded.day_of_year, decoded.leap_year) {
        Some((month, day)) => day == calendar::days_in_month(month, decoded.leap_year),
        None => false,
    }
}

enum SyncState {
    Searching,
    WaitSecond,
}

/// Scan the bit stream until a minute boundary is locked.
///
/// Returns the leading-edge time of the boundary marker (second 0 of the
/// new minute, or the inserted second during a leap-second minute), or
/// `None` when the bit stream ends.
pub fn acquire<S>(bits: &mut BitClassifier<S>, ctx: &MinuteContext) -> Option<Ticks>
where
    S: PulseSource,
{
    let mut state = SyncState::Searching;
    loop {
        let bit = bits.next_bit()?;
        let marker = bit.symbol == Symbol::Marker && bit.phase_valid;

        state = match state {
            SyncState::Searching => {
                if marker {
                    trace!(edge = bit.edge, "first boundary marker");
                    SyncState::WaitSecond
                } else {
                    SyncState::Searching
                }
            }
            SyncState::WaitSecond => {
                if marker {
                    if ctx.leap_second {
                        // second 60 of the old minute; the real boundary is
                        // one more marker out
                        trace!("leap second minute, expecting a third marker");
                        let third = bits.next_bit()?;
                        if third.symbol == Symbol::Marker && third.phase_valid {
                            if let Some(edge) = third.edge {
                                info!(edge, "minute boundary locked after leap second");
                                return Some(edge);
                            }
                        }
                        debug!("third marker missing, resuming search");
                        SyncState::Searching
                    } else if let Some(edge) = bit.edge {
                        info!(edge, "minute boundary locked");
                        return Some(edge);
                    } else {
                        SyncState::Searching
                    }
                } else {
                    SyncState::Searching
                }
            }
        };
    }
}

/// Delay from top-of-minute to the seconds resync, and the seconds value to
/// write when it fires.
///
/// A negative DUT can drive the raw delay negative; whole seconds are added
/// until the wait is positive and each one carries into the written value.
#[must_use]
pub fn resync_delay(dut_tenths: i32, base_ms: u32) -> (u64, u8) {
    let mut delay = i64::from(base_ms) + i64::from(dut_tenths) * 100;
    let mut seconds: u8 = 1;
    while delay <= 0 {
        delay += 1000;
        seconds += 1;
    }
    (delay as u64, seconds)
}

/// Schedule the one-shot top-of-minute resync on a scratch thread.
///
/// The resync sleeps out the DUT-adjusted delay and then asks the store to
/// align the chip's second counter. It runs detached so bit accumulation is
/// never stalled behind the chip write.
///
/// # Errors
/// [`Error::WorkerSpawn`] when the scratch thread cannot be created; the
/// engine treats this as fatal.
pub fn schedule_resync(
    store: Arc<ClockStore>,
    ctx: &MinuteContext,
    config: &Config,
) -> Result<JoinHandle<()>> {
    let (delay_ms, seconds) = resync_delay(ctx.dut_tenths, config.resync_base_ms);
    thread::Builder::new()
        .name("resync".into())
        .spawn(move || {
            thread::sleep(Duration::from_millis(delay_ms));
            debug!(seconds, "issuing seconds resync");
            if let Err(err) = store.sync_seconds(seconds) {
                warn!("seconds resync dropped: {err}");
            }
        })
        .map_err(|source| Error::WorkerSpawn {
            name: "resync",
            source,
        })
}
