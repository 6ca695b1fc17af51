//! Pulse capture.
//!
//! The receiver front end holds its output pin high and pulls it low for
//! 200, 500, or 800 ms once per second. [`EdgeCapture`] measures the width
//! of each negative pulse and stamps its leading edge; the capture worker
//! publishes every measurement into a [`PulseMailbox`] that the signal
//! pipeline polls. Filtering of sub-noise pulses happens downstream in the
//! classifier, not here.

use std::{
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use serde::Serialize;
use tracing::debug;

use crate::{Error, Result};

/// Monotonic engine time in milliseconds.
pub type Ticks = u64;

/// A measured negative pulse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Pulse {
    /// Time of the leading (falling) edge.
    pub edge: Ticks,
    /// Duration of the low period.
    pub width_ms: u32,
}

#[derive(Debug, Default)]
struct Slot {
    seq: u64,
    pulse: Option<Pulse>,
    closed: bool,
}

/// Single-slot mailbox holding the most recent pulse.
///
/// Samples are ephemeral: each publication overwrites the previous one. Both
/// fields of a sample are written under one lock so readers always observe a
/// consistent `(edge, width)` pair, and every publication bumps a sequence
/// number so pollers can tell a new sample from a re-read.
#[derive(Debug, Default)]
pub struct PulseMailbox {
    slot: Mutex<Slot>,
}

impl PulseMailbox {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(PulseMailbox::default())
    }

    /// Publish a new sample, overwriting any unread one.
    pub fn publish(&self, pulse: Pulse) {
        let mut slot = self.slot.lock().expect("pulse mailbox poisoned");
        slot.seq += 1;
        slot.pulse = Some(pulse);
    }

    /// The latest sample along with its publication sequence number.
    #[must_use]
    pub fn latest(&self) -> (u64, Option<Pulse>) {
        let slot = self.slot.lock().expect("pulse mailbox poisoned");
        (slot.seq, slot.pulse)
    }

    /// Mark the producer as gone so pollers drain the last sample and stop.
    pub fn close(&self) {
        self.slot.lock().expect("pulse mailbox poisoned").closed = true;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.lock().expect("pulse mailbox poisoned").closed
    }
}

/// Anything that yields measured pulses in reception order.
///
/// Implemented by the mailbox poller for live capture and by any pulse
/// iterator for recorded captures and tests.
pub trait PulseSource {
    /// Block until the next pulse, or `None` when the stream has ended.
    fn next_pulse(&mut self) -> Option<Pulse>;
}

impl<I> PulseSource for I
where
    I: Iterator<Item = Pulse>,
{
    fn next_pulse(&mut self) -> Option<Pulse> {
        self.next()
    }
}

/// Polls a [`PulseMailbox`] for new publications.
///
/// Iteration blocks on the configured poll interval and ends once the
/// mailbox is closed and its final sample drained.
pub struct MailboxSource {
    mailbox: Arc<PulseMailbox>,
    last_seq: u64,
    poll: Duration,
}

impl MailboxSource {
    #[must_use]
    pub fn new(mailbox: Arc<PulseMailbox>, poll_interval_ms: u64) -> Self {
        MailboxSource {
            mailbox,
            last_seq: 0,
            poll: Duration::from_millis(poll_interval_ms.max(1)),
        }
    }
}

impl Iterator for MailboxSource {
    type Item = Pulse;

    fn next(&mut self) -> Option<Pulse> {
        loop {
            let (seq, pulse) = self.mailbox.latest();
            if seq != self.last_seq {
                self.last_seq = seq;
                if let Some(pulse) = pulse {
                    return Some(pulse);
                }
            }
            if self.mailbox.is_closed() {
                return None;
            }
            thread::sleep(self.poll);
        }
    }
}

/// Instantaneous level of the receiver output pin.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    High,
    Low,
}

/// A level-sampled digital input.
///
/// Hardware implementations sample the receiver pin at a millisecond cadence
/// or better; recorded captures replay stored samples.
pub trait LevelInput {
    /// The pin level and the time it was observed, or `None` when the input
    /// is gone (end of a recorded capture).
    fn sample(&mut self) -> Option<(Ticks, Level)>;
}

/// Measures negative-pulse widths from a [`LevelInput`].
///
/// A falling edge stamps the pulse's leading edge; the following rising edge
/// fixes its width. Every pulse is yielded, however narrow.
pub struct EdgeCapture<P> {
    pin: P,
    level: Level,
}

impl<P> EdgeCapture<P>
where
    P: LevelInput,
{
    pub fn new(pin: P) -> Self {
        EdgeCapture {
            pin,
            level: Level::High,
        }
    }
}

impl<P> Iterator for EdgeCapture<P>
where
    P: LevelInput,
{
    type Item = Pulse;

    fn next(&mut self) -> Option<Pulse> {
        let edge = loop {
            let (at, level) = self.pin.sample()?;
            if self.level == Level::High && level == Level::Low {
                self.level = Level::Low;
                break at;
            }
            self.level = level;
        };
        loop {
            let (at, level) = self.pin.sample()?;
            if level == Level::High {
                self.level = Level::High;
                return Some(Pulse {
                    edge,
                    width_ms: at.saturating_sub(edge) as u32,
                });
            }
        }
    }
}

/// Spawn the capture worker draining `pulses` into `mailbox`.
///
/// The worker publishes every pulse it receives and closes the mailbox when
/// the source ends, letting downstream pollers terminate. A mailbox closed
/// from the consumer side stops the worker at its next pulse, so a halted
/// pipeline does not leave capture publishing to nobody.
///
/// # Errors
/// [`Error::CaptureStart`] when the thread cannot be created.
pub fn spawn_capture<S>(mut pulses: S, mailbox: Arc<PulseMailbox>) -> Result<JoinHandle<()>>
where
    S: PulseSource + Send + 'static,
{
    thread::Builder::new()
        .name("pulse-capture".into())
        .spawn(move || {
            while let Some(pulse) = pulses.next_pulse() {
                if mailbox.is_closed() {
                    debug!("mailbox closed; stopping capture");
                    return;
                }
                mailbox.publish(pulse);
            }
            debug!("pulse source ended; closing mailbox");
            mailbox.close();
        })
        .map_err(Error::CaptureStart)
}
