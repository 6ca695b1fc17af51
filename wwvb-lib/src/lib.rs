//! WWVB 60 kHz time-signal decoding.
//!
//! The Fort Collins broadcast drops its carrier once per second: a 200 ms
//! pulse encodes a zero, 500 ms a one, and 800 ms a frame marker, with a
//! full BCD time frame every minute. This crate measures those pulses,
//! classifies them, locks onto the minute boundary, accumulates and decodes
//! the frame, and disciplines an external real-time clock to broadcast UTC,
//! including the DUT1-corrected top-of-minute seconds resync.
//!
//! # Example
//! ```no_run
//! use wwvb::{engine::Engine, pulse::Pulse, store::{ClockStore, MemRtc}};
//!
//! let store = ClockStore::new(Box::new(MemRtc::new()))?;
//! let store_worker = store.start()?;
//!
//! // hardware capture yields measured pulses; a Vec stands in here
//! let pulses: Vec<Pulse> = Vec::new();
//! let engine = Engine::new().start(pulses.into_iter(), store.clone())?;
//!
//! for minute in engine.minutes().iter() {
//!     println!("{:02}:{:02} UTC, quality {}", minute.hour, minute.minute,
//!              engine.signal_quality());
//! }
//! # store.stop();
//! # Ok::<(), wwvb::Error>(())
//! ```

mod error;

pub mod calendar;
pub mod classify;
pub mod config;
pub mod decode;
pub mod dst;
pub mod engine;
pub mod frame;
pub mod pulse;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
