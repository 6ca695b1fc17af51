//! Runtime tuning for the decoding engine.
//!
//! The width bands, phase windows, and signal-quality thresholds are all
//! heuristics matched to the WWVB amplitude broadcast; they are parameters
//! here rather than compile-time constants so a receiver with a slow AGC or
//! a noisy front end can be accommodated without rebuilding.

use serde::{Deserialize, Serialize};

/// Inclusive pulse-width band in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub min_ms: u32,
    pub max_ms: u32,
}

impl Band {
    #[must_use]
    pub const fn new(min_ms: u32, max_ms: u32) -> Self {
        Band { min_ms, max_ms }
    }

    #[must_use]
    pub fn contains(&self, width_ms: u32) -> bool {
        width_ms >= self.min_ms && width_ms <= self.max_ms
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pulses narrower than this are dropped as noise before classification.
    pub min_pulse_ms: u32,
    /// Widths accepted as a zero bit (nominal 200 ms).
    pub zero_band: Band,
    /// Widths accepted as a one bit (nominal 500 ms).
    pub one_band: Band,
    /// Widths accepted as a frame marker (nominal 800 ms).
    pub marker_band: Band,
    /// Maximum deviation of an inter-edge interval from one second for a bit
    /// to count as phase-valid.
    pub phase_window_ms: u32,
    /// Maximum offset of a data bit from its nominal second within the
    /// minute frame.
    pub tolerance_ms: u32,
    /// Number of inter-edge intervals kept for the signal-quality estimate.
    pub snr_window: usize,
    /// Bucket limits for `|1000 - mean interval|`, best quality first.
    pub snr_buckets: [u32; 3],
    /// Base delay between top-of-minute and the seconds resync.
    pub resync_base_ms: u32,
    /// Poll interval while waiting on the pulse mailbox.
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_pulse_ms: 150,
            zero_band: Band::new(150, 230),
            one_band: Band::new(450, 530),
            marker_band: Band::new(650, 830),
            phase_window_ms: 50,
            tolerance_ms: 25,
            snr_window: 30,
            snr_buckets: [100, 400, 700],
            resync_base_ms: 205,
            poll_interval_ms: 1,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_tolerance_ms(mut self, tolerance_ms: u32) -> Self {
        self.tolerance_ms = tolerance_ms;
        self
    }

    #[must_use]
    pub fn with_phase_window_ms(mut self, phase_window_ms: u32) -> Self {
        self.phase_window_ms = phase_window_ms;
        self
    }

    #[must_use]
    pub fn with_snr_window(mut self, snr_window: usize) -> Self {
        self.snr_window = snr_window;
        self
    }
}
