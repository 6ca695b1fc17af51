//! Bit classification.
//!
//! Each second the station drops its carrier for one of three nominal
//! durations: 200 ms encodes a zero, 500 ms a one, and 800 ms a frame
//! marker. [`BitClassifier`] consumes measured pulses, maps widths onto
//! symbols, and tracks inter-edge timing both for the per-bit phase check
//! and for the coarse signal-quality estimate.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::trace;

use crate::{
    config::Config,
    pulse::{PulseSource, Ticks},
};

/// Decoded symbol for one received pulse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Symbol {
    Zero,
    One,
    Marker,
    /// Width matched no band.
    Invalid,
}

impl Symbol {
    #[must_use]
    pub fn is_marker(&self) -> bool {
        *self == Symbol::Marker
    }

    /// True for symbols that carry a frame bit value.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self, Symbol::Zero | Symbol::One)
    }
}

/// Classify a pulse width against the configured bands.
#[must_use]
pub fn classify_width(width_ms: u32, config: &Config) -> Symbol {
    if config.zero_band.contains(width_ms) {
        Symbol::Zero
    } else if config.one_band.contains(width_ms) {
        Symbol::One
    } else if config.marker_band.contains(width_ms) {
        Symbol::Marker
    } else {
        Symbol::Invalid
    }
}

/// Ring of the most recent inter-edge intervals.
///
/// A clean signal spaces leading edges exactly one second apart, so the mean
/// interval's distance from 1000 ms is a cheap quality proxy. The window
/// reduces to a 0-3 bar for display.
#[derive(Debug)]
pub struct SnrWindow {
    intervals: Vec<u32>,
    next: usize,
    capacity: usize,
    buckets: [u32; 3],
}

impl SnrWindow {
    #[must_use]
    pub fn new(capacity: usize, buckets: [u32; 3]) -> Self {
        let capacity = capacity.max(1);
        SnrWindow {
            intervals: Vec::with_capacity(capacity),
            next: 0,
            capacity,
            buckets,
        }
    }

    /// Record the interval between two consecutive leading edges.
    pub fn push(&mut self, interval_ms: u32) {
        if self.intervals.len() < self.capacity {
            self.intervals.push(interval_ms);
        } else {
            self.intervals[self.next] = interval_ms;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    /// Mean of the recorded intervals, or `None` before the first edge pair.
    #[must_use]
    pub fn mean_ms(&self) -> Option<u32> {
        if self.intervals.is_empty() {
            return None;
        }
        let sum: u64 = self.intervals.iter().map(|v| u64::from(*v)).sum();
        Some((sum / self.intervals.len() as u64) as u32)
    }

    /// Coarse signal quality, 0 (unusable) to 3 (clean).
    #[must_use]
    pub fn quality(&self) -> u8 {
        let Some(mean) = self.mean_ms() else {
            return 0;
        };
        let deviation = mean.abs_diff(1000);
        if deviation <= self.buckets[0] {
            3
        } else if deviation <= self.buckets[1] {
            2
        } else if deviation <= self.buckets[2] {
            1
        } else {
            0
        }
    }
}

/// One classified bit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ClassifiedBit {
    pub symbol: Symbol,
    /// Leading-edge time; `None` when the width matched no band.
    pub edge: Option<Ticks>,
    /// The leading edge landed within the phase window of one second past
    /// the previous edge.
    pub phase_valid: bool,
}

/// Turns raw pulses into classified bits.
///
/// Pulses narrower than the configured noise floor are dropped without
/// touching the edge history; everything else updates the quality window
/// and the previous-edge reference, including invalid symbols.
pub struct BitClassifier<S> {
    source: S,
    config: Config,
    prev_edge: Option<Ticks>,
    snr: Arc<Mutex<SnrWindow>>,
}

impl<S> BitClassifier<S>
where
    S: PulseSource,
{
    #[must_use]
    pub fn new(source: S, config: Config) -> Self {
        let snr = Arc::new(Mutex::new(SnrWindow::new(
            config.snr_window,
            config.snr_buckets,
        )));
        Self::with_snr(source, config, snr)
    }

    /// Build against an externally shared quality window so diagnostics can
    /// read it while the pipeline runs.
    #[must_use]
    pub fn with_snr(source: S, config: Config, snr: Arc<Mutex<SnrWindow>>) -> Self {
        BitClassifier {
            source,
            config,
            prev_edge: None,
            snr,
        }
    }

    /// Handle on the shared quality window.
    #[must_use]
    pub fn snr(&self) -> Arc<Mutex<SnrWindow>> {
        self.snr.clone()
    }

    /// The next classified bit, or `None` when the pulse stream has ended.
    ///
    /// Blocks on the underlying source. The first pulse after startup has no
    /// edge to be measured against and is never phase-valid.
    pub fn next_bit(&mut self) -> Option<ClassifiedBit> {
        loop {
            let pulse = self.source.next_pulse()?;
            if pulse.width_ms < self.config.min_pulse_ms {
                trace!(width_ms = pulse.width_ms, "noise pulse dropped");
                continue;
            }

            let symbol = classify_width(pulse.width_ms, &self.config);
            let interval = self
                .prev_edge
                .map(|prev| pulse.edge.saturating_sub(prev).min(u64::from(u32::MAX)) as u32);
            if let Some(interval) = interval {
                self.snr
                    .lock()
                    .expect("snr window poisoned")
                    .push(interval);
            }

            let phase_valid = symbol != Symbol::Invalid
                && interval
                    .map(|ms| ms.abs_diff(1000) <= self.config.phase_window_ms)
                    .unwrap_or(false);
            self.prev_edge = Some(pulse.edge);

            let edge = (symbol != Symbol::Invalid).then_some(pulse.edge);
            return Some(ClassifiedBit {
                symbol,
                edge,
                phase_valid,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::Pulse;

    fn bits_for(pulses: Vec<Pulse>) -> Vec<ClassifiedBit> {
        let mut classifier = BitClassifier::new(pulses.into_iter(), Config::default());
        let mut bits = Vec::new();
        while let Some(bit) = classifier.next_bit() {
            bits.push(bit);
        }
        bits
    }

    #[test]
    fn widths_classify_per_band_table() {
        let config = Config::default();
        let cases = [
            (150, Symbol::Zero),
            (230, Symbol::Zero),
            (231, Symbol::Invalid),
            (449, Symbol::Invalid),
            (450, Symbol::One),
            (530, Symbol::One),
            (531, Symbol::Invalid),
            (649, Symbol::Invalid),
            (650, Symbol::Marker),
            (830, Symbol::Marker),
            (831, Symbol::Invalid),
        ];
        for (width, expected) in cases {
            assert_eq!(
                classify_width(width, &config),
                expected,
                "width {width} ms"
            );
        }
    }

    #[test]
    fn first_bit_is_never_phase_valid() {
        let bits = bits_for(vec![Pulse {
            edge: 5000,
            width_ms: 800,
        }]);
        assert_eq!(bits[0].symbol, Symbol::Marker);
        assert!(!bits[0].phase_valid);
    }

    #[test]
    fn phase_window_is_inclusive_at_fifty_ms() {
        let bits = bits_for(vec![
            Pulse {
                edge: 0,
                width_ms: 200,
            },
            Pulse {
                edge: 1050,
                width_ms: 500,
            },
            Pulse {
                edge: 2101,
                width_ms: 500,
            },
        ]);
        assert!(bits[1].phase_valid, "+50 ms must pass");
        assert!(!bits[2].phase_valid, "+51 ms must fail");
    }

    #[test]
    fn noise_pulses_are_dropped_without_moving_the_edge_reference() {
        let bits = bits_for(vec![
            Pulse {
                edge: 0,
                width_ms: 200,
            },
            Pulse {
                edge: 400,
                width_ms: 100,
            },
            Pulse {
                edge: 1000,
                width_ms: 500,
            },
        ]);
        assert_eq!(bits.len(), 2);
        assert_eq!(bits[1].symbol, Symbol::One);
        assert!(bits[1].phase_valid, "interval measured from the real edge");
    }

    #[test]
    fn invalid_symbols_carry_no_edge_and_fail_phase() {
        let bits = bits_for(vec![
            Pulse {
                edge: 0,
                width_ms: 200,
            },
            Pulse {
                edge: 1000,
                width_ms: 300,
            },
            Pulse {
                edge: 2000,
                width_ms: 500,
            },
        ]);
        assert_eq!(bits[1].symbol, Symbol::Invalid);
        assert_eq!(bits[1].edge, None);
        assert!(!bits[1].phase_valid);
        // the bad pulse still advanced the edge reference
        assert!(bits[2].phase_valid);
    }

    mod snr_window {
        use super::*;

        #[test]
        fn quality_buckets_by_mean_deviation() {
            let cases = [(1000, 3), (1100, 3), (1101, 2), (1400, 2), (1401, 1), (1700, 1), (1701, 0)];
            for (interval, expected) in cases {
                let mut window = SnrWindow::new(30, [100, 400, 700]);
                window.push(interval);
                assert_eq!(window.quality(), expected, "interval {interval}");
            }
        }

        #[test]
        fn empty_window_reports_zero_quality() {
            let window = SnrWindow::new(30, [100, 400, 700]);
            assert_eq!(window.mean_ms(), None);
            assert_eq!(window.quality(), 0);
        }

        #[test]
        fn ring_keeps_exactly_the_last_n_intervals() {
            let mut window = SnrWindow::new(3, [100, 400, 700]);
            for interval in [5000, 5000, 5000, 1000, 1000, 1000] {
                window.push(interval);
            }
            assert_eq!(window.mean_ms(), Some(1000), "old intervals evicted");
            assert_eq!(window.quality(), 3);
        }

        #[test]
        fn classifier_updates_shared_window_for_every_classified_pulse() {
            let pulses = vec![
                Pulse {
                    edge: 0,
                    width_ms: 200,
                },
                Pulse {
                    edge: 1000,
                    width_ms: 300,
                },
                Pulse {
                    edge: 2000,
                    width_ms: 800,
                },
            ];
            let mut classifier = BitClassifier::new(pulses.into_iter(), Config::default());
            let snr = classifier.snr();
            while classifier.next_bit().is_some() {}
            // two intervals recorded, including the one ending on the invalid pulse
            assert_eq!(snr.lock().unwrap().mean_ms(), Some(1000));
            assert_eq!(snr.lock().unwrap().quality(), 3);
        }
    }
}
