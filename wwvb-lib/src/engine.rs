//! Engine wiring.
//!
//! Three long-lived workers cooperate: pulse capture publishes measured
//! pulses into the mailbox, the signal pipeline turns them into committed
//! calendar time, and the clock store worker services the chip. Short-lived
//! scratch threads handle the top-of-minute seconds resync so the pipeline
//! never waits on the bus.

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use tracing::{debug, info, span, warn, Level};

use crate::{
    classify::{BitClassifier, SnrWindow},
    config::Config,
    decode::{self, DecodedTime},
    frame,
    pulse::{spawn_capture, MailboxSource, PulseMailbox, PulseSource},
    store::ClockStore,
    sync::{self, MinuteContext},
    Error, Result,
};

/// Builds and starts the decoding engine.
///
/// # Examples
/// ```no_run
/// use wwvb::{engine::Engine, store::{ClockStore, MemRtc}, pulse::Pulse};
///
/// let store = ClockStore::new(Box::new(MemRtc::new()))?;
/// let store_worker = store.start()?;
/// let pulses: Vec<Pulse> = Vec::new(); // hardware capture goes here
/// let engine = Engine::new().start(pulses.into_iter(), store)?;
/// for minute in engine.minutes().iter() {
///     println!("{:02}:{:02} UTC", minute.hour, minute.minute);
/// }
/// # Ok::<(), wwvb::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct Engine {
    config: Config,
}

impl Engine {
    const MINUTE_BUFFER: usize = 16;

    #[must_use]
    pub fn new() -> Self {
        Engine {
            config: Config::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Start the engine against a pulse source and a clock store whose
    /// worker is already running.
    ///
    /// Decoded minutes are delivered on the returned handle's channel; the
    /// engine runs until the pulse source ends.
    ///
    /// # Errors
    /// [`Error::CaptureStart`] or [`Error::WorkerSpawn`] when a worker
    /// thread cannot be created.
    pub fn start<S>(self, pulses: S, store: Arc<ClockStore>) -> Result<EngineHandle>
    where
        S: PulseSource + Send + 'static,
    {
        let mailbox = PulseMailbox::new();
        let capture = spawn_capture(pulses, mailbox.clone())?;

        let snr = Arc::new(Mutex::new(SnrWindow::new(
            self.config.snr_window,
            self.config.snr_buckets,
        )));
        let source = MailboxSource::new(mailbox.clone(), self.config.poll_interval_ms);
        let mut bits = BitClassifier::with_snr(source, self.config.clone(), snr.clone());

        let (tx, rx) = bounded(Self::MINUTE_BUFFER);
        let config = self.config;
        let pipeline = thread::Builder::new()
            .name("signal-pipeline".into())
            .spawn(move || {
                let zult = run_pipeline(&mut bits, &store, &config, &tx);
                // on a fatal error all other work must cease; closing the
                // mailbox stops the capture worker at its next pulse
                mailbox.close();
                zult
            })
            .map_err(|source| Error::WorkerSpawn {
                name: "signal-pipeline",
                source,
            })?;

        Ok(EngineHandle {
            capture,
            pipeline,
            minutes: rx,
            snr,
        })
    }
}

fn run_pipeline<S>(
    bits: &mut BitClassifier<S>,
    store: &Arc<ClockStore>,
    config: &Config,
    minutes: &Sender<DecodedTime>,
) -> Result<()>
where
    S: PulseSource,
{
    let mut ctx = MinuteContext::default();

    while let Some(minute_start) = sync::acquire(bits, &ctx) {
        // the leap-second insertion applies to one boundary only
        ctx.leap_second = false;

        let minute_span = span!(Level::DEBUG, "minute", start = minute_start);
        let _guard = minute_span.enter();

        // scratch worker; collection continues while it sleeps out its delay
        let _resync = sync::schedule_resync(store.clone(), &ctx, config)?;

        let raw = match frame::collect_frame(bits, minute_start, config) {
            Ok(raw) => raw,
            Err(defect) => {
                debug!(%defect, "frame abandoned, searching again");
                continue;
            }
        };

        match decode::decode(&raw) {
            Ok(decoded) => {
                let Some(calendar) = decoded.to_calendar() else {
                    warn!("decoded day-of-year does not map to a date");
                    continue;
                };
                if let Err(err) = store.commit(&calendar, decoded.dst) {
                    warn!("commit failed: {err}");
                    continue;
                }
                ctx = MinuteContext::after_decode(&decoded);
                info!(
                    hour = decoded.hour,
                    minute = decoded.minute,
                    doy = decoded.day_of_year,
                    "minute decoded"
                );
                if minutes.send(decoded).is_err() {
                    debug!("minute receiver dropped");
                }
            }
            Err(defect) => warn!(%defect, "frame rejected"),
        }
    }

    debug!("pulse stream ended");
    Ok(())
}

/// A running engine: worker handles plus the decoded-minute channel.
pub struct EngineHandle {
    capture: JoinHandle<()>,
    pipeline: JoinHandle<Result<()>>,
    minutes: Receiver<DecodedTime>,
    snr: Arc<Mutex<SnrWindow>>,
}

impl EngineHandle {
    /// Channel of successfully decoded minutes.
    #[must_use]
    pub fn minutes(&self) -> &Receiver<DecodedTime> {
        &self.minutes
    }

    /// Coarse 0-3 signal quality from the inter-edge window.
    #[must_use]
    pub fn signal_quality(&self) -> u8 {
        self.snr.lock().expect("snr window poisoned").quality()
    }

    /// Wait for the pipeline to finish and the capture worker to wind down.
    ///
    /// The pipeline is joined first: a fatal error surfaces as soon as it
    /// halts, and its closed mailbox stops the capture worker at the next
    /// pulse rather than leaving it publishing forever.
    ///
    /// # Errors
    /// The pipeline's fatal error when it halted early.
    pub fn join(self) -> Result<()> {
        let zult = self
            .pipeline
            .join()
            .expect("signal pipeline thread panicked");
        self.capture
            .join()
            .expect("pulse capture thread panicked");
        zult
    }
}
