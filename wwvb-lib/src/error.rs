#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The pulse capture worker could not be started.
    #[error("pulse capture unavailable")]
    CaptureStart(#[source] std::io::Error),

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} worker")]
    WorkerSpawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The RTC chip did not respond at startup.
    #[error("RTC hardware absent")]
    RtcAbsent,

    /// An RTC transaction failed after startup.
    #[error("RTC transaction failed: {0}")]
    Rtc(String),

    /// The clock store worker is no longer servicing its mailbox.
    #[error("clock store worker is not running")]
    StoreStopped,
}

pub type Result<T> = std::result::Result<T, Error>;
