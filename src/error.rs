use thiserror::Error;

/// Errors surfaced by [crate::EphemeralPrinter].
///
/// Request errors (`Validation`, `ConfigurationMissing`) are returned from the call that
/// caused them, before anything is queued. `Sink` and `WorkerPanicked` come out of the
/// background worker and are reported by [crate::EphemeralPrinter::wait].
#[derive(Debug, Error)]
pub enum TempPrintError {
    /// A value handed to the printer can't be used, e.g. a negative duration or an
    /// ephemeral text containing a line break.
    #[error("invalid value: {0}")]
    Validation(String),

    /// An ephemeral print had no duration and no default was configured.
    #[error(
        "no display duration: pass one with the print or set a default \
         with set_default_display_duration"
    )]
    ConfigurationMissing,

    /// Writing to the output sink failed; the display cycle was abandoned.
    #[error("failed to write to output sink: {0}")]
    Sink(#[from] std::io::Error),

    #[error("failed to start display worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("display worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, TempPrintError>;
