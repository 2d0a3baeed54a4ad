//! Error types for the scheduler and driver layers.

use thiserror::Error;

/// Errors raised by the queue optimizer and parallel scheduler.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No idle printer can fit the job (build volume or material constraint).
    #[error("job does not fit any idle printer: {0}")]
    Unfit(String),

    /// A job or printer identifier was not recognized.
    #[error("not found: {0}")]
    NotFound(String),

    /// A status transition was attempted that the state machine forbids.
    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// The job's current status.
        from: crate::job::JobStatus,
        /// The rejected target status.
        to: crate::job::JobStatus,
    },

    /// Catch-all for unexpected failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors raised by a [`crate::driver::PrinterDriver`] implementation.
///
/// Mirrors the `{FileNotFound, ConnectionError, ValueError}` triad from the
/// spec's driver interface.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DriverError {
    /// The G-code file to upload does not exist.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The driver could not reach (or lost its connection to) the printer.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// An argument was out of range or otherwise invalid (e.g. a temperature
    /// outside the printer's supported envelope).
    #[error("invalid value: {0}")]
    InvalidValue(String),

    /// A bounded wait on the printer elapsed.
    #[error("timeout")]
    Timeout,

    /// Catch-all for unexpected failures.
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}
