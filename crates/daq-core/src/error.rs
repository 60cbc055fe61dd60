//! Error types for continuous acquisition sessions.
//!
//! `DaqError` is the single error type shared by every crate in the workspace.
//! Collaborator drivers (hardware sources, serial links, storage backends)
//! report their own failures and convert them into `DaqError` at the crate
//! boundary, the same way a driver maps its native status codes into a
//! [`DriverError`].
//!
//! ## Error Classes
//!
//! - **Setup failures** (`DeviceUnavailable`, `PortUnavailable`, `AllocationFailed`):
//!   raised before any data is collected. Fatal for the session.
//! - **Data-path failures** (`Overrun`, `SourceStopped`, `MalformedSampleCount`):
//!   raised while or right after collecting. Fatal, never retried; any rows already
//!   written stay on disk as a truncated prefix.
//! - **Coordination** (`Cancelled`, `BarrierAborted`, `StreamFailed`): how a failure in
//!   one stream is propagated to, and reported by, the others.
//!
//! Nothing in this crate attempts partial recovery. A session that fails is re-run.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Driver Errors
// =============================================================================

/// Category of a collaborator driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Device or port could not be opened.
    Initialization,
    /// Driver rejected the requested parameters.
    Configuration,
    /// Link-level failure after opening.
    Communication,
    /// Device reported a fault.
    Hardware,
    /// Operation did not complete in time.
    Timeout,
    /// Buffer or handle allocation failed.
    Allocation,
    /// Anything else.
    Unknown,
}

impl std::fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DriverErrorKind::Initialization => "initialization",
            DriverErrorKind::Configuration => "configuration",
            DriverErrorKind::Communication => "communication",
            DriverErrorKind::Hardware => "hardware",
            DriverErrorKind::Timeout => "timeout",
            DriverErrorKind::Allocation => "allocation",
            DriverErrorKind::Unknown => "unknown",
        };
        write!(f, "{}", label)
    }
}

/// A failure reported by a collaborator driver.
#[derive(Error, Debug, Clone)]
#[error("Driver '{driver_type}' {kind} error: {message}")]
pub struct DriverError {
    /// Driver name, e.g. `"mock-ring"` or `"serialport"`.
    pub driver_type: String,
    /// Failure category.
    pub kind: DriverErrorKind,
    /// Human readable detail.
    pub message: String,
}

impl DriverError {
    /// Build a driver error.
    pub fn new(
        driver_type: impl Into<String>,
        kind: DriverErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            driver_type: driver_type.into(),
            kind,
            message: message.into(),
        }
    }
}

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Primary error type for acquisition sessions.
#[derive(Error, Debug)]
pub enum DaqError {
    /// The producer overwrote samples the drainer had not copied yet.
    ///
    /// `produced - consumed` exceeded the ring capacity, either before a copy or
    /// when re-checked right after one. The chunk in flight is discarded.
    #[error(
        "Buffer overrun on stream '{stream}': produced {produced}, consumed {consumed}, capacity {capacity}"
    )]
    Overrun {
        /// Stream that overran.
        stream: String,
        /// Producer count observed.
        produced: u64,
        /// Samples consumed so far.
        consumed: u64,
        /// Ring capacity in samples.
        capacity: usize,
    },

    /// Acquisition device missing, busy, or unable to scan as requested.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Serial port could not be opened or configured.
    #[error("Serial port '{port}' unavailable: {reason}")]
    PortUnavailable {
        /// Port name, e.g. `COM3` or `/dev/ttyACM0`.
        port: String,
        /// Reason reported by the OS or driver.
        reason: String,
    },

    /// The ring buffer could not be allocated.
    #[error("Failed to allocate a ring buffer of {requested} samples")]
    AllocationFailed {
        /// Requested capacity in samples.
        requested: usize,
    },

    /// The serial sensor delivered an unexpected number of lines for the duration.
    #[error("Sensor produced {actual} samples, expected {expected}; run the scan again")]
    MalformedSampleCount {
        /// Samples expected for the requested duration.
        expected: usize,
        /// Samples actually read.
        actual: usize,
    },

    /// The producer stopped before the sample budget was consumed.
    #[error("Source for stream '{stream}' stopped after {consumed} of {expected} samples")]
    SourceStopped {
        /// Stream whose source stopped.
        stream: String,
        /// Samples consumed.
        consumed: u64,
        /// Samples budgeted.
        expected: u64,
    },

    /// Configuration validation failed.
    ///
    /// Values parsed correctly but are not usable (rate below the polling
    /// minimum, zero duration, label count not matching the channel range).
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),

    /// The session-wide cancel flag was raised.
    #[error("Acquisition cancelled")]
    Cancelled,

    /// The start barrier was torn down before every stream arrived.
    #[error("Start barrier aborted before all streams were ready")]
    BarrierAborted,

    /// A named stream failed; wraps the underlying cause.
    #[error("Stream '{stream}' failed: {source}")]
    StreamFailed {
        /// Name of the failing stream.
        stream: String,
        /// Underlying cause.
        #[source]
        source: Box<DaqError>,
    },

    /// A collaborator driver failed.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Output table could not be written or read back.
    #[error("Storage error at {}: {message}", path.display())]
    Storage {
        /// File involved.
        path: PathBuf,
        /// Detail from the storage backend.
        message: String,
    },

    /// Standard I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Figment(Box::new(err))
    }
}

impl DaqError {
    /// Wrap `self` with the name of the stream it came from.
    ///
    /// Already-wrapped errors are returned unchanged so the innermost stream
    /// name is the one reported.
    pub fn in_stream(self, stream: impl Into<String>) -> Self {
        match self {
            wrapped @ DaqError::StreamFailed { .. } => wrapped,
            other => DaqError::StreamFailed {
                stream: stream.into(),
                source: Box::new(other),
            },
        }
    }

    /// Name of the failed stream, if this error carries one.
    pub fn stream_name(&self) -> Option<&str> {
        match self {
            DaqError::StreamFailed { stream, .. }
            | DaqError::Overrun { stream, .. }
            | DaqError::SourceStopped { stream, .. } => Some(stream),
            _ => None,
        }
    }

    /// The error with any `StreamFailed` wrapping removed.
    pub fn root(&self) -> &DaqError {
        match self {
            DaqError::StreamFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for failures raised during setup, before any data was collected.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self.root(),
            DaqError::DeviceUnavailable(_)
                | DaqError::PortUnavailable { .. }
                | DaqError::AllocationFailed { .. }
                | DaqError::Driver(_)
        )
    }

    /// True when this error is only a consequence of another stream failing.
    ///
    /// The coordinator prefers reporting a primary cause over these.
    pub fn is_secondary(&self) -> bool {
        matches!(self.root(), DaqError::Cancelled | DaqError::BarrierAborted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::Configuration("rate must be at least 200".to_string());
        assert!(err.to_string().contains("rate must be at least 200"));
    }

    #[test]
    fn test_overrun_display_names_stream() {
        let err = DaqError::Overrun {
            stream: "Chest Strap Piezos".to_string(),
            produced: 40,
            consumed: 4,
            capacity: 16,
        };
        let msg = err.to_string();
        assert!(msg.contains("Chest Strap Piezos"));
        assert!(msg.contains("capacity 16"));
    }

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::new("mock-ring", DriverErrorKind::Hardware, "fault 7");
        assert_eq!(err.to_string(), "Driver 'mock-ring' hardware error: fault 7");
    }

    #[test]
    fn test_in_stream_keeps_innermost_name() {
        let err = DaqError::Cancelled.in_stream("flex").in_stream("outer");
        assert_eq!(err.stream_name(), Some("flex"));
        assert!(matches!(err.root(), DaqError::Cancelled));
    }

    #[test]
    fn test_setup_and_secondary_classification() {
        let setup = DaqError::AllocationFailed { requested: 14_007 }.in_stream("six");
        assert!(setup.is_setup_failure());
        assert!(!setup.is_secondary());

        let aborted = DaqError::BarrierAborted.in_stream("two");
        assert!(aborted.is_secondary());
        assert!(!aborted.is_setup_failure());
    }
}
