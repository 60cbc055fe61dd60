//! Shared constants for acquisition sessions.
//!
//! This module centralizes:
//! - Rate and duration bounds accepted from the caller
//! - Polling and timeout durations used by the drain loop and serial reader
//! - Ring geometry floors
//!
//! Keeping them here keeps the hardware pipeline, the sensor pipeline and
//! the command-line front end in agreement.

use std::time::Duration;

// =============================================================================
// Rate Limits
// =============================================================================

/// Lowest hardware scan rate accepted (scans per second).
///
/// Below this the 100 ms poll interval no longer drains at least one row
/// per poll with margin, and the sparse sensor join degenerates.
pub const MIN_RATE_HZ: u32 = 200;

/// Native line rate of the serial flex sensor (lines per second).
pub const DEFAULT_SENSOR_RATE_HZ: u32 = 100;

/// Default serial baud rate of the flex sensor.
pub const DEFAULT_SENSOR_BAUD: u32 = 115_200;

// =============================================================================
// Timing
// =============================================================================

/// Sleep between drain polls when less than one chunk is available.
pub const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Read timeout applied to serial sensor links.
pub const SERIAL_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a hardware source may take to report running after `start`.
pub const SOURCE_START_TIMEOUT: Duration = Duration::from_secs(5);

/// Default limit on how long a stream waits at the start barrier.
pub const BARRIER_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum lines discarded while waiting for the sensor's startup line.
pub const MAX_STARTUP_LINES: usize = 10_000;

// =============================================================================
// Geometry
// =============================================================================

/// Minimum points per channel allocated for a ring, regardless of duration.
pub const MIN_POINTS_PER_CHANNEL: usize = 10;

/// Number of full rings written before a session is complete.
pub const BUFFERS_TO_WRITE: usize = 1;

/// Largest ring accepted, in samples (about 1 GiB of `f64`).
pub const MAX_RING_SAMPLES: usize = 128 * 1024 * 1024;
