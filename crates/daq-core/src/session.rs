//! Session parameters, ring geometry and shared session state.
//!
//! # Geometry
//!
//! A hardware stream scans `n` channels (an inclusive [`ChannelRange`]) into a
//! ring of `capacity = points_per_channel * n` interleaved samples, where
//!
//! ```text
//! points_per_channel = max(rate * duration + 1, MIN_POINTS_PER_CHANNEL)
//! ```
//!
//! rounded up to a multiple of the board's packet size. One chunk is one row
//! across all channels (`chunk_size = capacity / points_per_channel = n`), and
//! the session is complete once `points_to_write = capacity * BUFFERS_TO_WRITE`
//! samples have been drained.
//!
//! # Shared state
//!
//! [`SessionState`] replaces module-level "scan done" and "pause" flags with
//! explicit fields. The cancel flag may be raised by any thread; each stream's
//! [`StreamProgress`] is written only by the pipeline that owns it.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppResult, DaqError};
use crate::limits::{BUFFERS_TO_WRITE, MAX_RING_SAMPLES, MIN_POINTS_PER_CHANNEL, MIN_RATE_HZ};

// =============================================================================
// Channels
// =============================================================================

/// Inclusive range of analog input channels scanned by one board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRange {
    /// First channel scanned.
    pub low: u32,
    /// Last channel scanned (inclusive).
    pub high: u32,
}

impl ChannelRange {
    /// Create a range, rejecting `low > high`.
    pub fn new(low: u32, high: u32) -> AppResult<Self> {
        if low > high {
            return Err(DaqError::Configuration(format!(
                "Invalid channel range {}..={}: low channel exceeds high channel",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    /// Number of channels in the range.
    pub fn len(&self) -> usize {
        (self.high - self.low) as usize + 1
    }

    /// Always false; a valid range holds at least one channel.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Channel numbers in scan order.
    pub fn iter(&self) -> impl Iterator<Item = u32> {
        self.low..=self.high
    }
}

impl std::fmt::Display for ChannelRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.low, self.high)
    }
}

// =============================================================================
// Session Parameters
// =============================================================================

/// How stream outputs are arranged once every stream has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Join every stream into one table on the hardware time axis.
    #[default]
    Merged,
    /// Keep one table per stream, with detached column groups split out.
    Separate,
}

impl std::str::FromStr for OutputMode {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "merged" | "one" | "single" => Ok(OutputMode::Merged),
            "separate" | "split" => Ok(OutputMode::Separate),
            other => Err(DaqError::Configuration(format!(
                "Unknown output mode '{}'. Must be one of: merged, separate",
                other
            ))),
        }
    }
}

/// Caller-supplied parameters shared by every stream of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionParams {
    /// Hardware scan rate in scans per second.
    pub rate_hz: u32,
    /// Recording duration in seconds.
    pub duration_s: u32,
    /// Output arrangement.
    pub output_mode: OutputMode,
    /// Subject or run label used in output file names.
    pub subject: String,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            rate_hz: 1000,
            duration_s: 10,
            output_mode: OutputMode::Merged,
            subject: "subject".to_string(),
        }
    }
}

impl SessionParams {
    /// Create a new builder for session parameters.
    pub fn builder() -> SessionParamsBuilder {
        SessionParamsBuilder::default()
    }

    /// Validate the parameters.
    pub fn validate(&self) -> AppResult<()> {
        if self.rate_hz < MIN_RATE_HZ {
            return Err(DaqError::Configuration(format!(
                "Rate {} Hz is below the minimum of {} Hz",
                self.rate_hz, MIN_RATE_HZ
            )));
        }

        if self.duration_s == 0 {
            return Err(DaqError::Configuration(
                "Duration must be greater than 0 seconds".to_string(),
            ));
        }

        if self.subject.trim().is_empty() {
            return Err(DaqError::Configuration(
                "Subject label must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for [`SessionParams`].
#[derive(Debug, Default)]
pub struct SessionParamsBuilder {
    params: SessionParams,
}

impl SessionParamsBuilder {
    /// Set the hardware scan rate.
    pub fn rate_hz(mut self, rate: u32) -> Self {
        self.params.rate_hz = rate;
        self
    }

    /// Set the recording duration.
    pub fn duration_s(mut self, seconds: u32) -> Self {
        self.params.duration_s = seconds;
        self
    }

    /// Set the output arrangement.
    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.params.output_mode = mode;
        self
    }

    /// Set the subject label.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.params.subject = subject.into();
        self
    }

    /// Build the parameters.
    pub fn build(self) -> AppResult<SessionParams> {
        self.params.validate()?;
        Ok(self.params)
    }
}

// =============================================================================
// Ring Geometry
// =============================================================================

/// Ring and budget sizes for one hardware stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanGeometry {
    /// Channels per row.
    pub n_channels: usize,
    /// Rows the ring can hold.
    pub points_per_channel: usize,
    /// Ring capacity in samples.
    pub capacity: usize,
    /// Samples per emitted chunk (one row).
    pub chunk_size: usize,
    /// Samples drained before the stream is complete.
    pub points_to_write: u64,
}

impl ScanGeometry {
    /// Compute the geometry for `rate_hz` over `duration_s` seconds.
    ///
    /// `packet_size` is the board's transfer granularity in points per channel;
    /// `1` means unconstrained.
    pub fn compute(
        rate_hz: u32,
        duration_s: u32,
        channels: ChannelRange,
        packet_size: usize,
    ) -> AppResult<Self> {
        if packet_size == 0 {
            return Err(DaqError::Configuration(
                "Packet size must be at least 1".to_string(),
            ));
        }

        let requested = u64::from(rate_hz) * u64::from(duration_s) + 1;
        let mut points_per_channel = usize::try_from(requested)
            .map_err(|_| DaqError::AllocationFailed {
                requested: usize::MAX,
            })?
            .max(MIN_POINTS_PER_CHANNEL);

        if packet_size != 1 {
            let remainder = points_per_channel % packet_size;
            if remainder != 0 {
                points_per_channel += packet_size - remainder;
            }
        }

        let n_channels = channels.len();
        let capacity = points_per_channel
            .checked_mul(n_channels)
            .filter(|&c| c <= MAX_RING_SAMPLES)
            .ok_or(DaqError::AllocationFailed {
                requested: points_per_channel.saturating_mul(n_channels),
            })?;

        let geometry = Self {
            n_channels,
            points_per_channel,
            capacity,
            chunk_size: capacity / points_per_channel,
            points_to_write: (capacity * BUFFERS_TO_WRITE) as u64,
        };
        debug!(
            n_channels,
            points_per_channel,
            capacity,
            packet_size,
            "Computed scan geometry"
        );
        Ok(geometry)
    }

    /// Rows written once the budget is drained.
    pub fn rows(&self) -> u64 {
        self.points_to_write / self.chunk_size as u64
    }
}

// =============================================================================
// Shared Session State
// =============================================================================

/// Lifecycle of one stream within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamStatus {
    /// Registered, setup not finished.
    Pending = 0,
    /// Setup finished, waiting at the start barrier.
    Ready = 1,
    /// Past the barrier, collecting.
    Running = 2,
    /// Sample budget reached.
    Complete = 3,
    /// Stopped with an error.
    Failed = 4,
    /// Stopped because the session was cancelled.
    Cancelled = 5,
}

impl StreamStatus {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => StreamStatus::Pending,
            1 => StreamStatus::Ready,
            2 => StreamStatus::Running,
            3 => StreamStatus::Complete,
            4 => StreamStatus::Failed,
            _ => StreamStatus::Cancelled,
        }
    }

    /// True once the stream will not change status again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamStatus::Complete | StreamStatus::Failed | StreamStatus::Cancelled
        )
    }
}

/// Progress of one stream, written by its pipeline and read by anyone.
#[derive(Debug)]
pub struct StreamProgress {
    name: String,
    status: AtomicU8,
    rows: AtomicU64,
}

impl StreamProgress {
    fn new(name: String) -> Self {
        Self {
            name,
            status: AtomicU8::new(StreamStatus::Pending as u8),
            rows: AtomicU64::new(0),
        }
    }

    /// Stream name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status.
    pub fn status(&self) -> StreamStatus {
        StreamStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Record a new status.
    pub fn set_status(&self, status: StreamStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Rows written so far.
    pub fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    /// Count one more row written.
    pub fn add_row(&self) {
        self.rows.fetch_add(1, Ordering::Relaxed);
    }
}

/// Session-wide state shared by all pipelines.
#[derive(Debug, Default)]
pub struct SessionState {
    cancelled: AtomicBool,
    streams: RwLock<Vec<Arc<StreamProgress>>>,
}

impl SessionState {
    /// Create a shared, uncancelled session state.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a stream and get its progress handle.
    pub fn register(&self, name: impl Into<String>) -> Arc<StreamProgress> {
        let progress = Arc::new(StreamProgress::new(name.into()));
        self.streams.write().push(Arc::clone(&progress));
        progress
    }

    /// Raise the cancel flag. Idempotent.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            warn!("Session cancellation requested");
        }
    }

    /// True once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` if the session was cancelled.
    pub fn check_cancelled(&self) -> AppResult<()> {
        if self.is_cancelled() {
            Err(DaqError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Snapshot of `(name, status, rows)` for every registered stream.
    pub fn snapshot(&self) -> Vec<(String, StreamStatus, u64)> {
        self.streams
            .read()
            .iter()
            .map(|p| (p.name().to_string(), p.status(), p.rows()))
            .collect()
    }

    /// True when every registered stream is complete.
    pub fn is_complete(&self) -> bool {
        let streams = self.streams.read();
        !streams.is_empty() && streams.iter().all(|p| p.status() == StreamStatus::Complete)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_range() {
        let range = ChannelRange::new(0, 6).unwrap();
        assert_eq!(range.len(), 7);
        assert_eq!(range.iter().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5, 6]);
        assert!(ChannelRange::new(3, 2).is_err());
    }

    #[test]
    fn test_params_builder() {
        let params = SessionParams::builder()
            .rate_hz(1000)
            .duration_s(2)
            .output_mode(OutputMode::Separate)
            .subject("J Doe (F)")
            .build()
            .unwrap();
        assert_eq!(params.rate_hz, 1000);
        assert_eq!(params.output_mode, OutputMode::Separate);
    }

    #[test]
    fn test_params_validation() {
        assert!(SessionParams::builder().rate_hz(199).build().is_err());
        assert!(SessionParams::builder().rate_hz(200).build().is_ok());
        assert!(SessionParams::builder().duration_s(0).build().is_err());
        assert!(SessionParams::builder().subject("  ").build().is_err());
    }

    #[test]
    fn test_output_mode_parse() {
        assert_eq!("merged".parse::<OutputMode>().unwrap(), OutputMode::Merged);
        assert_eq!("Separate".parse::<OutputMode>().unwrap(), OutputMode::Separate);
        assert!("both".parse::<OutputMode>().is_err());
    }

    #[test]
    fn test_geometry_concrete_scenario() {
        let range = ChannelRange::new(0, 6).unwrap();
        let g = ScanGeometry::compute(1000, 2, range, 1).unwrap();
        assert_eq!(g.points_per_channel, 2001);
        assert_eq!(g.capacity, 2001 * 7);
        assert_eq!(g.chunk_size, 7);
        assert_eq!(g.points_to_write, (2001 * 7) as u64);
        assert_eq!(g.rows(), 2001);
    }

    #[test]
    fn test_geometry_packet_rounding() {
        let range = ChannelRange::new(0, 1).unwrap();
        let g = ScanGeometry::compute(1000, 2, range, 256).unwrap();
        assert_eq!(g.points_per_channel, 2048);
        assert_eq!(g.capacity % g.chunk_size, 0);
        assert_eq!(g.chunk_size, 2);
        assert_eq!(g.rows(), 2048);
    }

    #[test]
    fn test_geometry_minimum_points() {
        let range = ChannelRange::new(0, 0).unwrap();
        let g = ScanGeometry::compute(1, 1, range, 1).unwrap();
        assert_eq!(g.points_per_channel, MIN_POINTS_PER_CHANNEL);
    }

    #[test]
    fn test_geometry_rejects_zero_packet() {
        let range = ChannelRange::new(0, 0).unwrap();
        assert!(ScanGeometry::compute(1000, 1, range, 0).is_err());
    }

    #[test]
    fn test_session_state_cancel_and_progress() {
        let state = SessionState::new();
        let six = state.register("six");
        let flex = state.register("flex");
        assert!(!state.is_complete());
        assert!(state.check_cancelled().is_ok());

        six.set_status(StreamStatus::Complete);
        six.add_row();
        flex.set_status(StreamStatus::Complete);
        assert!(state.is_complete());

        state.cancel();
        state.cancel();
        assert!(matches!(state.check_cancelled(), Err(DaqError::Cancelled)));

        let snapshot = state.snapshot();
        assert_eq!(snapshot[0], ("six".to_string(), StreamStatus::Complete, 1));
    }
}
