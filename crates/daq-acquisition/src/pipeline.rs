//! Per-stream acquisition pipelines.
//!
//! One pipeline runs per stream on its own thread. Each performs its own
//! setup (which takes unpredictable time), reports ready, waits at the shared
//! start barrier and only then collects. Setup failures therefore surface
//! before any stream records data.
//!
//! Hardware: open, start the background scan, wait until it reports running,
//! create the sink, barrier, drain.
//!
//! Sensor: open, clear input, wait for the startup line, create the sink,
//! barrier, write each line as it is read until `release + duration`, check
//! the line count.
//!
//! Sources are stopped and ports closed on every exit path, including errors.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use daq_core::config::{AcquisitionConfig, DetachGroup};
use daq_core::error::{AppResult, DaqError};
use daq_core::limits::{BARRIER_TIMEOUT, DRAIN_POLL_INTERVAL, SOURCE_START_TIMEOUT};
use daq_core::serial::SerialLink;
use daq_core::session::{
    ChannelRange, ScanGeometry, SessionParams, SessionState, StreamProgress, StreamStatus,
};
use daq_core::source::{ChunkSink, CircularSource, ScanRequest};
use daq_core::timestamp::RateTimestamper;
use daq_storage::{CsvSinkWriter, SessionNaming};
use tracing::{debug, info, warn};

use crate::barrier::StartBarrier;
use crate::drainer::{ChunkDrainer, DrainPlan};
use crate::serial_stream;

/// Opens a hardware source on the pipeline's thread.
pub type SourceOpener = Box<dyn FnOnce() -> AppResult<Box<dyn CircularSource>> + Send>;

/// Opens a serial link on the pipeline's thread.
pub type LinkOpener = Box<dyn FnOnce() -> AppResult<Box<dyn SerialLink>> + Send>;

// =============================================================================
// Stream Specs
// =============================================================================

/// A hardware board scanning into a ring.
pub struct HardwareStreamSpec {
    /// Stream name, used in file names and errors
    pub name: String,
    /// Channels scanned
    pub channels: ChannelRange,
    /// Column label per channel
    pub labels: Vec<String>,
    /// Transfer packet size in points per channel
    pub packet_size: usize,
    /// Column groups split out in separate mode
    pub detach: Vec<DetachGroup>,
    /// Source factory
    pub open: SourceOpener,
}

impl std::fmt::Debug for HardwareStreamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareStreamSpec")
            .field("name", &self.name)
            .field("channels", &self.channels)
            .field("labels", &self.labels)
            .field("packet_size", &self.packet_size)
            .finish_non_exhaustive()
    }
}

impl HardwareStreamSpec {
    /// Check labels against the channel range.
    pub fn validate(&self) -> AppResult<()> {
        if self.labels.len() != self.channels.len() {
            return Err(DaqError::Configuration(format!(
                "Stream '{}' has {} labels for {} channels",
                self.name,
                self.labels.len(),
                self.channels.len()
            )));
        }
        Ok(())
    }
}

/// A line-per-sample serial sensor.
pub struct SensorStreamSpec {
    /// Stream name
    pub name: String,
    /// Native line rate
    pub rate_hz: u32,
    /// Line printed once the sensor is ready
    pub startup_line: String,
    /// Output column label
    pub column_label: String,
    /// Link factory
    pub open: LinkOpener,
}

impl std::fmt::Debug for SensorStreamSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorStreamSpec")
            .field("name", &self.name)
            .field("rate_hz", &self.rate_hz)
            .field("column_label", &self.column_label)
            .finish_non_exhaustive()
    }
}

/// Timeouts and pacing shared by every pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineTiming {
    /// Drain sleep when less than a chunk is available
    pub poll_interval: Duration,
    /// Limit on a source reaching running after start
    pub source_start_timeout: Duration,
    /// Limit on waiting for the other streams at the barrier
    pub barrier_timeout: Duration,
}

impl Default for PipelineTiming {
    fn default() -> Self {
        Self {
            poll_interval: DRAIN_POLL_INTERVAL,
            source_start_timeout: SOURCE_START_TIMEOUT,
            barrier_timeout: BARRIER_TIMEOUT,
        }
    }
}

impl From<&AcquisitionConfig> for PipelineTiming {
    fn from(config: &AcquisitionConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.drain.poll_interval_ms),
            source_start_timeout: Duration::from_millis(config.drain.source_start_timeout_ms),
            barrier_timeout: Duration::from_millis(config.drain.barrier_timeout_ms),
        }
    }
}

/// What every pipeline of a session shares.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    /// Session parameters
    pub params: SessionParams,
    /// Output file naming
    pub naming: SessionNaming,
    /// Start barrier
    pub barrier: Arc<StartBarrier>,
    /// Cancel flag and progress registry
    pub session: Arc<SessionState>,
    /// Timeouts and pacing
    pub timing: PipelineTiming,
}

// =============================================================================
// Stream Output
// =============================================================================

/// Kind-specific details of a finished stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamKind {
    /// Hardware ring stream at the session rate
    Hardware {
        /// Column groups split out in separate mode
        detach: Vec<DetachGroup>,
    },
    /// Serial sensor at its own rate
    Sensor {
        /// Native line rate
        rate_hz: u32,
    },
}

/// A finished stream's intermediate table.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamOutput {
    /// Stream name
    pub name: String,
    /// Hardware or sensor
    pub kind: StreamKind,
    /// Intermediate table
    pub path: PathBuf,
    /// Data rows written
    pub rows: u64,
    /// When the barrier released this stream
    pub released_at: Instant,
    /// When the stream recorded its first sample after release
    pub first_sample_at: Option<Instant>,
}

impl StreamOutput {
    /// True for hardware streams.
    pub fn is_hardware(&self) -> bool {
        matches!(self.kind, StreamKind::Hardware { .. })
    }
}

/// Record the terminal status of a pipeline result.
fn settle<T>(progress: &StreamProgress, result: AppResult<T>) -> AppResult<T> {
    match &result {
        Ok(_) => progress.set_status(StreamStatus::Complete),
        Err(e) if e.is_secondary() => progress.set_status(StreamStatus::Cancelled),
        Err(_) => progress.set_status(StreamStatus::Failed),
    }
    result
}

// =============================================================================
// Hardware Pipeline
// =============================================================================

/// Stops the background scan when dropped.
struct ScanGuard {
    stream: String,
    source: Box<dyn CircularSource>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        match self.source.stop() {
            Ok(()) => debug!(stream = %self.stream, "Background scan stopped"),
            Err(e) => warn!(stream = %self.stream, error = %e, "Failed to stop background scan"),
        }
    }
}

fn wait_until_running(
    guard: &ScanGuard,
    timeout: Duration,
    session: &SessionState,
) -> AppResult<()> {
    let deadline = Instant::now() + timeout;
    while !guard.source.is_running() {
        session.check_cancelled()?;
        if Instant::now() >= deadline {
            return Err(DaqError::DeviceUnavailable(format!(
                "{} did not start scanning within {:?}",
                guard.source.info().product_name,
                timeout
            )));
        }
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

/// Run one hardware stream to completion.
pub fn run_hardware(
    spec: HardwareStreamSpec,
    ctx: &PipelineContext,
    progress: &StreamProgress,
) -> AppResult<StreamOutput> {
    let result = hardware_inner(spec, ctx, progress);
    settle(progress, result)
}

fn hardware_inner(
    spec: HardwareStreamSpec,
    ctx: &PipelineContext,
    progress: &StreamProgress,
) -> AppResult<StreamOutput> {
    let HardwareStreamSpec {
        name,
        channels,
        labels,
        packet_size,
        detach,
        open,
    } = spec;
    let rate_hz = ctx.params.rate_hz;

    let geometry = ScanGeometry::compute(rate_hz, ctx.params.duration_s, channels, packet_size)?;
    let plan = DrainPlan::from_geometry(&geometry, rate_hz)?
        .with_poll_interval(ctx.timing.poll_interval);

    let source = open()?;
    let info = source.info();
    info!(
        stream = %name,
        device = %info.product_name,
        id = %info.unique_id,
        channels = %channels,
        "Hardware source opened"
    );

    let mut guard = ScanGuard {
        stream: name.clone(),
        source,
    };
    guard.source.start(&ScanRequest {
        rate_hz,
        channels,
        capacity: geometry.capacity,
    })?;
    wait_until_running(&guard, ctx.timing.source_start_timeout, &ctx.session)?;

    let path = ctx.naming.part_file(&name);
    let mut sink = CsvSinkWriter::builder()
        .output_path(&path)
        .labels(labels)
        .create()?;

    progress.set_status(StreamStatus::Ready);
    let release = ctx.barrier.wait(ctx.timing.barrier_timeout)?;
    progress.set_status(StreamStatus::Running);

    let mut first_sample_at = None;
    let drainer = ChunkDrainer::new(name.as_str(), &*guard.source, plan).with_session(&ctx.session);
    for chunk in drainer {
        let chunk = chunk?;
        first_sample_at.get_or_insert_with(Instant::now);
        sink.write_chunk(&chunk)?;
        progress.add_row();
    }
    sink.finish()?;
    drop(guard);

    let rows = sink.stats().rows_written;
    info!(stream = %name, rows, path = %path.display(), "Hardware stream complete");
    Ok(StreamOutput {
        name,
        kind: StreamKind::Hardware { detach },
        path,
        rows,
        released_at: release.released_at,
        first_sample_at,
    })
}

// =============================================================================
// Sensor Pipeline
// =============================================================================

/// Run the serial sensor stream to completion.
pub fn run_sensor(
    spec: SensorStreamSpec,
    ctx: &PipelineContext,
    progress: &StreamProgress,
) -> AppResult<StreamOutput> {
    let result = sensor_inner(spec, ctx, progress);
    settle(progress, result)
}

fn sensor_inner(
    spec: SensorStreamSpec,
    ctx: &PipelineContext,
    progress: &StreamProgress,
) -> AppResult<StreamOutput> {
    let SensorStreamSpec {
        name,
        rate_hz,
        startup_line,
        column_label,
        open,
    } = spec;
    let timestamper = RateTimestamper::new(rate_hz);

    let mut link = open()?;
    link.clear_input()?;
    info!(stream = %name, port = link.port_name(), "Sensor link opened");
    serial_stream::await_startup(&mut link, &startup_line, &ctx.session)?;

    let path = ctx.naming.part_file(&name);
    let mut sink = CsvSinkWriter::builder()
        .output_path(&path)
        .labels([column_label])
        .create()?;

    progress.set_status(StreamStatus::Ready);
    let release = ctx.barrier.wait(ctx.timing.barrier_timeout)?;
    progress.set_status(StreamStatus::Running);

    let duration = Duration::from_secs(u64::from(ctx.params.duration_s));
    let capture = serial_stream::capture(&mut link, duration, &ctx.session, |row, line| {
        sink.write_row(timestamper.timestamp(row), &[line])?;
        progress.add_row();
        Ok(())
    })?;
    drop(link);
    sink.finish()?;

    serial_stream::check_sample_count(capture.lines, &timestamper, ctx.params.duration_s)?;

    info!(stream = %name, rows = capture.lines, path = %path.display(), "Sensor stream complete");
    Ok(StreamOutput {
        name,
        kind: StreamKind::Sensor { rate_hz },
        path,
        rows: capture.lines,
        released_at: release.released_at,
        first_sample_at: capture.first_line_at,
    })
}
