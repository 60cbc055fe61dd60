//! Multi-stream session coordinator.
//!
//! Spawns one named thread per stream, all sharing a [`StartBarrier`] sized to
//! the stream count and one [`SessionState`]. The first stream to fail aborts
//! the barrier and raises the cancel flag, so streams still in setup or
//! waiting at the barrier return at once and running drainers stop at their
//! next poll. After every thread has joined, the outputs are merged or split
//! according to the session's [`OutputMode`].
//!
//! # Example
//!
//! ```rust,ignore
//! let report = MultiStreamCoordinator::builder()
//!     .params(params)
//!     .output_dir("data")
//!     .hardware(emg)
//!     .hardware(force)
//!     .sensor(flex)
//!     .build()?
//!     .run()?;
//! println!("wrote {:?}", report.files);
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use daq_core::config::check_file_parts;
use daq_core::error::{AppResult, DaqError, DriverError, DriverErrorKind};
use daq_core::session::{OutputMode, SessionParams, SessionState, StreamProgress};
use daq_storage::SessionNaming;
use tracing::{error, info, warn};

use crate::barrier::StartBarrier;
use crate::merge;
use crate::pipeline::{
    self, HardwareStreamSpec, PipelineContext, PipelineTiming, SensorStreamSpec, StreamOutput,
};

enum StreamSpec {
    Hardware(HardwareStreamSpec),
    Sensor(SensorStreamSpec),
}

impl StreamSpec {
    fn name(&self) -> &str {
        match self {
            StreamSpec::Hardware(spec) => &spec.name,
            StreamSpec::Sensor(spec) => &spec.name,
        }
    }

    fn run(self, ctx: &PipelineContext, progress: &StreamProgress) -> AppResult<StreamOutput> {
        match self {
            StreamSpec::Hardware(spec) => pipeline::run_hardware(spec, ctx, progress),
            StreamSpec::Sensor(spec) => pipeline::run_sensor(spec, ctx, progress),
        }
    }
}

/// Outcome of a successful session.
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Stem shared by every file of the session
    pub stem: String,
    /// Final files, after merging or splitting
    pub files: Vec<PathBuf>,
    /// Per-stream results in configuration order
    pub streams: Vec<StreamOutput>,
    /// Wall-clock time from spawn to the last file written
    pub elapsed: Duration,
}

impl SessionReport {
    /// Spread between the earliest and latest first-sample instants.
    ///
    /// `None` if no stream recorded a sample.
    pub fn start_skew(&self) -> Option<Duration> {
        let firsts = self.streams.iter().filter_map(|s| s.first_sample_at);
        let earliest = firsts.clone().min()?;
        let latest = firsts.max()?;
        Some(latest.duration_since(earliest))
    }
}

/// Runs a set of streams as one synchronized session.
pub struct MultiStreamCoordinator {
    params: SessionParams,
    naming: SessionNaming,
    timing: PipelineTiming,
    session: Arc<SessionState>,
    streams: Vec<StreamSpec>,
}

impl std::fmt::Debug for MultiStreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStreamCoordinator")
            .field("params", &self.params)
            .field("stem", &self.naming.stem())
            .field(
                "streams",
                &self.streams.iter().map(StreamSpec::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Builder for [`MultiStreamCoordinator`].
#[derive(Default)]
pub struct MultiStreamCoordinatorBuilder {
    params: Option<SessionParams>,
    output_dir: Option<PathBuf>,
    naming: Option<SessionNaming>,
    timing: PipelineTiming,
    session: Option<Arc<SessionState>>,
    hardware: Vec<HardwareStreamSpec>,
    sensor: Option<SensorStreamSpec>,
}

impl MultiStreamCoordinatorBuilder {
    /// Session parameters (required).
    pub fn params(mut self, params: SessionParams) -> Self {
        self.params = Some(params);
        self
    }

    /// Directory for session files; named from the current local time.
    pub fn output_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.output_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Explicit file naming. Takes precedence over [`output_dir`](Self::output_dir).
    pub fn naming(mut self, naming: SessionNaming) -> Self {
        self.naming = Some(naming);
        self
    }

    /// Drain pacing and timeouts.
    pub fn timing(mut self, timing: PipelineTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Share an existing session state, e.g. one a Ctrl-C handler cancels.
    pub fn session(mut self, session: Arc<SessionState>) -> Self {
        self.session = Some(session);
        self
    }

    /// Add a hardware stream. Merge order follows call order.
    pub fn hardware(mut self, spec: HardwareStreamSpec) -> Self {
        self.hardware.push(spec);
        self
    }

    /// Set the serial sensor stream.
    pub fn sensor(mut self, spec: SensorStreamSpec) -> Self {
        self.sensor = Some(spec);
        self
    }

    /// Validate and build.
    pub fn build(self) -> AppResult<MultiStreamCoordinator> {
        let params = self
            .params
            .ok_or_else(|| DaqError::Configuration("Session parameters are required".into()))?;
        params.validate()?;

        if self.hardware.is_empty() {
            return Err(DaqError::Configuration(
                "At least one hardware stream is required".into(),
            ));
        }
        for spec in &self.hardware {
            spec.validate()?;
        }
        if let Some(sensor) = &self.sensor {
            if sensor.rate_hz == 0 {
                return Err(DaqError::Configuration(format!(
                    "Sensor stream '{}' rate must be greater than 0",
                    sensor.name
                )));
            }
        }

        let mut streams: Vec<StreamSpec> =
            self.hardware.into_iter().map(StreamSpec::Hardware).collect();
        streams.extend(self.sensor.map(StreamSpec::Sensor));

        let mut seen = HashSet::new();
        for stream in &streams {
            if !seen.insert(stream.name().to_string()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate stream name '{}'",
                    stream.name()
                )));
            }
        }

        let groups = streams
            .iter()
            .flat_map(|stream| match stream {
                StreamSpec::Hardware(spec) => spec.detach.as_slice(),
                StreamSpec::Sensor(_) => &[][..],
            })
            .map(|group| group.group.as_str());
        check_file_parts(streams.iter().map(StreamSpec::name), groups)?;

        let naming = match (self.naming, self.output_dir) {
            (Some(naming), _) => naming,
            (None, Some(dir)) => {
                SessionNaming::now(&dir, &params.subject, params.rate_hz, params.duration_s)
            }
            (None, None) => {
                return Err(DaqError::Configuration(
                    "An output directory or file naming is required".into(),
                ))
            }
        };

        Ok(MultiStreamCoordinator {
            params,
            naming,
            timing: self.timing,
            session: self.session.unwrap_or_else(SessionState::new),
            streams,
        })
    }
}

impl MultiStreamCoordinator {
    /// Create a new builder.
    pub fn builder() -> MultiStreamCoordinatorBuilder {
        MultiStreamCoordinatorBuilder::default()
    }

    /// Session state shared with every stream.
    pub fn session(&self) -> Arc<SessionState> {
        Arc::clone(&self.session)
    }

    /// File naming of this session.
    pub fn naming(&self) -> &SessionNaming {
        &self.naming
    }

    /// Number of streams, which is also the barrier's party count.
    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Run every stream to completion, then merge or split their tables.
    ///
    /// # Errors
    ///
    /// The first primary failure, wrapped in `StreamFailed` with the name of
    /// the stream that raised it. Failures that only follow from another
    /// stream's (`Cancelled`, `BarrierAborted`) are reported only when no
    /// primary failure exists; an external cancel yields plain `Cancelled`.
    pub fn run(self) -> AppResult<SessionReport> {
        let started = Instant::now();
        let barrier = Arc::new(StartBarrier::new(self.streams.len()));
        let ctx = PipelineContext {
            params: self.params.clone(),
            naming: self.naming.clone(),
            barrier: Arc::clone(&barrier),
            session: Arc::clone(&self.session),
            timing: self.timing,
        };
        info!(
            stem = %self.naming.stem(),
            streams = self.streams.len(),
            rate_hz = self.params.rate_hz,
            duration_s = self.params.duration_s,
            mode = ?self.params.output_mode,
            "Starting acquisition session"
        );

        let mut handles = Vec::with_capacity(self.streams.len());
        let mut spawn_failure = None;
        for stream in self.streams {
            let name = stream.name().to_string();
            let progress = self.session.register(name.clone());
            let ctx = ctx.clone();
            let spawned = thread::Builder::new()
                .name(format!("daq-{name}"))
                .spawn(move || {
                    let result = stream.run(&ctx, &progress);
                    if result.is_err() {
                        ctx.barrier.abort();
                        ctx.session.cancel();
                    }
                    result
                });
            match spawned {
                Ok(handle) => handles.push((name, handle)),
                Err(e) => {
                    barrier.abort();
                    self.session.cancel();
                    spawn_failure = Some(DaqError::Io(e).in_stream(name));
                    break;
                }
            }
        }

        let mut outputs = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();
        for (name, handle) in handles {
            let result = handle.join().unwrap_or_else(|_| {
                barrier.abort();
                self.session.cancel();
                Err(DriverError::new(
                    "pipeline",
                    DriverErrorKind::Unknown,
                    format!("Stream thread '{name}' panicked"),
                )
                .into())
            });
            match result {
                Ok(output) => {
                    info!(stream = %name, rows = output.rows, "Stream finished");
                    outputs.push(output);
                }
                Err(e) if e.is_secondary() => {
                    warn!(stream = %name, error = %e, "Stream stopped");
                    failures.push((name, e));
                }
                Err(e) => {
                    error!(stream = %name, error = %e, "Stream failed");
                    failures.push((name, e));
                }
            }
        }

        if let Some(e) = spawn_failure {
            return Err(e);
        }
        if let Some(e) = select_failure(failures) {
            return Err(e);
        }

        let files = match self.params.output_mode {
            OutputMode::Merged => {
                vec![merge::merge_outputs(&outputs, self.params.rate_hz, &self.naming)?]
            }
            OutputMode::Separate => merge::split_outputs(&outputs, &self.naming)?,
        };

        let report = SessionReport {
            stem: self.naming.stem().to_string(),
            files,
            streams: outputs,
            elapsed: started.elapsed(),
        };
        info!(
            files = report.files.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            skew_us = report.start_skew().map(|d| d.as_micros() as u64),
            "Acquisition session complete"
        );
        Ok(report)
    }
}

/// Pick the error that explains a failed session.
fn select_failure(failures: Vec<(String, DaqError)>) -> Option<DaqError> {
    if let Some(index) = failures.iter().position(|(_, e)| !e.is_secondary()) {
        let (name, error) = failures.into_iter().nth(index)?;
        return Some(error.in_stream(name));
    }
    if failures
        .iter()
        .any(|(_, e)| matches!(e.root(), DaqError::Cancelled))
    {
        return Some(DaqError::Cancelled);
    }
    let (name, error) = failures.into_iter().next()?;
    Some(error.in_stream(name))
}
