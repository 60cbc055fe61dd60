//! Free-running ring producer with a background scan thread.
//!
//! Stands in for a DAQ board scanning in continuous background mode: once
//! started, a thread writes interleaved rows into the ring at the requested
//! rate and publishes the produced count, wrapping and overwriting forever
//! until stopped. Nothing the reader does can slow it down.
//!
//! Samples live in `AtomicU64` slots holding `f64` bits so the reader can copy
//! while the producer writes without `unsafe`; a torn chunk is caught by the
//! reader's post-copy count check, exactly as with a DMA buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use daq_core::error::{AppResult, DaqError, DriverErrorKind};
use daq_core::limits::MAX_RING_SAMPLES;
use daq_core::source::{CircularSource, ScanRequest, SourceInfo};
use tracing::{debug, error, info};

use crate::common::{ErrorConfig, MockMode, MockRng, TimingConfig};
use crate::pattern;

const DRIVER: &str = "mock-ring";

/// How often the producer thread publishes new rows.
const PRODUCER_TICK: Duration = Duration::from_millis(1);

/// Configuration for [`MockCircularSource`].
#[derive(Debug, Clone)]
pub struct MockSourceConfig {
    /// Reported product name
    pub product_name: String,
    /// Reported unique id
    pub unique_id: String,
    /// Timing mode
    pub mode: MockMode,
    /// Setup delays for paced modes
    pub timing: TimingConfig,
    /// Setup faults
    pub errors: ErrorConfig,
    /// Stop producing (and report not running) after this many samples
    pub stop_after_samples: Option<u64>,
    /// Seed for setup jitter
    pub seed: Option<u64>,
}

impl Default for MockSourceConfig {
    fn default() -> Self {
        Self {
            product_name: "Mock USB-1608FS".to_string(),
            unique_id: "MOCK0001".to_string(),
            mode: MockMode::Instant,
            timing: TimingConfig::default(),
            errors: ErrorConfig::none(),
            stop_after_samples: None,
            seed: None,
        }
    }
}

impl MockSourceConfig {
    /// Paced board timing with the given identity.
    pub fn realistic(product_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            mode: MockMode::Realistic,
            timing: TimingConfig::daq_board(),
            ..Self::default()
        }
    }
}

/// Ring storage shared between the producer thread and the reader.
#[derive(Debug)]
struct RingShared {
    slots: Vec<AtomicU64>,
    produced: AtomicU64,
    running: AtomicBool,
}

/// Simulated continuous-scan board.
#[derive(Debug)]
pub struct MockCircularSource {
    config: MockSourceConfig,
    rng: MockRng,
    ring: Option<Arc<RingShared>>,
    producer: Option<JoinHandle<()>>,
}

impl MockCircularSource {
    /// Create an idle source.
    pub fn new(config: MockSourceConfig) -> Self {
        let rng = MockRng::new(config.seed);
        Self {
            config,
            rng,
            ring: None,
            producer: None,
        }
    }

    /// Ring storage, only present once started.
    fn ring(&self) -> AppResult<&Arc<RingShared>> {
        self.ring
            .as_ref()
            .ok_or_else(|| DaqError::DeviceUnavailable(format!("{} not started", DRIVER)))
    }
}

fn map_start_fault(err: daq_core::error::DriverError, requested: usize) -> DaqError {
    match err.kind {
        DriverErrorKind::Allocation => DaqError::AllocationFailed { requested },
        _ => DaqError::DeviceUnavailable(err.to_string()),
    }
}

fn run_producer(
    ring: Arc<RingShared>,
    rate_hz: u32,
    n_channels: usize,
    stop_after: Option<u64>,
) {
    let capacity = ring.slots.len();
    let started = Instant::now();
    let mut rows_written: u64 = 0;
    let mut row_buf = vec![0.0; n_channels];

    while ring.running.load(Ordering::Acquire) {
        let elapsed_ns = started.elapsed().as_nanos();
        let mut due_rows = (elapsed_ns * u128::from(rate_hz) / 1_000_000_000) as u64 + 1;
        if let Some(limit) = stop_after {
            due_rows = due_rows.min(limit / n_channels as u64);
        }

        for row in rows_written..due_rows {
            pattern::analog_row(row, rate_hz, &mut row_buf);
            let base = row as usize * n_channels;
            for (ch, value) in row_buf.iter().enumerate() {
                ring.slots[(base + ch) % capacity].store(value.to_bits(), Ordering::Relaxed);
            }
        }
        if due_rows > rows_written {
            rows_written = due_rows;
            ring.produced
                .store(rows_written * n_channels as u64, Ordering::Release);
        }

        if let Some(limit) = stop_after {
            if rows_written * n_channels as u64 >= limit {
                debug!(samples = rows_written * n_channels as u64, "Mock producer halted");
                ring.running.store(false, Ordering::Release);
                break;
            }
        }

        thread::sleep(PRODUCER_TICK);
    }
}

impl CircularSource for MockCircularSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            product_name: self.config.product_name.clone(),
            unique_id: self.config.unique_id.clone(),
        }
    }

    fn start(&mut self, request: &ScanRequest) -> AppResult<()> {
        if self.ring.is_some() {
            return Err(DaqError::DeviceUnavailable(format!(
                "{} already scanning",
                self.config.product_name
            )));
        }

        if self.config.mode.is_paced() {
            thread::sleep(self.config.timing.setup_delay(&self.rng));
        }

        self.config
            .errors
            .check_operation(DRIVER, "start")
            .map_err(|e| map_start_fault(e, request.capacity))?;

        let n_channels = request.channels.len();
        if request.capacity == 0
            || request.capacity > MAX_RING_SAMPLES
            || request.capacity % n_channels != 0
        {
            return Err(DaqError::AllocationFailed {
                requested: request.capacity,
            });
        }
        if request.rate_hz == 0 {
            return Err(DaqError::DeviceUnavailable(
                "Scan rate must be greater than 0".to_string(),
            ));
        }

        let ring = Arc::new(RingShared {
            slots: (0..request.capacity).map(|_| AtomicU64::new(0)).collect(),
            produced: AtomicU64::new(0),
            running: AtomicBool::new(true),
        });

        let producer_ring = Arc::clone(&ring);
        let rate_hz = request.rate_hz;
        let stop_after = self.config.stop_after_samples;
        let handle = thread::Builder::new()
            .name(format!("{}-producer", self.config.unique_id))
            .spawn(move || run_producer(producer_ring, rate_hz, n_channels, stop_after))?;

        info!(
            device = %self.config.product_name,
            rate_hz,
            channels = %request.channels,
            capacity = request.capacity,
            "Mock background scan started"
        );
        self.ring = Some(ring);
        self.producer = Some(handle);
        Ok(())
    }

    fn produced_count(&self) -> u64 {
        self.ring
            .as_ref()
            .map_or(0, |ring| ring.produced.load(Ordering::Acquire))
    }

    fn copy_range(&self, start_index: usize, out: &mut [f64]) -> AppResult<()> {
        let ring = self.ring()?;
        let end = start_index + out.len();
        let slots = ring.slots.get(start_index..end).ok_or_else(|| {
            DaqError::DeviceUnavailable(format!(
                "Copy range {}..{} outside ring of {}",
                start_index,
                end,
                ring.slots.len()
            ))
        })?;
        for (dst, slot) in out.iter_mut().zip(slots) {
            *dst = f64::from_bits(slot.load(Ordering::Relaxed));
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.ring
            .as_ref()
            .is_some_and(|ring| ring.running.load(Ordering::Acquire))
    }

    fn stop(&mut self) -> AppResult<()> {
        if let Some(ring) = &self.ring {
            ring.running.store(false, Ordering::Release);
        }
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                error!(device = %self.config.product_name, "Mock producer thread panicked");
            }
            debug!(device = %self.config.product_name, "Mock background scan stopped");
        }
        Ok(())
    }
}

impl Drop for MockCircularSource {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Error stopping mock scan on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_core::session::ChannelRange;

    fn request(capacity: usize) -> ScanRequest {
        ScanRequest {
            rate_hz: 1000,
            channels: ChannelRange::new(0, 1).unwrap(),
            capacity,
        }
    }

    #[test]
    fn test_produces_and_wraps() {
        let mut source = MockCircularSource::new(MockSourceConfig::default());
        assert_eq!(source.produced_count(), 0);
        source.start(&request(20)).unwrap();
        assert!(source.is_running());

        let deadline = Instant::now() + Duration::from_secs(2);
        while source.produced_count() < 100 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        let produced = source.produced_count();
        assert!(produced >= 100, "produced {}", produced);
        assert_eq!(produced % 2, 0);

        let mut out = [0.0; 4];
        source.copy_range(16, &mut out).unwrap();
        assert!(out.iter().all(|v| v.is_finite()));
        assert!(source.copy_range(18, &mut out).is_err());

        source.stop().unwrap();
        assert!(!source.is_running());
        source.stop().unwrap();
    }

    #[test]
    fn test_stop_after_samples() {
        let config = MockSourceConfig {
            stop_after_samples: Some(10),
            ..MockSourceConfig::default()
        };
        let mut source = MockCircularSource::new(config);
        source.start(&request(40)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while source.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(!source.is_running());
        assert_eq!(source.produced_count(), 10);
    }

    #[test]
    fn test_allocation_fault() {
        let config = MockSourceConfig {
            errors: ErrorConfig::scenario(crate::common::ErrorScenario::AllocationRefused),
            ..MockSourceConfig::default()
        };
        let mut source = MockCircularSource::new(config);
        let err = source.start(&request(20)).unwrap_err();
        assert!(matches!(err, DaqError::AllocationFailed { requested: 20 }));
        assert!(!source.is_running());
    }

    #[test]
    fn test_device_missing() {
        let config = MockSourceConfig {
            errors: ErrorConfig::scenario(crate::common::ErrorScenario::DeviceMissing),
            ..MockSourceConfig::default()
        };
        let mut source = MockCircularSource::new(config);
        assert!(matches!(
            source.start(&request(20)),
            Err(DaqError::DeviceUnavailable(_))
        ));
    }

    #[test]
    fn test_rejects_ragged_capacity() {
        let mut source = MockCircularSource::new(MockSourceConfig::default());
        assert!(matches!(
            source.start(&request(21)),
            Err(DaqError::AllocationFailed { .. })
        ));
    }
}
