//! Simulated serial flex sensor.
//!
//! Emits a short boot preamble (including a line that is not valid UTF-8 on
//! the real device), then the startup line, then one angle per line at the
//! sensor's native rate. In [`MockMode::Instant`] lines are returned without
//! delay; paced modes release line `n` at `first_read + n / rate`.
//! Once `line_limit` sample lines have been emitted every further read blocks
//! for the read timeout and reports no line, like an idle port.

use std::thread;
use std::time::{Duration, Instant};

use daq_core::error::{AppResult, DaqError};
use daq_core::limits::DEFAULT_SENSOR_RATE_HZ;
use daq_core::serial::SerialLink;
use tracing::{debug, info};

use crate::common::{ErrorConfig, MockMode, MockRng, TimingConfig};
use crate::pattern;

const DRIVER: &str = "mock-serial";

/// Configuration for [`MockSerialLink`].
#[derive(Debug, Clone)]
pub struct MockSensorConfig {
    /// Reported port name
    pub port: String,
    /// Lines printed before the startup line
    pub preamble: Vec<String>,
    /// Startup line
    pub startup_line: String,
    /// Native line rate
    pub rate_hz: u32,
    /// Sample lines emitted before the link goes idle (`None` = unlimited)
    pub line_limit: Option<usize>,
    /// Timing mode
    pub mode: MockMode,
    /// Setup delay and idle read timeout
    pub timing: TimingConfig,
    /// Probability of dropping a sample line in chaos mode
    pub drop_rate: f64,
    /// Open faults
    pub errors: ErrorConfig,
    /// Seed for jitter and drops
    pub seed: Option<u64>,
}

impl Default for MockSensorConfig {
    fn default() -> Self {
        Self {
            port: "MOCK-COM3".to_string(),
            preamble: vec![
                "\u{FFFD}\u{FFFD}".to_string(),
                "ADS1015 found".to_string(),
            ],
            startup_line: "One Axis ADS initialization succeeded...".to_string(),
            rate_hz: DEFAULT_SENSOR_RATE_HZ,
            line_limit: None,
            mode: MockMode::Instant,
            timing: TimingConfig {
                read_timeout_ms: 5,
                ..TimingConfig::default()
            },
            drop_rate: 0.0,
            errors: ErrorConfig::none(),
            seed: None,
        }
    }
}

impl MockSensorConfig {
    /// Instant-mode sensor that emits exactly the line count expected for
    /// `duration_s` seconds at its rate, then goes idle.
    pub fn exact(duration_s: u32) -> Self {
        let config = Self::default();
        let limit = config.rate_hz as usize * duration_s as usize + 1;
        Self {
            line_limit: Some(limit),
            ..config
        }
    }

    /// Paced sensor with realistic setup time.
    pub fn realistic() -> Self {
        Self {
            mode: MockMode::Realistic,
            timing: TimingConfig::serial_sensor(),
            ..Self::default()
        }
    }
}

enum Phase {
    Preamble(usize),
    Startup,
    Samples,
}

/// Simulated line-per-sample sensor link.
pub struct MockSerialLink {
    config: MockSensorConfig,
    rng: MockRng,
    phase: Phase,
    emitted: usize,
    next_index: u64,
    anchor: Option<Instant>,
}

impl std::fmt::Debug for MockSerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialLink")
            .field("port", &self.config.port)
            .field("emitted", &self.emitted)
            .finish()
    }
}

impl MockSerialLink {
    /// Open the simulated port.
    ///
    /// # Errors
    ///
    /// `PortUnavailable` when an open fault is injected.
    pub fn open(config: MockSensorConfig) -> AppResult<Self> {
        let rng = MockRng::new(config.seed);
        if config.mode.is_paced() {
            thread::sleep(config.timing.setup_delay(&rng));
        }
        config
            .errors
            .check_operation(DRIVER, "open")
            .map_err(|e| DaqError::PortUnavailable {
                port: config.port.clone(),
                reason: e.message,
            })?;

        info!(port = %config.port, rate_hz = config.rate_hz, "Opened mock sensor link");
        Ok(Self {
            config,
            rng,
            phase: Phase::Preamble(0),
            emitted: 0,
            next_index: 0,
            anchor: None,
        })
    }

    /// Sample lines returned so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    fn idle(&self) -> AppResult<Option<String>> {
        thread::sleep(self.config.timing.read_timeout());
        Ok(None)
    }

    fn period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.config.rate_hz.max(1)))
    }
}

impl SerialLink for MockSerialLink {
    fn port_name(&self) -> &str {
        &self.config.port
    }

    fn clear_input(&mut self) -> AppResult<()> {
        Ok(())
    }

    fn read_line(&mut self) -> AppResult<Option<String>> {
        match self.phase {
            Phase::Preamble(i) => {
                if let Some(line) = self.config.preamble.get(i) {
                    self.phase = Phase::Preamble(i + 1);
                    return Ok(Some(line.clone()));
                }
                self.phase = Phase::Samples;
                Ok(Some(self.config.startup_line.clone()))
            }
            Phase::Startup => {
                self.phase = Phase::Samples;
                Ok(Some(self.config.startup_line.clone()))
            }
            Phase::Samples => loop {
                if self
                    .config
                    .line_limit
                    .is_some_and(|limit| self.emitted >= limit)
                {
                    return self.idle();
                }

                let index = self.next_index;
                self.next_index += 1;

                if self.config.mode.is_paced() {
                    let anchor = *self.anchor.get_or_insert_with(Instant::now);
                    let due = anchor + self.period() * index as u32;
                    let now = Instant::now();
                    if due > now {
                        thread::sleep(due - now);
                    }
                }

                if self.config.mode == MockMode::Chaos && self.rng.should_fail(self.config.drop_rate)
                {
                    debug!(index, "Mock sensor dropped a line");
                    continue;
                }

                self.emitted += 1;
                let angle = pattern::flex_angle(index, self.config.rate_hz);
                return Ok(Some(format!("{:.2}", angle)));
            },
        }
    }
}

impl MockSerialLink {
    /// Re-emit the startup line, as the sensor does after a soft reset.
    pub fn reset(&mut self) {
        self.phase = Phase::Startup;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorScenario;

    #[test]
    fn test_preamble_then_startup_then_samples() {
        let mut link = MockSerialLink::open(MockSensorConfig::default()).unwrap();
        assert_eq!(link.read_line().unwrap().as_deref(), Some("\u{FFFD}\u{FFFD}"));
        assert_eq!(link.read_line().unwrap().as_deref(), Some("ADS1015 found"));
        assert_eq!(
            link.read_line().unwrap().as_deref(),
            Some("One Axis ADS initialization succeeded...")
        );
        let sample = link.read_line().unwrap().unwrap();
        assert!(sample.parse::<f64>().is_ok());
        assert_eq!(link.emitted(), 1);
    }

    #[test]
    fn test_line_limit_goes_idle() {
        let mut link = MockSerialLink::open(MockSensorConfig::exact(1)).unwrap();
        for _ in 0..3 {
            link.read_line().unwrap();
        }
        for _ in 0..101 {
            assert!(link.read_line().unwrap().is_some());
        }
        assert_eq!(link.read_line().unwrap(), None);
        assert_eq!(link.emitted(), 101);
    }

    #[test]
    fn test_reset_repeats_startup_line() {
        let mut link = MockSerialLink::open(MockSensorConfig::default()).unwrap();
        for _ in 0..4 {
            link.read_line().unwrap();
        }
        link.reset();
        assert_eq!(
            link.read_line().unwrap().as_deref(),
            Some("One Axis ADS initialization succeeded...")
        );
    }

    #[test]
    fn test_port_busy() {
        let config = MockSensorConfig {
            errors: ErrorConfig::scenario(ErrorScenario::PortBusy),
            ..MockSensorConfig::default()
        };
        let err = MockSerialLink::open(config).unwrap_err();
        assert!(matches!(err, DaqError::PortUnavailable { .. }));
    }

    #[test]
    fn test_chaos_drops_lines() {
        let config = MockSensorConfig {
            mode: MockMode::Chaos,
            rate_hz: 10_000,
            drop_rate: 0.5,
            preamble: Vec::new(),
            seed: Some(3),
            ..MockSensorConfig::default()
        };
        let mut link = MockSerialLink::open(config).unwrap();
        link.read_line().unwrap();
        for _ in 0..50 {
            assert!(link.read_line().unwrap().is_some());
        }
        assert_eq!(link.emitted(), 50);
        // Dropped lines still consume their time slot.
        assert!(link.next_index > 50);
    }
}
