//! Timing configuration for paced modes.
//!
//! Setup delays stand in for device detection, buffer allocation and the
//! sensor's own initialization, which take variable time on real hardware.

use std::time::Duration;

use super::rng::MockRng;

/// Timing configuration for paced modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimingConfig {
    /// Fixed part of the setup delay in milliseconds
    pub setup_delay_ms: u64,
    /// Random extra setup delay, uniform in `[0, setup_jitter_ms]`
    pub setup_jitter_ms: u64,
    /// How long an idle read blocks before reporting a timeout, in milliseconds
    pub read_timeout_ms: u64,
}

impl TimingConfig {
    /// Timing for an analog input board (detection and buffer allocation)
    pub fn daq_board() -> Self {
        Self {
            setup_delay_ms: 150,
            setup_jitter_ms: 100,
            read_timeout_ms: 0,
        }
    }

    /// Timing for the serial flex sensor (port open and ADS initialization)
    pub fn serial_sensor() -> Self {
        Self {
            setup_delay_ms: 300,
            setup_jitter_ms: 200,
            read_timeout_ms: 50,
        }
    }

    /// Idle read timeout as a `Duration`, at least 1 ms.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }

    /// Draw one setup delay.
    pub fn setup_delay(&self, rng: &MockRng) -> Duration {
        let jitter = if self.setup_jitter_ms > 0 {
            rng.gen_range(0..=self.setup_jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.setup_delay_ms + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_delay_within_jitter() {
        let timing = TimingConfig::daq_board();
        let rng = MockRng::new(Some(1));
        for _ in 0..50 {
            let delay = timing.setup_delay(&rng);
            assert!(delay >= Duration::from_millis(150));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_default_is_instant() {
        let timing = TimingConfig::default();
        assert_eq!(timing.setup_delay(&MockRng::new(Some(1))), Duration::ZERO);
        assert_eq!(timing.read_timeout(), Duration::from_millis(1));
    }
}
