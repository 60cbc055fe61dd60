//! Operational modes for mock collaborators.
//!
//! - **Instant**: no setup delay, sensor lines delivered as fast as they are read
//! - **Realistic**: setup delays and sensor lines paced at the native rate
//! - **Chaos**: realistic timing plus randomly dropped sensor lines

/// Operational modes for mock collaborators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockMode {
    /// Zero delays, deterministic - for unit tests
    #[default]
    Instant,
    /// Hardware-like timing - for integration tests and simulated sessions
    Realistic,
    /// Realistic timing with dropped lines - for failure-path tests
    Chaos,
}

impl MockMode {
    /// True when setup delays and line pacing apply.
    pub fn is_paced(self) -> bool {
        !matches!(self, MockMode::Instant)
    }
}
