//! Mock acquisition collaborators for daq-scan
//!
//! Simulated hardware for running sessions and tests without a board or a
//! serial sensor attached. All mocks run on plain threads and block with
//! `std::thread::sleep`, matching the blocking collaborator traits in
//! `daq-core`.
//!
//! # Available Mocks
//!
//! - [`MockCircularSource`] - Continuous background scan into a wrapping ring
//! - [`ScriptedSource`] - Ring whose produced count follows a fixed trace
//! - [`MockSerialLink`] - Line-per-sample flex sensor with a boot preamble
//!
//! # Timing Modes
//!
//! - `Instant`: no setup delay, sensor lines returned immediately
//! - `Realistic`: setup delays with jitter, sensor lines paced at its rate
//! - `Chaos`: realistic timing plus dropped sensor lines

pub mod common;
mod mock_ring;
mod mock_sensor;
pub mod pattern;
mod scripted;

// Re-export common types
pub use common::{ErrorConfig, ErrorScenario, MockMode, MockRng, TimingConfig};

// Re-export mock collaborators
pub use mock_ring::{MockCircularSource, MockSourceConfig};
pub use mock_sensor::{MockSensorConfig, MockSerialLink};
pub use scripted::ScriptedSource;
