//! `daq-core`
//!
//! Shared types for continuous ring-buffer acquisition.
//!
//! A session runs several independent streams: hardware boards that scan into
//! a driver-owned circular buffer, and a serial sensor that prints one line per
//! sample. This crate holds what every stream and driver agrees on.
//!
//! ## Key Types
//!
//! - [`CircularSource`](source::CircularSource): background producer over a fixed-capacity ring
//! - [`SerialLink`](serial::SerialLink): blocking line reader for the sensor
//! - [`ScanGeometry`](session::ScanGeometry): ring capacity, chunk size and sample budget
//! - [`SessionState`](session::SessionState): cancel flag and per-stream progress
//! - [`RateTimestamper`](timestamp::RateTimestamper): synthetic `i / rate` time axis
//! - [`DaqError`](error::DaqError): error taxonomy shared by every crate
//! - [`AcquisitionConfig`](config::AcquisitionConfig): layered Figment configuration

pub mod config;
pub mod error;
pub mod limits;
pub mod serial;
pub mod session;
pub mod source;
pub mod timestamp;

pub use error::{AppResult, DaqError, DriverError, DriverErrorKind};
pub use session::{
    ChannelRange, OutputMode, ScanGeometry, SessionParams, SessionState, StreamProgress,
    StreamStatus,
};
pub use source::{Chunk, ChunkSink, CircularSource, ScanRequest, SourceInfo};
pub use timestamp::RateTimestamper;

/// Short git revision the crate was built from, `"unknown"` outside a checkout.
pub const GIT_SHA: &str = env!("DAQ_GIT_SHA");

/// Version string with build revision, e.g. `0.1.0 (a1b2c3d)`.
pub fn build_info() -> String {
    let dirty = if env!("DAQ_GIT_DIRTY") == "true" { "-dirty" } else { "" };
    format!("{} ({}{})", env!("CARGO_PKG_VERSION"), GIT_SHA, dirty)
}
