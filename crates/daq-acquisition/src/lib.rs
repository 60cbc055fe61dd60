//! Continuous multi-stream acquisition for daq-scan.
//!
//! # Architecture
//!
//! ```text
//!   MultiStreamCoordinator
//!     ├── thread "daq-<hw>"     open ─ start ─ sink ─┐
//!     ├── thread "daq-<hw>"     open ─ start ─ sink ─┼─ StartBarrier ─ ChunkDrainer ─► CsvSinkWriter
//!     └── thread "daq-<sensor>" open ─ startup line ─┘               └ capture ────► CsvSinkWriter
//!                                                          join ─► merge / split
//! ```
//!
//! - [`drainer`]: polls a [`CircularSource`](daq_core::source::CircularSource)
//!   and yields fixed-size chunks, failing on overrun
//! - [`serial_stream`]: startup handshake and deadline-bounded line capture
//! - [`barrier`]: abortable start barrier shared by every stream
//! - [`pipeline`]: per-stream setup, barrier, collection and cleanup
//! - [`coordinator`]: runs the streams and reports the session outcome
//! - [`merge`]: sparse join onto the hardware time axis, per-stream split

pub mod barrier;
pub mod coordinator;
pub mod drainer;
pub mod merge;
pub mod pipeline;
pub mod serial_stream;

pub use barrier::{BarrierRelease, StartBarrier};
pub use coordinator::{MultiStreamCoordinator, MultiStreamCoordinatorBuilder, SessionReport};
pub use drainer::{ChunkDrainer, DrainCursor, DrainPlan, DrainStats};
pub use pipeline::{
    HardwareStreamSpec, LinkOpener, PipelineTiming, SensorStreamSpec, SourceOpener, StreamKind,
    StreamOutput,
};
