//! Collaborator interface for hardware ring producers.
//!
//! A [`CircularSource`] is a device scan that writes interleaved channel
//! samples into a fixed-capacity ring in the background and publishes a
//! monotonic count of samples produced. The drain side only ever polls the
//! count and copies ranges out; it has no way to pause or slow the producer.
//!
//! # Memory ordering
//!
//! Implementations must publish the count with `Release` (or stronger) after
//! the corresponding samples are written, and [`produced_count`] must read it
//! with `Acquire`. A copy that races with the producer can still observe
//! overwritten samples; the drainer detects that by re-reading the count after
//! the copy.
//!
//! [`produced_count`]: CircularSource::produced_count

use crate::error::AppResult;
use crate::session::ChannelRange;

/// Parameters handed to [`CircularSource::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRequest {
    /// Scan rate in scans per second.
    pub rate_hz: u32,
    /// Channels scanned, in interleave order.
    pub channels: ChannelRange,
    /// Ring capacity in samples.
    pub capacity: usize,
}

/// Identity of the device behind a source, logged at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    /// Product name, e.g. `"USB-1608FS-Plus"`.
    pub product_name: String,
    /// Serial number or other unique id.
    pub unique_id: String,
}

/// A background producer writing into a fixed-capacity circular region.
///
/// Lifecycle: `start` once, then any number of `produced_count` / `copy_range`
/// calls from a single reader, then `stop`. Implementations should also stop
/// on drop.
pub trait CircularSource: Send + Sync {
    /// Device identity.
    fn info(&self) -> SourceInfo;

    /// Allocate the ring and begin the background scan.
    ///
    /// # Errors
    ///
    /// `AllocationFailed` if the ring cannot be created, `DeviceUnavailable` if
    /// the device cannot scan as requested.
    fn start(&mut self, request: &ScanRequest) -> AppResult<()>;

    /// Total samples produced since `start`. Monotonic, never reset.
    fn produced_count(&self) -> u64;

    /// Copy `out.len()` samples starting at ring index `start_index`.
    ///
    /// The range must not run past the end of the ring; callers split
    /// wrapping ranges into two copies.
    fn copy_range(&self, start_index: usize, out: &mut [f64]) -> AppResult<()>;

    /// True while the background scan is active.
    fn is_running(&self) -> bool;

    /// Stop the background scan and release the ring. Idempotent.
    fn stop(&mut self) -> AppResult<()>;
}

impl<S: CircularSource + ?Sized> CircularSource for Box<S> {
    fn info(&self) -> SourceInfo {
        (**self).info()
    }

    fn start(&mut self, request: &ScanRequest) -> AppResult<()> {
        (**self).start(request)
    }

    fn produced_count(&self) -> u64 {
        (**self).produced_count()
    }

    fn copy_range(&self, start_index: usize, out: &mut [f64]) -> AppResult<()> {
        (**self).copy_range(start_index, out)
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    fn stop(&mut self) -> AppResult<()> {
        (**self).stop()
    }
}

/// One row of samples across all channels, stamped on the synthetic time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Row index within the stream, starting at 0.
    pub row: u64,
    /// `row / rate` in seconds.
    pub timestamp: f64,
    /// Interleaved samples, `chunk_size` long.
    pub samples: Vec<f64>,
}

impl Chunk {
    /// Number of samples in the chunk.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the chunk holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Ordered consumer of drained chunks.
pub trait ChunkSink {
    /// Append one chunk. Called in emission order.
    fn write_chunk(&mut self, chunk: &Chunk) -> AppResult<()>;

    /// Flush buffered output.
    fn finish(&mut self) -> AppResult<()>;
}

impl<T: ChunkSink + ?Sized> ChunkSink for &mut T {
    fn write_chunk(&mut self, chunk: &Chunk) -> AppResult<()> {
        (**self).write_chunk(chunk)
    }

    fn finish(&mut self) -> AppResult<()> {
        (**self).finish()
    }
}

impl ChunkSink for Vec<Chunk> {
    fn write_chunk(&mut self, chunk: &Chunk) -> AppResult<()> {
        self.push(chunk.clone());
        Ok(())
    }

    fn finish(&mut self) -> AppResult<()> {
        Ok(())
    }
}
