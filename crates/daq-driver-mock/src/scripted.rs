//! Trace-driven ring source for deterministic drain tests.
//!
//! Every call to [`produced_count`](CircularSource::produced_count) returns the
//! next value of a scripted trace (the last value repeats once the trace is
//! exhausted). The ring content is derived from the current count: slot `k`
//! holds the global sample index `g` of the most recent write to it, i.e. the
//! largest `g < produced` with `g % capacity == k`. A consumer that drains
//! without loss therefore sees `0.0, 1.0, 2.0, ...`, and one that reads a slot
//! after the producer lapped it sees a value from the wrong lap.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use daq_core::error::{AppResult, DaqError};
use daq_core::source::{CircularSource, ScanRequest, SourceInfo};
use tracing::trace;

/// Ring source whose produced count follows a fixed trace.
#[derive(Debug)]
pub struct ScriptedSource {
    capacity: usize,
    trace: Vec<u64>,
    cursor: AtomicUsize,
    current: AtomicU64,
    running: AtomicBool,
    halt_when_exhausted: bool,
}

impl ScriptedSource {
    /// Source over a ring of `capacity` samples following `trace`.
    ///
    /// `trace` must be non-decreasing.
    pub fn new(capacity: usize, trace: Vec<u64>) -> Self {
        Self {
            capacity,
            trace,
            cursor: AtomicUsize::new(0),
            current: AtomicU64::new(0),
            running: AtomicBool::new(true),
            halt_when_exhausted: false,
        }
    }

    /// Producer that advances by `step` samples on every count read, up to `total`.
    pub fn steady(capacity: usize, step: u64, total: u64) -> Self {
        let trace = (1..=total.div_ceil(step.max(1)))
            .map(|i| (i * step).min(total))
            .collect();
        Self::new(capacity, trace)
    }

    /// Report not running once the trace has been read to its end.
    pub fn halt_when_exhausted(mut self) -> Self {
        self.halt_when_exhausted = true;
        self
    }

    /// Number of count reads performed so far.
    pub fn reads(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Global sample index currently stored in ring slot `index`, if written.
    fn slot_value(&self, index: usize, produced: u64) -> f64 {
        let index = index as u64;
        if produced <= index {
            return f64::NAN;
        }
        let cap = self.capacity as u64;
        let lap = (produced - 1 - index) / cap;
        (index + lap * cap) as f64
    }
}

impl CircularSource for ScriptedSource {
    fn info(&self) -> SourceInfo {
        SourceInfo {
            product_name: "Scripted ring".to_string(),
            unique_id: format!("SCRIPT-{}", self.capacity),
        }
    }

    fn start(&mut self, request: &ScanRequest) -> AppResult<()> {
        if request.capacity != self.capacity {
            return Err(DaqError::AllocationFailed {
                requested: request.capacity,
            });
        }
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    fn produced_count(&self) -> u64 {
        let i = self.cursor.fetch_add(1, Ordering::AcqRel);
        let value = self
            .trace
            .get(i)
            .or_else(|| self.trace.last())
            .copied()
            .unwrap_or(0);
        self.current.store(value, Ordering::Release);
        trace!(read = i, produced = value, "Scripted count");
        value
    }

    fn copy_range(&self, start_index: usize, out: &mut [f64]) -> AppResult<()> {
        if start_index + out.len() > self.capacity {
            return Err(DaqError::DeviceUnavailable(format!(
                "Copy range {}..{} outside ring of {}",
                start_index,
                start_index + out.len(),
                self.capacity
            )));
        }
        let produced = self.current.load(Ordering::Acquire);
        for (k, dst) in out.iter_mut().enumerate() {
            *dst = self.slot_value(start_index + k, produced);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        if self.halt_when_exhausted && self.reads() >= self.trace.len() {
            return false;
        }
        self.running.load(Ordering::Acquire)
    }

    fn stop(&mut self) -> AppResult<()> {
        self.running.store(false, Ordering::Release);
        Ok(())
    }
}
