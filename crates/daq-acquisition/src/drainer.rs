//! Chunk drainer for circular sources.
//!
//! Turns a [`CircularSource`] into an ordered, finite sequence of fixed-size
//! chunks. The producer cannot be paused, so correctness rests on overrun
//! detection instead of flow control:
//!
//! ```text
//!   produced ──►  ┌───────────────────── ring (capacity C) ─────────────────────┐
//!                 │ ... │ consumed │ available (≤ C) │ overwritten if > C  ... │
//!                 └─────────────────────────────────────────────────────────────┘
//!                              ▲ prev_index = prev_count mod C
//! ```
//!
//! Every poll:
//!
//! 1. `available = produced - prev_count`; more than `C` is an overrun.
//! 2. Less than one chunk: sleep one poll interval and poll again. This is the
//!    only place the loop waits.
//! 3. Otherwise copy one chunk from `prev_index`, in two parts when it
//!    crosses the end of the ring.
//! 4. Re-read the count. If the producer lapped the cursor during the copy
//!    the chunk may be torn: discard it and fail with an overrun.
//! 5. Emit the chunk stamped `row / rate`, then advance the cursor.
//!
//! The sequence ends once `prev_count >= points_to_write`.

use std::thread;
use std::time::Duration;

use daq_core::error::{AppResult, DaqError};
use daq_core::limits::DRAIN_POLL_INTERVAL;
use daq_core::session::{ScanGeometry, SessionState};
use daq_core::source::{Chunk, ChunkSink, CircularSource};
use daq_core::timestamp::RateTimestamper;
use tracing::{error, info, trace};

// =============================================================================
// Plan and Cursor
// =============================================================================

/// Sizes and pacing for one drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPlan {
    capacity: usize,
    chunk_size: usize,
    points_to_write: u64,
    rate_hz: u32,
    poll_interval: Duration,
}

impl DrainPlan {
    /// Plan for a ring of `capacity` samples drained `chunk_size` at a time
    /// until `points_to_write` samples have been consumed.
    ///
    /// # Errors
    ///
    /// `Configuration` if a size is zero or the chunk is larger than the ring.
    pub fn new(
        capacity: usize,
        chunk_size: usize,
        points_to_write: u64,
        rate_hz: u32,
    ) -> AppResult<Self> {
        if capacity == 0 || chunk_size == 0 || rate_hz == 0 {
            return Err(DaqError::Configuration(format!(
                "Drain plan needs non-zero sizes (capacity {}, chunk {}, rate {})",
                capacity, chunk_size, rate_hz
            )));
        }
        if chunk_size > capacity {
            return Err(DaqError::Configuration(format!(
                "Chunk of {} samples does not fit a ring of {}",
                chunk_size, capacity
            )));
        }
        Ok(Self {
            capacity,
            chunk_size,
            points_to_write,
            rate_hz,
            poll_interval: DRAIN_POLL_INTERVAL,
        })
    }

    /// Plan matching a computed scan geometry.
    pub fn from_geometry(geometry: &ScanGeometry, rate_hz: u32) -> AppResult<Self> {
        Self::new(
            geometry.capacity,
            geometry.chunk_size,
            geometry.points_to_write,
            rate_hz,
        )
    }

    /// Override the sleep between polls.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Ring capacity in samples.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples per chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sample budget.
    pub fn points_to_write(&self) -> u64 {
        self.points_to_write
    }

    /// Sleep between polls.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Chunks emitted by a complete drain.
    pub fn rows(&self) -> u64 {
        self.points_to_write.div_ceil(self.chunk_size as u64)
    }
}

/// Position of the drainer in the producer's sample stream.
///
/// `index == consumed % capacity` always holds; both advance only by whole
/// chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainCursor {
    consumed: u64,
    index: usize,
}

impl DrainCursor {
    /// Samples consumed so far.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Ring index of the next unread sample.
    pub fn index(&self) -> usize {
        self.index
    }

    fn advance(&mut self, chunk_size: usize, capacity: usize) {
        self.consumed += chunk_size as u64;
        self.index = (self.index + chunk_size) % capacity;
    }
}

/// Copy `out.len()` samples from ring position `start`, wrapping at `capacity`.
///
/// Issues one copy when the range fits before the end of the ring and two
/// (`start..capacity`, then `0..rest`) when it crosses it. `out` must not be
/// longer than the ring.
pub fn copy_wrapping<S: CircularSource + ?Sized>(
    source: &S,
    capacity: usize,
    start: usize,
    out: &mut [f64],
) -> AppResult<()> {
    if start >= capacity || out.len() > capacity {
        return Err(DaqError::Configuration(format!(
            "Copy of {} samples from {} does not fit a ring of {}",
            out.len(),
            start,
            capacity
        )));
    }
    let first = (capacity - start).min(out.len());
    let (head, tail) = out.split_at_mut(first);
    source.copy_range(start, head)?;
    if !tail.is_empty() {
        source.copy_range(0, tail)?;
    }
    Ok(())
}

// =============================================================================
// Drainer
// =============================================================================

/// Counters from one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Chunks emitted
    pub chunks: u64,
    /// Count reads that found less than a chunk
    pub waits: u64,
    /// Largest backlog seen, in samples
    pub max_backlog: u64,
}

/// Lazy, finite, ordered sequence of chunks drained from a circular source.
///
/// Yields `Ok(chunk)` until the budget is consumed, or a single `Err` on
/// overrun, a stopped source or cancellation. Nothing is yielded after either.
pub struct ChunkDrainer<'a, S: CircularSource + ?Sized> {
    stream: String,
    source: &'a S,
    plan: DrainPlan,
    cursor: DrainCursor,
    timestamper: RateTimestamper,
    session: Option<&'a SessionState>,
    staging: Vec<f64>,
    stats: DrainStats,
    started: bool,
    done: bool,
}

impl<'a, S: CircularSource + ?Sized> ChunkDrainer<'a, S> {
    /// Drainer over `source`, named `stream` in logs and errors.
    pub fn new(stream: impl Into<String>, source: &'a S, plan: DrainPlan) -> Self {
        Self {
            stream: stream.into(),
            source,
            plan,
            cursor: DrainCursor::default(),
            timestamper: RateTimestamper::new(plan.rate_hz),
            session: None,
            staging: vec![0.0; plan.chunk_size],
            stats: DrainStats::default(),
            started: false,
            done: false,
        }
    }

    /// Stop with `Cancelled` once `session` is cancelled.
    pub fn with_session(mut self, session: &'a SessionState) -> Self {
        self.session = Some(session);
        self
    }

    /// Current cursor.
    pub fn cursor(&self) -> DrainCursor {
        self.cursor
    }

    /// Counters so far.
    pub fn stats(&self) -> DrainStats {
        self.stats
    }

    /// Plan being drained.
    pub fn plan(&self) -> &DrainPlan {
        &self.plan
    }

    /// Drain everything into `sink`, finishing it on success.
    ///
    /// The sink is not finished on failure; rows already written stay as a
    /// truncated prefix.
    pub fn drain_into<K: ChunkSink + ?Sized>(mut self, sink: &mut K) -> AppResult<DrainStats> {
        while let Some(chunk) = self.next() {
            sink.write_chunk(&chunk?)?;
        }
        sink.finish()?;
        Ok(self.stats)
    }

    fn overrun(&self, produced: u64, stage: &str) -> DaqError {
        let consumed = self.cursor.consumed;
        error!(
            stream = %self.stream,
            produced,
            consumed,
            capacity = self.plan.capacity,
            stage,
            "Ring buffer overrun"
        );
        DaqError::Overrun {
            stream: self.stream.clone(),
            produced,
            consumed,
            capacity: self.plan.capacity,
        }
    }

    fn backlog(&mut self, produced: u64) -> u64 {
        let backlog = produced.saturating_sub(self.cursor.consumed);
        self.stats.max_backlog = self.stats.max_backlog.max(backlog);
        backlog
    }

    fn poll_chunk(&mut self) -> AppResult<Option<Chunk>> {
        let capacity = self.plan.capacity as u64;
        let chunk_size = self.plan.chunk_size as u64;

        loop {
            if self.cursor.consumed >= self.plan.points_to_write {
                info!(
                    stream = %self.stream,
                    chunks = self.stats.chunks,
                    waits = self.stats.waits,
                    max_backlog = self.stats.max_backlog,
                    "Drain complete"
                );
                return Ok(None);
            }
            if let Some(session) = self.session {
                session.check_cancelled()?;
            }

            let produced = self.source.produced_count();
            let available = self.backlog(produced);
            if available > capacity {
                return Err(self.overrun(produced, "poll"));
            }

            if available < chunk_size {
                if !self.source.is_running() {
                    // The producer may have published its last rows just before halting.
                    let produced = self.source.produced_count();
                    if self.backlog(produced) < chunk_size {
                        return Err(DaqError::SourceStopped {
                            stream: self.stream.clone(),
                            consumed: self.cursor.consumed,
                            expected: self.plan.points_to_write,
                        });
                    }
                    continue;
                }
                self.stats.waits += 1;
                trace!(stream = %self.stream, available, "Waiting for a full chunk");
                thread::sleep(self.plan.poll_interval);
                continue;
            }

            copy_wrapping(
                self.source,
                self.plan.capacity,
                self.cursor.index,
                &mut self.staging,
            )?;

            let recheck = self.source.produced_count();
            if self.backlog(recheck) > capacity {
                return Err(self.overrun(recheck, "copy"));
            }

            let row = self.stats.chunks;
            let chunk = Chunk {
                row,
                timestamp: self.timestamper.timestamp(row),
                samples: self.staging.clone(),
            };
            self.cursor.advance(self.plan.chunk_size, self.plan.capacity);
            self.stats.chunks += 1;
            return Ok(Some(chunk));
        }
    }
}

impl<S: CircularSource + ?Sized> Iterator for ChunkDrainer<'_, S> {
    type Item = AppResult<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            info!(
                stream = %self.stream,
                capacity = self.plan.capacity,
                chunk_size = self.plan.chunk_size,
                points_to_write = self.plan.points_to_write,
                "Drain started"
            );
        }
        match self.poll_chunk() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<S: CircularSource + ?Sized> std::iter::FusedIterator for ChunkDrainer<'_, S> {}

#[cfg(test)]
mod tests {
    use super::*;
    use daq_driver_mock::ScriptedSource;
    use tracing_test::traced_test;

    const FAST: Duration = Duration::from_millis(1);

    fn plan(capacity: usize, chunk: usize, budget: u64) -> DrainPlan {
        DrainPlan::new(capacity, chunk, budget, 100)
            .unwrap()
            .with_poll_interval(FAST)
    }

    fn flatten(chunks: &[Chunk]) -> Vec<f64> {
        chunks.iter().flat_map(|c| c.samples.iter().copied()).collect()
    }

    #[test]
    fn test_plan_validation() {
        assert!(DrainPlan::new(0, 1, 1, 100).is_err());
        assert!(DrainPlan::new(8, 0, 1, 100).is_err());
        assert!(DrainPlan::new(8, 9, 1, 100).is_err());
        assert!(DrainPlan::new(8, 2, 1, 0).is_err());
        assert_eq!(DrainPlan::new(10, 4, 10, 100).unwrap().rows(), 3);
    }

    #[test]
    fn test_drains_in_order_without_loss() {
        let source = ScriptedSource::steady(16, 2, 64);
        let chunks: Vec<Chunk> = ChunkDrainer::new("s", &source, plan(16, 4, 64))
            .collect::<AppResult<_>>()
            .unwrap();

        assert_eq!(chunks.len(), 16);
        let expected: Vec<f64> = (0..64).map(|g| g as f64).collect();
        assert_eq!(flatten(&chunks), expected);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.row, i as u64);
        }
    }

    #[test]
    fn test_waits_when_less_than_a_chunk() {
        let source = ScriptedSource::new(8, vec![0, 1, 1, 3, 4, 4, 8, 8]);
        let mut drainer = ChunkDrainer::new("s", &source, plan(8, 4, 8));
        let chunks: Vec<Chunk> = drainer.by_ref().collect::<AppResult<_>>().unwrap();
        assert_eq!(flatten(&chunks), (0..8).map(f64::from).collect::<Vec<_>>());
        assert_eq!(drainer.stats().waits, 4);
        assert_eq!(drainer.stats().chunks, 2);
    }

    #[test]
    fn test_chunk_crossing_ring_end() {
        // 4-sample chunks over a ring of 10: the third chunk spans 8, 9, 0, 1.
        let source = ScriptedSource::steady(10, 2, 20);
        let chunks: Vec<Chunk> = ChunkDrainer::new("s", &source, plan(10, 4, 20))
            .collect::<AppResult<_>>()
            .unwrap();
        assert_eq!(chunks[2].samples, vec![8.0, 9.0, 10.0, 11.0]);
        assert_eq!(flatten(&chunks), (0..20).map(f64::from).collect::<Vec<_>>());
    }

    #[test]
    fn test_copy_wrapping_matches_linear_copy() {
        let source = ScriptedSource::new(16, vec![18]);
        source.produced_count();

        let mut wrapped = [0.0; 4];
        copy_wrapping(&source, 16, 14, &mut wrapped).unwrap();

        // Reference: the same four slots read one at a time.
        let mut reference = Vec::new();
        for index in [14, 15, 0, 1] {
            let mut one = [0.0];
            source.copy_range(index, &mut one).unwrap();
            reference.push(one[0]);
        }
        assert_eq!(wrapped.to_vec(), reference);
        assert_eq!(wrapped, [14.0, 15.0, 16.0, 17.0]);
    }

    #[test]
    fn test_copy_wrapping_rejects_oversized() {
        let source = ScriptedSource::new(4, vec![4]);
        let mut out = [0.0; 5];
        assert!(copy_wrapping(&source, 4, 0, &mut out).is_err());
        assert!(copy_wrapping(&source, 4, 4, &mut out[..1]).is_err());
    }

    #[traced_test]
    #[test]
    fn test_overrun_before_copy() {
        // Second poll finds 21 - 4 = 17 samples waiting in a ring of 16.
        let source = ScriptedSource::new(16, vec![4, 4, 21]);
        let mut drainer = ChunkDrainer::new("chest", &source, plan(16, 4, 64));

        assert!(drainer.next().unwrap().is_ok());
        let err = drainer.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            DaqError::Overrun {
                produced: 21,
                consumed: 4,
                capacity: 16,
                ..
            }
        ));
        assert!(drainer.next().is_none());
        assert!(logs_contain("Ring buffer overrun"));
    }

    #[traced_test]
    #[test]
    fn test_overrun_during_copy_discards_chunk() {
        // Count looks fine before the copy and has lapped the cursor after it.
        let source = ScriptedSource::new(16, vec![4, 17]);
        let mut drainer = ChunkDrainer::new("chest", &source, plan(16, 4, 64));

        let err = drainer.next().unwrap().unwrap_err();
        assert!(matches!(err, DaqError::Overrun { produced: 17, .. }));
        assert!(drainer.next().is_none());
        assert_eq!(drainer.stats().chunks, 0);
        assert_eq!(drainer.cursor().consumed(), 0);
        assert!(logs_contain("copy"));
    }

    #[test]
    fn test_backlog_of_exactly_capacity_is_not_overrun() {
        let source = ScriptedSource::new(8, vec![8]);
        let chunks: Vec<Chunk> = ChunkDrainer::new("s", &source, plan(8, 4, 8))
            .collect::<AppResult<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_source_stopped_early() {
        let source = ScriptedSource::new(8, vec![4, 4, 6]).halt_when_exhausted();
        let results: Vec<_> = ChunkDrainer::new("s", &source, plan(8, 4, 16)).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(DaqError::SourceStopped {
                consumed: 4,
                expected: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_cancelled_session_stops_drain() {
        let session = SessionState::new();
        let source = ScriptedSource::new(8, vec![0]);
        let mut drainer = ChunkDrainer::new("s", &source, plan(8, 4, 8)).with_session(&session);
        session.cancel();
        assert!(matches!(drainer.next(), Some(Err(DaqError::Cancelled))));
        assert!(drainer.next().is_none());
    }

    #[test]
    fn test_timestamps_follow_row_index() {
        // One new row per poll-and-recheck pair keeps the backlog at one row.
        let trace = (1..=1200).flat_map(|v| [v, v]).collect();
        let source = ScriptedSource::new(4, trace);
        let chunks: Vec<Chunk> = ChunkDrainer::new("s", &source, plan(4, 1, 1200))
            .collect::<AppResult<_>>()
            .unwrap();
        assert_eq!(chunks[250].timestamp, 2.5);
        assert_eq!(chunks[1000].timestamp, 10.0);
        assert_eq!(chunks[1].timestamp, 0.01);
    }

    #[test]
    fn test_drain_into_sink() {
        let source = ScriptedSource::steady(6, 2, 6);
        let mut sink: Vec<Chunk> = Vec::new();
        let stats = ChunkDrainer::new("s", &source, plan(6, 2, 6))
            .drain_into(&mut sink)
            .unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(sink.len(), 3);
    }
}
