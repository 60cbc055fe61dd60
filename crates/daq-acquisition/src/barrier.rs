//! Abortable start barrier.
//!
//! Every stream finishes its own setup, then waits here; all of them are
//! released together so their timestamp-zero instants line up to within
//! scheduling jitter instead of setup time. Unlike `std::sync::Barrier` this
//! one can be torn down: when a stream fails during setup it aborts the
//! barrier and the streams already waiting return `BarrierAborted` instead of
//! blocking forever.

use std::time::{Duration, Instant};

use daq_core::error::{AppResult, DaqError};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// Release-all-at-once barrier for `parties` streams.
#[derive(Debug)]
pub struct StartBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    released: Condvar,
}

/// What a party observed when the barrier released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierRelease {
    /// True for exactly one party per release: the last to arrive.
    pub is_leader: bool,
    /// Instant this party returned from `wait`.
    pub released_at: Instant,
}

impl StartBarrier {
    /// Barrier for `parties` participants. Zero is treated as one.
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
        }
    }

    /// Number of participants.
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Block until every party has arrived.
    ///
    /// # Errors
    ///
    /// `BarrierAborted` if the barrier was aborted before or while waiting,
    /// or if `timeout` elapsed first (which also aborts it for everyone).
    pub fn wait(&self, timeout: Duration) -> AppResult<BarrierRelease> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        if state.aborted {
            return Err(DaqError::BarrierAborted);
        }

        let generation = state.generation;
        state.arrived += 1;
        debug!(arrived = state.arrived, parties = self.parties, "Stream at start barrier");

        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            info!(parties = self.parties, "Start barrier released");
            return Ok(BarrierRelease {
                is_leader: true,
                released_at: Instant::now(),
            });
        }

        while state.generation == generation && !state.aborted {
            if self.released.wait_until(&mut state, deadline).timed_out() {
                if state.generation != generation {
                    break;
                }
                warn!(
                    arrived = state.arrived,
                    parties = self.parties,
                    "Start barrier timed out"
                );
                state.aborted = true;
                self.released.notify_all();
                return Err(DaqError::BarrierAborted);
            }
        }

        if state.generation == generation {
            return Err(DaqError::BarrierAborted);
        }
        Ok(BarrierRelease {
            is_leader: false,
            released_at: Instant::now(),
        })
    }

    /// Tear the barrier down, waking every waiting party with `BarrierAborted`.
    ///
    /// Parties arriving later fail immediately. Idempotent.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        if !state.aborted {
            state.aborted = true;
            self.released.notify_all();
            debug!(arrived = state.arrived, "Start barrier aborted");
        }
    }

    /// True once aborted.
    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const LONG: Duration = Duration::from_secs(5);

    #[test]
    fn test_single_party_passes() {
        let barrier = StartBarrier::new(1);
        assert!(barrier.wait(LONG).unwrap().is_leader);
    }

    #[test]
    fn test_releases_all_with_one_leader() {
        let barrier = Arc::new(StartBarrier::new(3));
        let handles: Vec<_> = (0..3)
            .map(|i| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(20 * i));
                    barrier.wait(LONG).unwrap()
                })
            })
            .collect();
        let releases: Vec<BarrierRelease> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(releases.iter().filter(|r| r.is_leader).count(), 1);
    }

    #[test]
    fn test_abort_wakes_waiters() {
        let barrier = Arc::new(StartBarrier::new(3));
        let waiter = {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || barrier.wait(LONG))
        };
        thread::sleep(Duration::from_millis(30));
        barrier.abort();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(DaqError::BarrierAborted)
        ));
        assert!(barrier.is_aborted());
        assert!(matches!(barrier.wait(LONG), Err(DaqError::BarrierAborted)));
    }

    #[test]
    fn test_timeout_aborts() {
        let barrier = StartBarrier::new(2);
        let started = Instant::now();
        assert!(matches!(
            barrier.wait(Duration::from_millis(30)),
            Err(DaqError::BarrierAborted)
        ));
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(barrier.is_aborted());
    }

    #[test]
    fn test_zero_parties_is_one() {
        assert_eq!(StartBarrier::new(0).parties(), 1);
    }
}
