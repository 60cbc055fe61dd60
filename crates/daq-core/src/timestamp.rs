//! Synthetic time axis derived from a nominal rate.
//!
//! Timestamps are a pure function of the row counter. Poll-loop jitter,
//! scheduling noise and arrival time never enter the computation, so row `i`
//! at rate `r` is always stamped `i / r`.

/// Assigns `t(i) = i / rate` to row `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateTimestamper {
    rate_hz: u32,
}

impl RateTimestamper {
    /// Create a timestamper for `rate_hz` rows per second. `rate_hz` must be non-zero.
    pub const fn new(rate_hz: u32) -> Self {
        Self { rate_hz }
    }

    /// Nominal rate in rows per second.
    pub const fn rate_hz(&self) -> u32 {
        self.rate_hz
    }

    /// Timestamp in seconds of row `row`.
    ///
    /// Computed as one correctly rounded division of two exact integers
    /// (exact below 2^53 rows) instead of accumulating `1 / rate`.
    pub fn timestamp(&self, row: u64) -> f64 {
        row as f64 / f64::from(self.rate_hz)
    }

    /// Sample interval in seconds.
    pub fn interval(&self) -> f64 {
        1.0 / f64::from(self.rate_hz)
    }

    /// Number of rows covering `[0, duration_s]` inclusive of both ends.
    pub fn rows_for(&self, duration_s: u32) -> u64 {
        u64::from(self.rate_hz) * u64::from(duration_s) + 1
    }

    /// Row of a coarser stream that lands exactly on `row` of this one.
    ///
    /// Row `i` at rate `R` is the instant `i / R`; it coincides with row `j` at
    /// `other_rate_hz` (`r`) iff `i * r` is divisible by `R`, in which case
    /// `j = i * r / R`. Integer arithmetic throughout, so alignment never drifts.
    pub fn aligned_row(&self, row: u64, other_rate_hz: u32) -> Option<u64> {
        let scaled = u128::from(row) * u128::from(other_rate_hz);
        let rate = u128::from(self.rate_hz);
        if rate == 0 || scaled % rate != 0 {
            return None;
        }
        u64::try_from(scaled / rate).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_exact_for_decimal_rates() {
        let ts = RateTimestamper::new(100);
        assert_eq!(ts.timestamp(0), 0.0);
        assert_eq!(ts.timestamp(250), 2.5);
        assert_eq!(ts.timestamp(1), 0.01);

        let ts = RateTimestamper::new(1000);
        assert_eq!(ts.timestamp(2000), 2.0);
        assert_eq!(ts.timestamp(1234), 1.234);
    }

    #[test]
    fn test_timestamp_does_not_accumulate_error() {
        let ts = RateTimestamper::new(300);
        assert_eq!(ts.timestamp(300_000), 1000.0);
        assert_eq!(ts.timestamp(3 * 3600 * 300), 3.0 * 3600.0);
    }

    #[test]
    fn test_rows_for_duration() {
        assert_eq!(RateTimestamper::new(1000).rows_for(2), 2001);
        assert_eq!(RateTimestamper::new(100).rows_for(1), 101);
    }

    #[test]
    fn test_aligned_row_every_tenth() {
        let hw = RateTimestamper::new(1000);
        let aligned: Vec<_> = (0..100).filter_map(|i| hw.aligned_row(i, 100)).collect();
        assert_eq!(aligned, (0..10).collect::<Vec<_>>());
        assert_eq!(hw.aligned_row(10, 100), Some(1));
        assert_eq!(hw.aligned_row(11, 100), None);
    }

    #[test]
    fn test_aligned_row_non_integer_ratio() {
        // 300 Hz against 100 Hz: every third row.
        let hw = RateTimestamper::new(300);
        assert_eq!(hw.aligned_row(3, 100), Some(1));
        assert_eq!(hw.aligned_row(4, 100), None);

        // 250 Hz against 100 Hz: rows 0, 5, 10 -> sensor rows 0, 2, 4.
        let hw = RateTimestamper::new(250);
        assert_eq!(hw.aligned_row(5, 100), Some(2));
        assert_eq!(hw.aligned_row(2, 100), None);
    }
}
