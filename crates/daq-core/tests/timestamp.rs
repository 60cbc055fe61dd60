//! Integration tests for the synthetic time axis and ring geometry.

use daq_core::{ChannelRange, RateTimestamper, ScanGeometry};

#[test]
fn test_rows_match_geometry_budget() {
    let channels = ChannelRange::new(0, 6).unwrap();
    for (rate, duration) in [(200, 1), (1000, 2), (2500, 4)] {
        let geometry = ScanGeometry::compute(rate, duration, channels, 1).unwrap();
        let ts = RateTimestamper::new(rate);
        assert_eq!(geometry.rows(), ts.rows_for(duration));
        assert_eq!(ts.timestamp(geometry.rows() - 1), f64::from(duration));
    }
}

#[test]
fn test_last_row_of_packet_rounded_ring_is_past_duration() {
    let channels = ChannelRange::new(0, 1).unwrap();
    let geometry = ScanGeometry::compute(1000, 2, channels, 64).unwrap();
    let ts = RateTimestamper::new(1000);
    assert!(geometry.rows() > ts.rows_for(2));
    assert!(ts.timestamp(geometry.rows() - 1) > 2.0);
}

#[test]
fn test_sensor_alignment_over_full_session() {
    let hw = RateTimestamper::new(1000);
    let sensor = RateTimestamper::new(100);
    let rows = hw.rows_for(2);

    let mut populated = 0;
    for row in 0..rows {
        if let Some(j) = hw.aligned_row(row, sensor.rate_hz()) {
            assert_eq!(hw.timestamp(row), sensor.timestamp(j));
            populated += 1;
        }
    }
    assert_eq!(populated as u64, sensor.rows_for(2));
}
