//! Drain a whole scan budget into a CSV sink.

use std::fs;
use std::time::Duration;

use daq_acquisition::{ChunkDrainer, DrainPlan};
use daq_core::session::{ChannelRange, ScanGeometry};
use daq_driver_mock::ScriptedSource;
use daq_storage::CsvSinkWriter;
use tempfile::TempDir;

#[test]
fn test_two_channels_two_seconds_at_1khz() {
    let geometry = ScanGeometry::compute(1000, 2, ChannelRange::new(0, 1).unwrap(), 1).unwrap();
    assert_eq!(geometry.capacity, 4002);
    assert_eq!(geometry.chunk_size, 2);
    assert_eq!(geometry.points_to_write, 4002);

    let plan = DrainPlan::from_geometry(&geometry, 1000)
        .unwrap()
        .with_poll_interval(Duration::ZERO);
    let source = ScriptedSource::steady(4002, 1, 4002);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("scan.csv");
    let mut sink = CsvSinkWriter::builder()
        .output_path(&path)
        .labels(["ch0", "ch1"])
        .create()
        .unwrap();

    let stats = ChunkDrainer::new("board0", &source, plan)
        .drain_into(&mut sink)
        .unwrap();
    assert_eq!(stats.chunks, 2001);
    assert_eq!(sink.stats().rows_written, 2001);

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2002);
    assert_eq!(lines[0], "Time (s),ch0,ch1");
    assert_eq!(lines[1], "0,0,1");
    assert_eq!(lines[2], "0.001,2,3");
    assert_eq!(lines[2001], "2,4000,4001");
}

#[test]
fn test_ring_smaller_than_budget_wraps_cleanly() {
    // One chunk produced per chunk drained; the budget spans three laps.
    let source = ScriptedSource::steady(64, 2, 192);
    let plan = DrainPlan::new(64, 4, 192, 500)
        .unwrap()
        .with_poll_interval(Duration::ZERO);

    let samples: Vec<f64> = ChunkDrainer::new("board0", &source, plan)
        .flat_map(|chunk| chunk.unwrap().samples)
        .collect();
    let expected: Vec<f64> = (0..192).map(f64::from).collect();
    assert_eq!(samples, expected);
}
