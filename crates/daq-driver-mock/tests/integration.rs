//! Integration tests for the mock collaborators
//!
//! These tests drive the mocks only through the `daq-core` traits, the way
//! the acquisition pipelines use them.

use std::thread;
use std::time::{Duration, Instant};

use daq_core::error::DaqError;
use daq_core::serial::SerialLink;
use daq_core::session::ChannelRange;
use daq_core::source::{CircularSource, ScanRequest};
use daq_driver_mock::*;

fn wait_for(source: &dyn CircularSource, samples: u64) -> u64 {
    let deadline = Instant::now() + Duration::from_secs(3);
    while source.produced_count() < samples && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(2));
    }
    source.produced_count()
}

/// Ring content matches the deterministic analog pattern, interleaved by channel
#[test]
fn test_ring_holds_interleaved_pattern() {
    let channels = ChannelRange::new(0, 2).unwrap();
    let mut source: Box<dyn CircularSource> =
        Box::new(MockCircularSource::new(MockSourceConfig::default()));
    source
        .start(&ScanRequest {
            rate_hz: 500,
            channels,
            capacity: 3 * 400,
        })
        .unwrap();

    assert!(wait_for(source.as_ref(), 30) >= 30);
    let mut row = [0.0; 3];
    source.copy_range(6, &mut row).unwrap();
    for (ch, value) in row.iter().enumerate() {
        assert_eq!(*value, pattern::analog_sample(ch, 2, 500));
    }
    source.stop().unwrap();
}

/// Produced count grows at roughly the requested rate
#[test]
fn test_ring_rate_is_close_to_requested() {
    let mut source = MockCircularSource::new(MockSourceConfig::default());
    source
        .start(&ScanRequest {
            rate_hz: 1000,
            channels: ChannelRange::new(0, 0).unwrap(),
            capacity: 5000,
        })
        .unwrap();
    let started = Instant::now();
    thread::sleep(Duration::from_millis(200));
    let produced = source.produced_count();
    let elapsed = started.elapsed().as_secs_f64();
    source.stop().unwrap();

    let expected = elapsed * 1000.0;
    assert!(produced as f64 > expected * 0.5, "produced {}", produced);
    assert!(produced as f64 <= expected * 1.5 + 10.0, "produced {}", produced);
}

/// Sensor boot sequence is preamble, startup line, samples
#[test]
fn test_sensor_lines_through_trait() {
    let mut link: Box<dyn SerialLink> =
        Box::new(MockSerialLink::open(MockSensorConfig::exact(2)).unwrap());
    link.clear_input().unwrap();

    let mut startup_seen = false;
    for _ in 0..10 {
        if link.read_line().unwrap().as_deref()
            == Some("One Axis ADS initialization succeeded...")
        {
            startup_seen = true;
            break;
        }
    }
    assert!(startup_seen);

    let mut samples = Vec::new();
    while let Some(line) = link.read_line().unwrap() {
        samples.push(line.parse::<f64>().unwrap());
    }
    assert_eq!(samples.len(), 201);
    assert_eq!(samples[0], pattern::flex_angle(0, 100));
}

/// Paced sensor releases lines no faster than its rate
#[test]
fn test_realistic_sensor_is_paced() {
    let config = MockSensorConfig {
        timing: TimingConfig::default(),
        preamble: Vec::new(),
        ..MockSensorConfig::realistic()
    };
    let mut link = MockSerialLink::open(config).unwrap();
    link.read_line().unwrap();

    let started = Instant::now();
    for _ in 0..11 {
        link.read_line().unwrap();
    }
    // Ten periods at 100 Hz
    assert!(started.elapsed() >= Duration::from_millis(95));
}

/// Setup faults map onto the session error taxonomy
#[test]
fn test_setup_faults() {
    let mut board = MockCircularSource::new(MockSourceConfig {
        errors: ErrorConfig::scenario(ErrorScenario::HardwareFault { code: 42 }),
        ..MockSourceConfig::default()
    });
    let err = board
        .start(&ScanRequest {
            rate_hz: 1000,
            channels: ChannelRange::new(0, 1).unwrap(),
            capacity: 20,
        })
        .unwrap_err();
    assert!(err.is_setup_failure());
    assert!(err.to_string().contains("42"));

    let err = MockSerialLink::open(MockSensorConfig {
        errors: ErrorConfig::scenario(ErrorScenario::DeviceMissing),
        ..MockSensorConfig::default()
    })
    .unwrap_err();
    assert!(matches!(err, DaqError::PortUnavailable { .. }));
}

/// Seeded configs replay identically
#[test]
fn test_random_errors_with_seed() {
    let config1 = ErrorConfig::random_failures_seeded(0.5, Some(12345));
    let config2 = ErrorConfig::random_failures_seeded(0.5, Some(12345));
    let run = |config: &ErrorConfig| -> Vec<bool> {
        (0..32)
            .map(|_| config.check_operation("mock-ring", "start").is_ok())
            .collect()
    };
    assert_eq!(run(&config1), run(&config2));
}

/// Scripted source replays its trace through the trait object
#[test]
fn test_scripted_source_as_trait_object() {
    let source: Box<dyn CircularSource> = Box::new(ScriptedSource::steady(8, 4, 8));
    assert_eq!(source.produced_count(), 4);
    let mut out = [0.0; 4];
    source.copy_range(0, &mut out).unwrap();
    assert_eq!(out, [0.0, 1.0, 2.0, 3.0]);
    assert_eq!(source.info().unique_id, "SCRIPT-8");
}
