//! Stream specs built from the loaded configuration.
//!
//! Hardware boards are always simulated here: no vendor backend is compiled
//! in. The flex sensor uses the real serial port when the `serial` feature is
//! enabled and `--simulate` is not given.

use daq_acquisition::{HardwareStreamSpec, SensorStreamSpec};
use daq_core::config::{AcquisitionConfig, HardwareStreamConfig, SerialSensorConfig};
use daq_core::error::AppResult;
use daq_core::serial::SerialLink;
use daq_core::source::CircularSource;
use daq_driver_mock::{MockCircularSource, MockSensorConfig, MockSerialLink, MockSourceConfig};
use tracing::info;

/// Specs for every `[[hardware]]` entry, in configuration order.
pub fn hardware_specs(config: &AcquisitionConfig) -> AppResult<Vec<HardwareStreamSpec>> {
    config.hardware.iter().map(hardware_spec).collect()
}

fn hardware_spec(stream: &HardwareStreamConfig) -> AppResult<HardwareStreamSpec> {
    let mock = MockSourceConfig {
        unique_id: format!("MOCK{:04}", stream.board),
        ..MockSourceConfig::realistic(format!("Simulated board {}", stream.board))
    };
    info!(stream = %stream.name, board = stream.board, "Using simulated board");

    Ok(HardwareStreamSpec {
        name: stream.name.clone(),
        channels: stream.channels()?,
        labels: stream.labels.clone(),
        packet_size: stream.packet_size,
        detach: stream.detach.clone(),
        open: Box::new(move || -> AppResult<Box<dyn CircularSource>> {
            Ok(Box::new(MockCircularSource::new(mock)))
        }),
    })
}

/// Spec for the `[serial]` sensor, or `None` when it is disabled.
pub fn sensor_spec(config: &AcquisitionConfig, simulate: bool) -> Option<SensorStreamSpec> {
    let sensor = &config.serial;
    if !sensor.enabled {
        return None;
    }
    Some(SensorStreamSpec {
        name: sensor.name.clone(),
        rate_hz: sensor.rate_hz,
        startup_line: sensor.startup_line.clone(),
        column_label: sensor.column_label.clone(),
        open: link_opener(sensor, simulate),
    })
}

fn simulated_link(sensor: &SerialSensorConfig) -> daq_acquisition::LinkOpener {
    let mock = MockSensorConfig {
        port: format!("SIM-{}", sensor.port),
        startup_line: sensor.startup_line.clone(),
        rate_hz: sensor.rate_hz,
        ..MockSensorConfig::realistic()
    };
    info!(port = %mock.port, "Using simulated flex sensor");
    Box::new(move || -> AppResult<Box<dyn SerialLink>> {
        Ok(Box::new(MockSerialLink::open(mock)?))
    })
}

#[cfg(feature = "serial")]
fn link_opener(sensor: &SerialSensorConfig, simulate: bool) -> daq_acquisition::LinkOpener {
    if simulate {
        return simulated_link(sensor);
    }
    let port = sensor.port.clone();
    let baud = sensor.baud;
    Box::new(move || -> AppResult<Box<dyn SerialLink>> {
        Ok(Box::new(daq_core::serial::open_serial(&port, baud)?))
    })
}

#[cfg(not(feature = "serial"))]
fn link_opener(sensor: &SerialSensorConfig, _simulate: bool) -> daq_acquisition::LinkOpener {
    simulated_link(sensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specs_follow_config_order() {
        let config = AcquisitionConfig::default();
        let specs = hardware_specs(&config).unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Carotid and Femoral", "Chest Strap Piezos"]);
        assert_eq!(specs[1].channels.len(), 7);
        assert_eq!(specs[1].detach.len(), 1);
    }

    #[test]
    fn test_disabled_sensor_has_no_spec() {
        let mut config = AcquisitionConfig::default();
        assert!(sensor_spec(&config, true).is_some());
        config.serial.enabled = false;
        assert!(sensor_spec(&config, true).is_none());
    }
}
