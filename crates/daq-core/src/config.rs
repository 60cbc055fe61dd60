//! Acquisition configuration using Figment.
//!
//! Configuration is layered, later layers overriding earlier ones:
//! 1. Built-in defaults (the two-board + flex sensor deployment)
//! 2. `config/acquisition.toml` (or an explicit path)
//! 3. Environment variables prefixed with `DAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use daq_core::config::AcquisitionConfig;
//!
//! let config = AcquisitionConfig::load()?;
//! config.validate()?;
//! println!("Scanning at {} Hz", config.session.rate_hz);
//! # Ok::<(), daq_core::error::DaqError>(())
//! ```
//!
//! Environment override: `DAQ_SESSION__RATE_HZ=2000`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DaqError};
use crate::limits::{DEFAULT_SENSOR_BAUD, DEFAULT_SENSOR_RATE_HZ, DRAIN_POLL_INTERVAL};
use crate::session::{ChannelRange, OutputMode, SessionParams};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/acquisition.toml";

/// Top-level acquisition configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Session defaults (overridable from the command line)
    pub session: SessionConfig,
    /// Drain loop tuning
    pub drain: DrainConfig,
    /// Hardware streams, in merged-column order
    pub hardware: Vec<HardwareStreamConfig>,
    /// Serial flex sensor
    pub serial: SerialSensorConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory output tables are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

/// Session defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Hardware scan rate in scans per second
    pub rate_hz: u32,
    /// Recording duration in seconds
    pub duration_s: u32,
    /// Output arrangement
    #[serde(default)]
    pub output_mode: OutputMode,
    /// Subject or run label used in file names
    #[serde(default = "default_subject")]
    pub subject: String,
}

/// Drain loop tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrainConfig {
    /// Sleep between polls when less than a chunk is available
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How long a source may take to report running after start
    #[serde(default = "default_source_start_timeout")]
    pub source_start_timeout_ms: u64,
    /// How long a ready stream waits for the others at the start barrier
    #[serde(default = "default_barrier_timeout")]
    pub barrier_timeout_ms: u64,
}

/// One hardware acquisition board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareStreamConfig {
    /// Stream name, also used in intermediate file names
    pub name: String,
    /// Board number
    #[serde(default)]
    pub board: u32,
    /// First channel scanned
    pub low_channel: u32,
    /// Last channel scanned (inclusive)
    pub high_channel: u32,
    /// Transfer packet size in points per channel (1 = unconstrained)
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,
    /// Column label per channel
    pub labels: Vec<String>,
    /// Column groups split into their own file in separate mode
    #[serde(default)]
    pub detach: Vec<DetachGroup>,
}

/// Columns moved from a hardware table into their own file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetachGroup {
    /// Group name used in the file name
    pub group: String,
    /// Column labels moved
    pub columns: Vec<String>,
}

/// File-name form of a stream or column-group name.
///
/// Characters not allowed in file names on common platforms become `_` and
/// surrounding whitespace is trimmed. Two names with the same part share a
/// file.
pub fn file_part(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Reject stream and detach-group names that would write the same file.
///
/// Every stream owns `<stem> -- <stream> .csv` and every detach group
/// `<stem> -- <group> .csv`, so all of them must differ after [`file_part`].
pub fn check_file_parts<'a>(
    streams: impl IntoIterator<Item = &'a str>,
    groups: impl IntoIterator<Item = &'a str>,
) -> AppResult<()> {
    let mut owners: HashMap<String, String> = HashMap::new();
    let named = streams
        .into_iter()
        .map(|name| (name, format!("stream '{name}'")))
        .chain(
            groups
                .into_iter()
                .map(|name| (name, format!("detach group '{name}'"))),
        );
    for (name, owner) in named {
        let part = file_part(name);
        if part.is_empty() {
            return Err(DaqError::Configuration(format!(
                "{owner} has no usable file name"
            )));
        }
        if let Some(previous) = owners.get(&part) {
            return Err(DaqError::Configuration(format!(
                "{owner} and {previous} would both write '{part}'"
            )));
        }
        owners.insert(part, owner);
    }
    Ok(())
}

/// Serial flex sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialSensorConfig {
    /// Whether the sensor participates in the session
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Stream name
    #[serde(default = "default_sensor_name")]
    pub name: String,
    /// Port name, e.g. `COM3` or `/dev/ttyACM0`
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Line the sensor prints once ready; everything up to it is discarded
    #[serde(default = "default_startup_line")]
    pub startup_line: String,
    /// Native line rate
    #[serde(default = "default_sensor_rate")]
    pub rate_hz: u32,
    /// Output column label
    #[serde(default = "default_sensor_label")]
    pub column_label: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_subject() -> String {
    "subject".to_string()
}

fn default_poll_interval() -> u64 {
    DRAIN_POLL_INTERVAL.as_millis() as u64
}

fn default_source_start_timeout() -> u64 {
    crate::limits::SOURCE_START_TIMEOUT.as_millis() as u64
}

fn default_barrier_timeout() -> u64 {
    crate::limits::BARRIER_TIMEOUT.as_millis() as u64
}

fn default_packet_size() -> usize {
    1
}

fn default_enabled() -> bool {
    true
}

fn default_sensor_name() -> String {
    "Flex Sensor".to_string()
}

fn default_baud() -> u32 {
    DEFAULT_SENSOR_BAUD
}

fn default_startup_line() -> String {
    "One Axis ADS initialization succeeded...".to_string()
}

fn default_sensor_rate() -> u32 {
    DEFAULT_SENSOR_RATE_HZ
}

fn default_sensor_label() -> String {
    "Angular Displacement (deg)".to_string()
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        let mut piezo_labels: Vec<String> =
            (0..6).map(|ch| format!("Piezo Channel {} (V)", ch)).collect();
        piezo_labels.push("Electrode (V)".to_string());

        Self {
            application: ApplicationConfig {
                log_level: default_log_level(),
                output_dir: default_output_dir(),
            },
            session: SessionConfig {
                rate_hz: 1000,
                duration_s: 10,
                output_mode: OutputMode::Merged,
                subject: default_subject(),
            },
            drain: DrainConfig {
                poll_interval_ms: default_poll_interval(),
                source_start_timeout_ms: default_source_start_timeout(),
                barrier_timeout_ms: default_barrier_timeout(),
            },
            hardware: vec![
                HardwareStreamConfig {
                    name: "Carotid and Femoral".to_string(),
                    board: 1,
                    low_channel: 0,
                    high_channel: 1,
                    packet_size: 1,
                    labels: vec![
                        "Carotid Piezo (V)".to_string(),
                        "Femoral Piezo (V)".to_string(),
                    ],
                    detach: Vec::new(),
                },
                HardwareStreamConfig {
                    name: "Chest Strap Piezos".to_string(),
                    board: 0,
                    low_channel: 0,
                    high_channel: 6,
                    packet_size: 1,
                    labels: piezo_labels,
                    detach: vec![DetachGroup {
                        group: "Electrodes".to_string(),
                        columns: vec!["Electrode (V)".to_string()],
                    }],
                },
            ],
            serial: SerialSensorConfig {
                enabled: true,
                name: default_sensor_name(),
                port: "COM3".to_string(),
                baud: default_baud(),
                startup_line: default_startup_line(),
                rate_hz: default_sensor_rate(),
                column_label: default_sensor_label(),
            },
        }
    }
}

impl HardwareStreamConfig {
    /// Channel range scanned by this board.
    pub fn channels(&self) -> AppResult<ChannelRange> {
        ChannelRange::new(self.low_channel, self.high_channel)
    }
}

impl AcquisitionConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and environment variables.
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and environment variables.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The layered provider, exposed so callers can merge further overrides.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(AcquisitionConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DAQ_").split("__"))
    }

    /// Session parameters from the `[session]` table.
    pub fn session_params(&self) -> AppResult<SessionParams> {
        SessionParams::builder()
            .rate_hz(self.session.rate_hz)
            .duration_s(self.session.duration_s)
            .output_mode(self.session.output_mode)
            .subject(self.session.subject.clone())
            .build()
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.session_params()?;

        if self.drain.poll_interval_ms == 0 {
            return Err(DaqError::Configuration(
                "drain.poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.hardware.is_empty() {
            return Err(DaqError::Configuration(
                "At least one [[hardware]] stream is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for stream in &self.hardware {
            if !names.insert(stream.name.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate stream name: {}",
                    stream.name
                )));
            }

            let channels = stream.channels()?;
            if stream.labels.len() != channels.len() {
                return Err(DaqError::Configuration(format!(
                    "Stream '{}' scans {} channels but has {} labels",
                    stream.name,
                    channels.len(),
                    stream.labels.len()
                )));
            }

            if stream.packet_size == 0 {
                return Err(DaqError::Configuration(format!(
                    "Stream '{}' packet_size must be at least 1",
                    stream.name
                )));
            }

            for group in &stream.detach {
                if let Some(missing) = group.columns.iter().find(|c| !stream.labels.contains(c)) {
                    return Err(DaqError::Configuration(format!(
                        "Stream '{}' detach group '{}' names unknown column '{}'",
                        stream.name, group.group, missing
                    )));
                }
            }
        }

        if self.serial.enabled {
            if self.serial.rate_hz == 0 {
                return Err(DaqError::Configuration(
                    "serial.rate_hz must be greater than 0".to_string(),
                ));
            }
            if !names.insert(self.serial.name.as_str()) {
                return Err(DaqError::Configuration(format!(
                    "Duplicate stream name: {}",
                    self.serial.name
                )));
            }
        }

        let streams = self.hardware.iter().map(|h| h.name.as_str()).chain(
            self.serial
                .enabled
                .then_some(self.serial.name.as_str()),
        );
        let groups = self
            .hardware
            .iter()
            .flat_map(|h| h.detach.iter().map(|g| g.group.as_str()));
        check_file_parts(streams, groups)?;

        Ok(())
    }

    /// Number of streams that meet at the start barrier.
    pub fn stream_count(&self) -> usize {
        self.hardware.len() + usize::from(self.serial.enabled)
    }
}
