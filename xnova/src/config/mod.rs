//! Controller configuration loading and validation.
//!
//! Every value is fixed for the lifetime of the process: the file is read
//! once at startup, CLI overrides are applied on top, and the result is
//! validated before any line is claimed.
//!
//! The expected YAML structure is (every key optional):
//! ```yaml
//! gpio:
//!   chip: /dev/gpiochip0
//!   open_line: 79
//!   close_line: 80
//!   autoclose_line: 81
//! timing:
//!   pulse_on_ms: 60
//!   idle_interval_ms: 2500
//!   activation_ms: 1000
//!   cooldown_ms: 2000
//! socket: /run/xnova/xnova.sock
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

// ── Defaults ──────────────────────────────────────────────────────────────────

pub const DEFAULT_CHIP: &str = "/dev/gpiochip0";
pub const DEFAULT_OPEN_LINE: u32 = 79;
pub const DEFAULT_CLOSE_LINE: u32 = 80;
pub const DEFAULT_AUTOCLOSE_LINE: u32 = 81;

/// Keep-alive pulse width.
pub const DEFAULT_PULSE_ON_MS: u64 = 60;
/// Low time between keep-alive pulses.  The actuator sleeps after ~3 s.
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 2500;
/// Activation pulse width.
pub const DEFAULT_ACTIVATION_MS: u64 = 1000;
/// Delay between the end of an activation and the next keep-alive phase.
pub const DEFAULT_COOLDOWN_MS: u64 = 2000;

pub const DEFAULT_SOCKET_PATH: &str = "/run/xnova/xnova.sock";

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    gpio: GpioSection,
    #[serde(default)]
    timing: TimingSection,
    socket: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GpioSection {
    chip: Option<PathBuf>,
    open_line: Option<u32>,
    close_line: Option<u32>,
    autoclose_line: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TimingSection {
    pulse_on_ms: Option<u64>,
    idle_interval_ms: Option<u64>,
    activation_ms: Option<u64>,
    cooldown_ms: Option<u64>,
}

// ── Public data structures ────────────────────────────────────────────────────

/// Where the three control lines live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioConfig {
    /// GPIO character device, e.g. `/dev/gpiochip0`.
    pub chip: PathBuf,
    /// Line offsets on `chip`.
    pub open_line: u32,
    pub close_line: u32,
    pub autoclose_line: u32,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            chip: PathBuf::from(DEFAULT_CHIP),
            open_line: DEFAULT_OPEN_LINE,
            close_line: DEFAULT_CLOSE_LINE,
            autoclose_line: DEFAULT_AUTOCLOSE_LINE,
        }
    }
}

/// Pulse timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Keep-alive high phase.
    pub pulse_on: Duration,
    /// Keep-alive low phase.
    pub idle_interval: Duration,
    /// Activation high time.
    pub activation: Duration,
    /// Delay before the keep-alive train resumes after an activation.
    pub cooldown: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            pulse_on: Duration::from_millis(DEFAULT_PULSE_ON_MS),
            idle_interval: Duration::from_millis(DEFAULT_IDLE_INTERVAL_MS),
            activation: Duration::from_millis(DEFAULT_ACTIVATION_MS),
            cooldown: Duration::from_millis(DEFAULT_COOLDOWN_MS),
        }
    }
}

/// Complete controller configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XnovaConfig {
    pub gpio: GpioConfig,
    pub timing: Timing,
    /// Unix socket the command channel listens on.
    pub socket: PathBuf,
}

impl Default for XnovaConfig {
    fn default() -> Self {
        Self {
            gpio: GpioConfig::default(),
            timing: Timing::default(),
            socket: PathBuf::from(DEFAULT_SOCKET_PATH),
        }
    }
}

/// A configuration that parsed but cannot drive the actuator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("timing.{field} must be greater than zero")]
    ZeroDuration { field: &'static str },

    #[error("gpio.{first} and gpio.{second} both use line offset {offset}")]
    DuplicateLine {
        first: &'static str,
        second: &'static str,
        offset: u32,
    },
}

impl XnovaConfig {
    /// Parses `path`, filling every missing key with its default.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, is not valid YAML, or
    /// contains unknown keys.  Values are not validated here; call
    /// [`validate`](Self::validate) after applying overrides.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading controller configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to `()`, not to an empty map.
        let file: ConfigFile = if content.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(content)?
        };

        let defaults = Self::default();
        let ms = |v: Option<u64>, d: Duration| v.map(Duration::from_millis).unwrap_or(d);

        Ok(Self {
            gpio: GpioConfig {
                chip: file.gpio.chip.unwrap_or(defaults.gpio.chip),
                open_line: file.gpio.open_line.unwrap_or(defaults.gpio.open_line),
                close_line: file.gpio.close_line.unwrap_or(defaults.gpio.close_line),
                autoclose_line: file
                    .gpio
                    .autoclose_line
                    .unwrap_or(defaults.gpio.autoclose_line),
            },
            timing: Timing {
                pulse_on: ms(file.timing.pulse_on_ms, defaults.timing.pulse_on),
                idle_interval: ms(file.timing.idle_interval_ms, defaults.timing.idle_interval),
                activation: ms(file.timing.activation_ms, defaults.timing.activation),
                cooldown: ms(file.timing.cooldown_ms, defaults.timing.cooldown),
            },
            socket: file.socket.unwrap_or(defaults.socket),
        })
    }

    /// Rejects zero durations and line offsets shared by two functions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let durations = [
            ("pulse_on_ms", self.timing.pulse_on),
            ("idle_interval_ms", self.timing.idle_interval),
            ("activation_ms", self.timing.activation),
            ("cooldown_ms", self.timing.cooldown),
        ];
        for (field, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration { field });
            }
        }

        let lines = [
            ("open_line", self.gpio.open_line),
            ("close_line", self.gpio.close_line),
            ("autoclose_line", self.gpio.autoclose_line),
        ];
        for (i, (first, offset)) in lines.iter().enumerate() {
            if let Some((second, _)) = lines[i + 1..].iter().find(|(_, o)| o == offset) {
                return Err(ConfigError::DuplicateLine {
                    first: *first,
                    second: *second,
                    offset: *offset,
                });
            }
        }

        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
