//! Acquisition parameters
//!
//! Holds decimation, buffer length, pre-trigger samples and trigger settings.
//! Values are validated on construction and on deserialization, so an
//! [`AcquisitionConfig`] held by the engine is always within instrument limits.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Allowed capture buffer lengths
pub const BUFFER_SIZE_RANGE: std::ops::RangeInclusive<usize> = 10..=16384;

/// Allowed pre-trigger sample counts
pub const PRETRIGGER_RANGE: std::ops::RangeInclusive<usize> = 0..=8192;

/// Allowed trigger levels in volts
pub const TRIGGER_LEVEL_RANGE: std::ops::RangeInclusive<f64> = -20.0..=20.0;

/// Errors raised when a configuration value is outside instrument limits
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid decimation {0} (expected 1, 8, 64, 1024, 8192 or 65536)")]
    InvalidDecimation(u32),

    #[error("Buffer size {0} out of range (10-16384)")]
    BufferSizeOutOfRange(usize),

    #[error("Pre-trigger samples {0} out of range (0-8192)")]
    PretriggerOutOfRange(usize),

    #[error("Trigger level {0} V out of range (-20 to 20 V)")]
    TriggerLevelOutOfRange(f64),

    #[error("Unknown trigger source: {0}")]
    UnknownTriggerSource(String),
}

/// Decimation factor applied to the 125 MS/s base clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Decimation {
    X1,
    X8,
    X64,
    X1024,
    X8192,
    X65536,
}

impl Decimation {
    /// All supported factors, fastest first
    pub const ALL: [Decimation; 6] = [
        Decimation::X1,
        Decimation::X8,
        Decimation::X64,
        Decimation::X1024,
        Decimation::X8192,
        Decimation::X65536,
    ];

    /// Integer divisor of the base clock
    pub fn factor(self) -> u32 {
        match self {
            Decimation::X1 => 1,
            Decimation::X8 => 8,
            Decimation::X64 => 64,
            Decimation::X1024 => 1024,
            Decimation::X8192 => 8192,
            Decimation::X65536 => 65536,
        }
    }

    /// Time between two captured samples in seconds
    pub fn sample_interval(self) -> f64 {
        crate::BASE_SAMPLE_PERIOD_S * self.factor() as f64
    }
}

impl TryFrom<u32> for Decimation {
    type Error = ConfigError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Decimation::ALL
            .into_iter()
            .find(|d| d.factor() == value)
            .ok_or(ConfigError::InvalidDecimation(value))
    }
}

impl From<Decimation> for u32 {
    fn from(d: Decimation) -> Self {
        d.factor()
    }
}

impl fmt::Display for Decimation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factor())
    }
}

/// Hardware trigger source
///
/// `PE`/`NE` select the positive or negative edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    /// Free-running acquisition, no trigger
    #[default]
    Disabled,
    ExtPe,
    ExtNe,
    Ch1Pe,
    Ch1Ne,
    Ch2Pe,
    Ch2Ne,
}

impl TriggerSource {
    /// All sources in menu order
    pub const ALL: [TriggerSource; 7] = [
        TriggerSource::Disabled,
        TriggerSource::ExtPe,
        TriggerSource::ExtNe,
        TriggerSource::Ch1Pe,
        TriggerSource::Ch1Ne,
        TriggerSource::Ch2Pe,
        TriggerSource::Ch2Ne,
    ];

    /// Name used on the wire (`ACQ:TRIG <name>`)
    pub fn scpi_name(self) -> &'static str {
        match self {
            TriggerSource::Disabled => "DISABLED",
            TriggerSource::ExtPe => "EXT_PE",
            TriggerSource::ExtNe => "EXT_NE",
            TriggerSource::Ch1Pe => "CH1_PE",
            TriggerSource::Ch1Ne => "CH1_NE",
            TriggerSource::Ch2Pe => "CH2_PE",
            TriggerSource::Ch2Ne => "CH2_NE",
        }
    }

    /// Whether this is the external trigger input (0-3.3 V range)
    pub fn is_external(self) -> bool {
        matches!(self, TriggerSource::ExtPe | TriggerSource::ExtNe)
    }

    /// Whether triggering is enabled at all
    pub fn is_enabled(self) -> bool {
        self != TriggerSource::Disabled
    }
}

impl FromStr for TriggerSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        TriggerSource::ALL
            .into_iter()
            .find(|src| src.scpi_name() == wanted)
            .ok_or_else(|| ConfigError::UnknownTriggerSource(s.to_string()))
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scpi_name())
    }
}

fn default_decimation() -> Decimation {
    Decimation::X1
}

fn default_buffer_size() -> usize {
    16384
}

/// Wire form used for deserialization, validated into [`AcquisitionConfig`]
#[derive(Deserialize)]
struct RawAcquisitionConfig {
    #[serde(default = "default_decimation")]
    decimation: Decimation,
    #[serde(default = "default_buffer_size")]
    buffer_size: usize,
    #[serde(default)]
    pretrigger_samples: usize,
    #[serde(default)]
    trigger_source: TriggerSource,
    #[serde(default)]
    trigger_level_volts: f64,
}

/// Capture parameters applied to the instrument before every acquisition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAcquisitionConfig")]
pub struct AcquisitionConfig {
    /// Base clock divisor
    pub decimation: Decimation,
    /// Samples per channel (10-16384)
    pub buffer_size: usize,
    /// Samples kept before the trigger event (0-8192)
    pub pretrigger_samples: usize,
    /// Trigger input and edge
    pub trigger_source: TriggerSource,
    /// Trigger threshold in volts, ignored when the source is disabled
    pub trigger_level_volts: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            decimation: default_decimation(),
            buffer_size: default_buffer_size(),
            pretrigger_samples: 0,
            trigger_source: TriggerSource::Disabled,
            trigger_level_volts: 0.0,
        }
    }
}

impl AcquisitionConfig {
    /// Build and validate a configuration
    pub fn new(
        decimation: Decimation,
        buffer_size: usize,
        pretrigger_samples: usize,
        trigger_source: TriggerSource,
        trigger_level_volts: f64,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            decimation,
            buffer_size,
            pretrigger_samples,
            trigger_source,
            trigger_level_volts,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field against instrument limits
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !BUFFER_SIZE_RANGE.contains(&self.buffer_size) {
            return Err(ConfigError::BufferSizeOutOfRange(self.buffer_size));
        }
        if !PRETRIGGER_RANGE.contains(&self.pretrigger_samples) {
            return Err(ConfigError::PretriggerOutOfRange(self.pretrigger_samples));
        }
        if !TRIGGER_LEVEL_RANGE.contains(&self.trigger_level_volts) {
            return Err(ConfigError::TriggerLevelOutOfRange(
                self.trigger_level_volts,
            ));
        }
        Ok(())
    }

    /// Sample interval for the configured decimation in seconds
    pub fn sample_interval(&self) -> f64 {
        self.decimation.sample_interval()
    }
}

impl TryFrom<RawAcquisitionConfig> for AcquisitionConfig {
    type Error = ConfigError;

    fn try_from(raw: RawAcquisitionConfig) -> Result<Self, Self::Error> {
        AcquisitionConfig::new(
            raw.decimation,
            raw.buffer_size,
            raw.pretrigger_samples,
            raw.trigger_source,
            raw.trigger_level_volts,
        )
    }
}
