//! Decimation to sample-rate table
//!
//! Nominal rates are used for display and derived timing only; the capture
//! itself is configured by decimation factor.

use super::config::Decimation;

/// One row of the sample-rate table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRateEntry {
    pub decimation: Decimation,
    /// Nominal sample rate in samples per second
    pub rate_hz: f64,
    /// Label shown next to the decimation selector
    pub label: &'static str,
}

/// Rows for every supported decimation, fastest first
pub const SAMPLE_RATE_TABLE: [SampleRateEntry; 6] = [
    SampleRateEntry {
        decimation: Decimation::X1,
        rate_hz: 125e6,
        label: "125 MS/s",
    },
    SampleRateEntry {
        decimation: Decimation::X8,
        rate_hz: 125e6 / 8.0,
        label: "15.6 MS/s",
    },
    SampleRateEntry {
        decimation: Decimation::X64,
        rate_hz: 125e6 / 64.0,
        label: "1.95 MS/s",
    },
    SampleRateEntry {
        decimation: Decimation::X1024,
        rate_hz: 125e6 / 1024.0,
        label: "122 kS/s",
    },
    SampleRateEntry {
        decimation: Decimation::X8192,
        rate_hz: 125e6 / 8192.0,
        label: "15.3 kS/s",
    },
    SampleRateEntry {
        decimation: Decimation::X65536,
        rate_hz: 125e6 / 65536.0,
        label: "1.9 kS/s",
    },
];

/// Look up the table row for a decimation factor
pub fn lookup(decimation: Decimation) -> &'static SampleRateEntry {
    let row = match decimation {
        Decimation::X1 => 0,
        Decimation::X8 => 1,
        Decimation::X64 => 2,
        Decimation::X1024 => 3,
        Decimation::X8192 => 4,
        Decimation::X65536 => 5,
    };
    &SAMPLE_RATE_TABLE[row]
}

/// Nominal sample rate in Hz
pub fn sample_rate_hz(decimation: Decimation) -> f64 {
    lookup(decimation).rate_hz
}

/// Display label, e.g. `"1.95 MS/s"`
pub fn label(decimation: Decimation) -> &'static str {
    lookup(decimation).label
}

/// Duration covered by `samples` captured at `decimation`, in seconds
pub fn capture_duration(decimation: Decimation, samples: usize) -> f64 {
    samples as f64 * decimation.sample_interval()
}
