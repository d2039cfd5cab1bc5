//! Pitayascope - Red Pitaya dual-channel oscilloscope control
//!
//! This library re-exports the acquisition engine, measurements and statistics
//! from `pitayascope-core`, and adds the persistent application configuration
//! used by the command-line driver.

pub mod config;

pub use pitayascope_core::{acquisition, analysis, stats, transport};

pub use pitayascope_core::{
    measure, AcquisitionConfig, AcquisitionError, AcquisitionOutcome, AcquisitionResult,
    CaptureStats, Channel, ChannelBuffer, Decimation, EngineTiming, MeasurementResult,
    Orchestrator, TriggerOutcome, TriggerSource, TriggerState,
};
pub use pitayascope_core::{BASE_SAMPLE_RATE_HZ, DEFAULT_SCPI_PORT, VERSION};
