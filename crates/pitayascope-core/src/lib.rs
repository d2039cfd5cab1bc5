//! Pitayascope Core - Acquisition engine, trigger control, and waveform measurements
//!
//! This library drives a dual-channel Red Pitaya digitizer over its line-oriented
//! SCPI socket. It arms the hardware trigger, polls for the trigger event within a
//! bounded budget, retrieves both channel buffers with failure recovery, and derives
//! peak-to-peak, RMS and dominant-frequency measurements from the captured waveform.

pub mod acquisition;
pub mod analysis;
pub mod stats;
pub mod transport;

pub use acquisition::config::{AcquisitionConfig, ConfigError, Decimation, TriggerSource};
pub use acquisition::engine::{
    AcquisitionError, AcquisitionOutcome, AcquisitionResult, ContinuousHandle, EngineState,
    EngineTiming, Orchestrator,
};
pub use acquisition::reader::{Channel, ChannelBuffer, ChannelReader};
pub use acquisition::trigger::{PollPolicy, TriggerController, TriggerOutcome, TriggerState};
pub use analysis::measure::{measure, MeasurementResult};
pub use stats::store::CaptureStats;
pub use transport::{ScriptedTransport, TcpTransport, Transport, TransportError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// ADC base sample clock of the Red Pitaya 125-14 (125 MS/s)
pub const BASE_SAMPLE_RATE_HZ: f64 = 125e6;

/// Period of one undecimated sample (8 ns)
pub const BASE_SAMPLE_PERIOD_S: f64 = 8e-9;

/// Default SCPI server port on the instrument
pub const DEFAULT_SCPI_PORT: u16 = 5000;
