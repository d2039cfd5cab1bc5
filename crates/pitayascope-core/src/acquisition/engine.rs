//! Acquisition orchestrator
//!
//! Ties trigger control, channel reading and measurement into one capture:
//!
//! ```text
//! Idle ─► Arming ─► WaitingTrigger ─┬─► Reading ─► Done ─► (Idle)
//!                                   └─► TimeoutAbort ───► (Idle)
//! ```
//!
//! The orchestrator exclusively owns the transport for the lifetime of a
//! connection. Every operation takes `&mut self`, so captures are serialized
//! and continuous mode is a plain loop on the calling thread.
//!
//! ## Failure handling
//!
//! - Transport errors are connection-level: the operation fails with
//!   [`AcquisitionError::Connection`] and further operations fail with
//!   [`AcquisitionError::Disconnected`] until [`Orchestrator::reconnect`].
//! - A trigger timeout is a normal outcome ([`AcquisitionOutcome::TriggerTimeout`]).
//! - Channel read failures degrade to zero-filled buffers and never abort the capture.

use super::config::{AcquisitionConfig, ConfigError};
use super::reader::{Channel, ChannelBuffer, ChannelReader};
use super::trigger::{pause, PollPolicy, TriggerController, TriggerOutcome, TriggerState};
use crate::analysis::measure::{measure, MeasurementResult};
use crate::transport::{TcpTransport, Transport, TransportError};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest single sleep in continuous mode, bounds stop latency
const CONTINUOUS_SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Errors that abort an acquisition
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    #[error("Instrument connection lost, reconnect before acquiring")]
    Disconnected,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Phase of the acquisition state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Arming,
    WaitingTrigger,
    Reading,
    /// Last capture completed
    Done,
    /// Last capture stopped on trigger timeout
    TimeoutAbort,
}

impl EngineState {
    /// Whether a new acquisition may start from this state
    pub fn is_ready(self) -> bool {
        matches!(
            self,
            EngineState::Idle | EngineState::Done | EngineState::TimeoutAbort
        )
    }
}

/// Every wait the engine performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTiming {
    /// Pause after `ACQ:RST` and `ACQ:STOP` while arming
    pub command_settle: Duration,
    /// Wait for a free-running capture to fill
    pub free_run_settle: Duration,
    /// Pause before retrying a failed data query
    pub retry_delay: Duration,
    /// Poll schedule for the interactive trigger test
    pub trigger_test: PollPolicy,
    /// Poll schedule for a full capture
    pub capture: PollPolicy,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            command_settle: Duration::from_millis(100),
            free_run_settle: Duration::from_millis(500),
            retry_delay: Duration::from_millis(500),
            trigger_test: PollPolicy::TRIGGER_TEST,
            capture: PollPolicy::CAPTURE,
        }
    }
}

impl EngineTiming {
    /// Same poll budgets with every delay set to zero (simulation and tests)
    pub fn immediate() -> Self {
        Self {
            command_settle: Duration::ZERO,
            free_run_settle: Duration::ZERO,
            retry_delay: Duration::ZERO,
            trigger_test: PollPolicy::new(Duration::ZERO, PollPolicy::TRIGGER_TEST.max_polls),
            capture: PollPolicy::new(Duration::ZERO, PollPolicy::CAPTURE.max_polls),
        }
    }
}

/// Both channels of one capture with their measurements
#[derive(Debug, Clone)]
pub struct AcquisitionResult {
    pub ch1: ChannelBuffer,
    pub ch2: ChannelBuffer,
    pub m1: MeasurementResult,
    pub m2: MeasurementResult,
    /// How the trigger wait ended (`Triggered` or `Immediate`)
    pub trigger: TriggerOutcome,
    /// Configuration the capture was taken with
    pub config: AcquisitionConfig,
    pub captured_at: DateTime<Utc>,
}

impl AcquisitionResult {
    /// Buffer for `channel`
    pub fn buffer(&self, channel: Channel) -> &ChannelBuffer {
        match channel {
            Channel::One => &self.ch1,
            Channel::Two => &self.ch2,
        }
    }

    /// Measurements for `channel`
    pub fn measurement(&self, channel: Channel) -> &MeasurementResult {
        match channel {
            Channel::One => &self.m1,
            Channel::Two => &self.m2,
        }
    }
}

/// Result of a single acquisition that did not hit a connection error
#[derive(Debug, Clone)]
pub enum AcquisitionOutcome {
    Captured(Box<AcquisitionResult>),
    /// No trigger within the capture budget; instrument stopped, no data read
    TriggerTimeout,
}

impl AcquisitionOutcome {
    pub fn captured(&self) -> Option<&AcquisitionResult> {
        match self {
            AcquisitionOutcome::Captured(result) => Some(result),
            AcquisitionOutcome::TriggerTimeout => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AcquisitionOutcome::TriggerTimeout)
    }
}

/// Stop switch for continuous mode, cloneable across threads
///
/// A stop requested before the loop starts is kept, and that run ends
/// without capturing. The request is consumed when the run returns.
#[derive(Debug, Clone, Default)]
pub struct ContinuousHandle {
    stop_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
}

impl ContinuousHandle {
    /// Request the continuous loop to end at its next iteration boundary
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn should_continue(&self) -> bool {
        !self.stop_requested.load(Ordering::SeqCst)
    }

    fn begin(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_requested.store(false, Ordering::SeqCst);
    }
}

/// Single-instrument acquisition engine
pub struct Orchestrator<T: Transport> {
    transport: T,
    config: AcquisitionConfig,
    timing: EngineTiming,
    trigger: TriggerController,
    reader: ChannelReader,
    state: EngineState,
    identity: Option<String>,
    status: String,
    connection_lost: bool,
    continuous: ContinuousHandle,
}

impl Orchestrator<TcpTransport> {
    /// Connect to an instrument over TCP, identify it and apply `config`
    ///
    /// # Arguments
    /// * `host` - Instrument address
    /// * `port` - SCPI server port
    /// * `timeout` - Connect and response timeout
    pub fn connect(
        host: &str,
        port: u16,
        timeout: Duration,
        config: AcquisitionConfig,
        timing: EngineTiming,
    ) -> Result<Self, AcquisitionError> {
        let transport = TcpTransport::connect(host, port, timeout)?;
        Self::open(transport, config, timing)
    }
}

impl<T: Transport> Orchestrator<T> {
    /// Create an engine over an already open transport without touching the instrument
    pub fn new(transport: T, timing: EngineTiming) -> Self {
        Self {
            transport,
            config: AcquisitionConfig::default(),
            timing,
            trigger: TriggerController::new(timing.command_settle, timing.free_run_settle),
            reader: ChannelReader::new(timing.retry_delay),
            state: EngineState::Idle,
            identity: None,
            status: "Not connected".to_string(),
            connection_lost: false,
            continuous: ContinuousHandle::default(),
        }
    }

    /// Create an engine, identify the instrument and apply `config`
    pub fn open(
        transport: T,
        config: AcquisitionConfig,
        timing: EngineTiming,
    ) -> Result<Self, AcquisitionError> {
        let mut engine = Self::new(transport, timing);
        engine.configure(config)?;
        engine.identify()?;
        engine.apply_config()?;
        Ok(engine)
    }

    /// Query `*IDN?` and remember the identity
    pub fn identify(&mut self) -> Result<String, AcquisitionError> {
        self.ensure_connected()?;
        let idn = match self.transport.query("*IDN?") {
            Ok(idn) => idn.trim().to_string(),
            Err(e) => return Err(self.connection_failed(e)),
        };
        tracing::info!(identity = %idn, "Connected to instrument");
        self.status = format!("Connected to: {}", idn);
        self.identity = Some(idn.clone());
        Ok(idn)
    }

    /// Replace the acquisition configuration
    ///
    /// Takes effect at the next acquisition, which re-arms the instrument.
    pub fn configure(&mut self, config: AcquisitionConfig) -> Result<(), AcquisitionError> {
        config.validate()?;
        self.config = config;
        tracing::debug!(?config, "Configuration updated");
        Ok(())
    }

    /// Send the current configuration to the instrument without starting a capture
    pub fn apply_config(&mut self) -> Result<(), AcquisitionError> {
        self.ensure_connected()?;
        if let Err(e) = self.trigger.arm(&mut self.transport, &self.config) {
            return Err(self.connection_failed(e));
        }
        self.status = "Acquisition setup completed".to_string();
        Ok(())
    }

    /// Arm, wait for the trigger, read both channels and measure them
    ///
    /// Uses the capture poll budget. On trigger timeout the instrument is stopped
    /// and no channel data is read.
    pub fn run_single_acquisition(&mut self) -> Result<AcquisitionOutcome, AcquisitionError> {
        self.ensure_connected()?;
        match self.capture() {
            Ok(outcome) => Ok(outcome),
            Err(e) => Err(self.connection_failed(e)),
        }
    }

    fn capture(&mut self) -> Result<AcquisitionOutcome, TransportError> {
        let config = self.config;

        self.enter(EngineState::Arming);
        self.trigger.arm(&mut self.transport, &config)?;

        self.enter(EngineState::WaitingTrigger);
        self.status = if config.trigger_source.is_enabled() {
            "Waiting for trigger...".to_string()
        } else {
            "Acquiring data without trigger...".to_string()
        };
        let trigger = self
            .trigger
            .wait_for_trigger(&mut self.transport, &config, self.timing.capture)?;

        if !trigger.has_data() {
            self.enter(EngineState::TimeoutAbort);
            self.status = "Trigger timeout - no trigger detected".to_string();
            return Ok(AcquisitionOutcome::TriggerTimeout);
        }

        self.enter(EngineState::Reading);
        if trigger == TriggerOutcome::Triggered {
            self.status = "Trigger detected! Retrieving data...".to_string();
        }
        // Channel 1 first, it is the display reference
        let ch1 = self
            .reader
            .read_channel(&mut self.transport, Channel::One, &config);
        let ch2 = self
            .reader
            .read_channel(&mut self.transport, Channel::Two, &config);

        let m1 = measure(&ch1, config.decimation);
        let m2 = measure(&ch2, config.decimation);

        self.enter(EngineState::Done);
        self.status = match (ch1.zero_filled, ch2.zero_filled) {
            (false, false) => format!("Acquisition complete: {} points per channel", ch1.len()),
            (true, true) => "Acquisition complete: both channels failed, showing zeros".to_string(),
            (true, false) => "Acquisition complete: CH1 read failed, showing zeros".to_string(),
            (false, true) => "Acquisition complete: CH2 read failed, showing zeros".to_string(),
        };
        tracing::info!(
            points = ch1.len(),
            ch1_vpp = m1.vpp,
            ch2_vpp = m2.vpp,
            ch1_freq = ?m1.frequency_hz,
            ch2_freq = ?m2.frequency_hz,
            "Acquisition complete"
        );

        Ok(AcquisitionOutcome::Captured(Box::new(AcquisitionResult {
            ch1,
            ch2,
            m1,
            m2,
            trigger,
            config,
            captured_at: Utc::now(),
        })))
    }

    /// Arm and wait for the trigger with the interactive (shorter) budget
    ///
    /// Does not read data. With triggering disabled there is nothing to test:
    /// returns [`TriggerOutcome::Immediate`] without touching the instrument.
    pub fn run_trigger_test(&mut self) -> Result<TriggerOutcome, AcquisitionError> {
        self.ensure_connected()?;

        if !self.config.trigger_source.is_enabled() {
            self.status = "Trigger is disabled, select a trigger source to test".to_string();
            return Ok(TriggerOutcome::Immediate);
        }

        self.status = "Running trigger test...".to_string();
        let config = self.config;
        let result = self.trigger.arm(&mut self.transport, &config).and_then(|_| {
            self.trigger
                .wait_for_trigger(&mut self.transport, &config, self.timing.trigger_test)
        });

        match result {
            Ok(outcome) => {
                self.status = match outcome {
                    TriggerOutcome::Timeout => {
                        "Trigger test: FAILED - No trigger detected within timeout!".to_string()
                    }
                    _ => "Trigger test: PASSED - Trigger detected!".to_string(),
                };
                Ok(outcome)
            }
            Err(e) => Err(self.connection_failed(e)),
        }
    }

    /// Repeat single acquisitions every `interval` until stopped
    ///
    /// `on_capture` sees every outcome. The loop ends when the
    /// [`ContinuousHandle`] is stopped (checked between captures) or on a
    /// connection error, which is returned. A stop issued before the call
    /// returns `Ok(0)` without touching the instrument. Returns the number of
    /// acquisitions run.
    pub fn run_continuous<F>(
        &mut self,
        interval: Duration,
        mut on_capture: F,
    ) -> Result<u64, AcquisitionError>
    where
        F: FnMut(&AcquisitionOutcome),
    {
        let handle = self.continuous.clone();
        handle.begin();
        let result = self.continuous_loop(&handle, interval, &mut on_capture);
        handle.finish();
        result
    }

    fn continuous_loop<F>(
        &mut self,
        handle: &ContinuousHandle,
        interval: Duration,
        on_capture: &mut F,
    ) -> Result<u64, AcquisitionError>
    where
        F: FnMut(&AcquisitionOutcome),
    {
        self.status = "Continuous acquisition started".to_string();
        tracing::info!(interval_ms = interval.as_millis() as u64, "Continuous acquisition started");

        let mut count = 0u64;
        while handle.should_continue() {
            let started = Instant::now();
            let outcome = match self.run_single_acquisition() {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, acquisitions = count, "Continuous acquisition aborted");
                    return Err(e);
                }
            };
            count += 1;
            on_capture(&outcome);

            let mut remaining = interval.saturating_sub(started.elapsed());
            while handle.should_continue() && !remaining.is_zero() {
                let slice = remaining.min(CONTINUOUS_SLEEP_SLICE);
                pause(slice);
                remaining -= slice;
            }
        }

        self.status = "Continuous acquisition stopped".to_string();
        tracing::info!(acquisitions = count, "Continuous acquisition stopped");
        Ok(count)
    }

    /// Handle that can stop [`Self::run_continuous`] from a callback or another thread
    pub fn continuous_handle(&self) -> ContinuousHandle {
        self.continuous.clone()
    }

    /// Trigger indicator state
    pub fn current_trigger_state(&self) -> TriggerState {
        self.trigger.state()
    }

    /// Phase reached by the most recent acquisition
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Human-readable status line
    pub fn status_message(&self) -> &str {
        &self.status
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn timing(&self) -> &EngineTiming {
        &self.timing
    }

    /// `*IDN?` response, once identified
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Whether a connection-level failure is blocking further operations
    pub fn is_connection_lost(&self) -> bool {
        self.connection_lost
    }

    /// Swap in a fresh transport after a connection failure
    pub fn reconnect(&mut self, transport: T) {
        self.transport = transport;
        self.connection_lost = false;
        self.trigger.reset();
        self.enter(EngineState::Idle);
        self.status = "Reconnected".to_string();
        tracing::info!("Transport replaced, connection restored");
    }

    /// Stop the instrument (best effort) and release the transport
    pub fn disconnect(mut self) -> T {
        if !self.connection_lost {
            if let Err(e) = self.transport.write("ACQ:STOP") {
                tracing::warn!(error = %e, "Failed to stop acquisition on disconnect");
            }
        }
        self.trigger.reset();
        tracing::info!("Disconnected");
        self.transport
    }

    fn ensure_connected(&self) -> Result<(), AcquisitionError> {
        if self.connection_lost {
            Err(AcquisitionError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn connection_failed(&mut self, err: TransportError) -> AcquisitionError {
        tracing::error!(error = %err, state = ?self.state, "Connection-level failure");
        self.connection_lost = true;
        self.enter(EngineState::Idle);
        self.status = format!("Connection error: {}", err);
        AcquisitionError::Connection(err)
    }

    fn enter(&mut self, next: EngineState) {
        tracing::trace!(from = ?self.state, to = ?next, "engine_state");
        self.state = next;
    }
}
