//! Trigger arming and status polling
//!
//! Translates an [`AcquisitionConfig`] into the SCPI setup sequence and waits
//! for the hardware trigger with a bounded poll budget.
//!
//! ## Trigger levels
//!
//! The instrument takes trigger thresholds as a fraction of full scale, and the
//! two input classes have different physical ranges:
//! - External trigger input: 0 to 3.3 V, normalized into `[0, 1]`
//! - Channel inputs: ±20 V, normalized into `[-1, 1]`

use super::config::{AcquisitionConfig, TriggerSource};
use crate::transport::{Transport, TransportError};
use std::time::Duration;

/// Status response meaning "trigger detected"
pub const TRIGGER_DETECTED: &str = "TD";

/// Full-scale voltage of the external trigger input
pub const EXTERNAL_FULL_SCALE_V: f64 = 3.3;

/// Full-scale voltage of the analog channel inputs
pub const CHANNEL_FULL_SCALE_V: f64 = 20.0;

/// Trigger indicator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerState {
    /// No acquisition has been armed on this connection
    #[default]
    Disabled,
    /// Armed, waiting for the trigger event
    Waiting,
    /// Trigger detected, or free-running acquisition settled
    Triggered,
    /// Poll budget exhausted without a trigger
    Timeout,
}

/// Result of waiting for the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Status query reported the trigger
    Triggered,
    /// No trigger within the poll budget; acquisition was stopped
    Timeout,
    /// Triggering disabled, the instrument free-runs
    Immediate,
}

impl TriggerOutcome {
    /// Whether channel data can be read after this outcome
    pub fn has_data(self) -> bool {
        !matches!(self, TriggerOutcome::Timeout)
    }
}

/// Bounded polling schedule: `max_polls` status queries, `interval` apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_polls: u32,
}

impl PollPolicy {
    /// Interactive trigger test: 30 polls at 100 ms (3 s)
    pub const TRIGGER_TEST: PollPolicy = PollPolicy {
        interval: Duration::from_millis(100),
        max_polls: 30,
    };

    /// Full capture: 50 polls at 100 ms (5 s)
    pub const CAPTURE: PollPolicy = PollPolicy {
        interval: Duration::from_millis(100),
        max_polls: 50,
    };

    pub fn new(interval: Duration, max_polls: u32) -> Self {
        Self {
            interval,
            max_polls,
        }
    }

    /// Longest time the policy can spend sleeping between polls
    pub fn budget(&self) -> Duration {
        self.interval * self.max_polls.saturating_sub(1)
    }
}

/// Convert a trigger level in volts to the instrument's normalized level
///
/// Returns `None` when triggering is disabled. Non-finite input is treated as 0 V.
///
/// # Example
/// ```
/// use pitayascope_core::acquisition::trigger::normalize_trigger_level;
/// use pitayascope_core::TriggerSource;
///
/// assert_eq!(normalize_trigger_level(TriggerSource::Ch1Pe, 0.5), Some(0.025));
/// assert_eq!(normalize_trigger_level(TriggerSource::ExtPe, 5.0), Some(1.0));
/// assert_eq!(normalize_trigger_level(TriggerSource::Disabled, 0.5), None);
/// ```
pub fn normalize_trigger_level(source: TriggerSource, volts: f64) -> Option<f64> {
    if !source.is_enabled() {
        return None;
    }
    let volts = if volts.is_finite() { volts } else { 0.0 };

    let level = if source.is_external() {
        (volts / EXTERNAL_FULL_SCALE_V).clamp(0.0, 1.0)
    } else {
        (volts / CHANNEL_FULL_SCALE_V).clamp(-1.0, 1.0)
    };
    Some(level)
}

/// Setup commands for `config`, in the order they must be sent
///
/// Reset, stop, decimation, buffer size, pre-trigger delay, then either the
/// trigger source and level or `ACQ:TRIG:DIS`.
pub fn setup_commands(config: &AcquisitionConfig) -> Vec<String> {
    let mut commands = vec![
        "ACQ:RST".to_string(),
        "ACQ:STOP".to_string(),
        format!("ACQ:DEC {}", config.decimation.factor()),
        format!("ACQ:BUF:SIZE {}", config.buffer_size),
        format!("ACQ:TRIG:DLY -{}", config.pretrigger_samples),
    ];

    match normalize_trigger_level(config.trigger_source, config.trigger_level_volts) {
        Some(level) => {
            commands.push(format!("ACQ:TRIG {}", config.trigger_source.scpi_name()));
            commands.push(format!("ACQ:TRIG:LEV {}", level));
        }
        None => commands.push("ACQ:TRIG:DIS".to_string()),
    }

    commands
}

pub(crate) fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

/// Arms the instrument and waits for the trigger event
///
/// Owns the [`TriggerState`] mirrored to the UI. The transport is borrowed per
/// call so the orchestrator keeps exclusive ownership of the connection.
#[derive(Debug, Clone)]
pub struct TriggerController {
    state: TriggerState,
    /// Pause after `ACQ:RST` and `ACQ:STOP` while the instrument settles
    command_settle: Duration,
    /// Wait before reading a free-running (untriggered) capture
    free_run_settle: Duration,
}

impl TriggerController {
    /// Create a controller
    ///
    /// # Arguments
    /// * `command_settle` - Pause after reset/stop during arming (100 ms on hardware)
    /// * `free_run_settle` - Wait for a free-running capture to fill (500 ms on hardware)
    pub fn new(command_settle: Duration, free_run_settle: Duration) -> Self {
        Self {
            state: TriggerState::Disabled,
            command_settle,
            free_run_settle,
        }
    }

    /// Current trigger indicator state
    pub fn state(&self) -> TriggerState {
        self.state
    }

    /// Return to the unarmed state (e.g. after disconnecting)
    pub fn reset(&mut self) {
        self.state = TriggerState::Disabled;
    }

    /// Send the setup sequence for `config`
    ///
    /// Commands are fire-and-forget; only transport failures are reported.
    pub fn arm<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        config: &AcquisitionConfig,
    ) -> Result<(), TransportError> {
        self.state = TriggerState::Waiting;

        for command in setup_commands(config) {
            transport.write(&command)?;
            if command == "ACQ:RST" || command == "ACQ:STOP" {
                pause(self.command_settle);
            }
        }

        tracing::debug!(
            decimation = config.decimation.factor(),
            buffer_size = config.buffer_size,
            pretrigger = config.pretrigger_samples,
            source = config.trigger_source.scpi_name(),
            "Acquisition armed"
        );
        Ok(())
    }

    /// Start the acquisition and wait for the trigger
    ///
    /// With a disabled source this returns [`TriggerOutcome::Immediate`] after the
    /// free-run settle delay without polling. Otherwise the status is polled up to
    /// `policy.max_polls` times; on timeout `ACQ:STOP` is sent so the instrument is
    /// left stopped.
    pub fn wait_for_trigger<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        config: &AcquisitionConfig,
        policy: PollPolicy,
    ) -> Result<TriggerOutcome, TransportError> {
        self.state = TriggerState::Waiting;
        transport.write("ACQ:START")?;

        if !config.trigger_source.is_enabled() {
            pause(self.free_run_settle);
            // Free-running captures count as triggered for the indicator
            self.state = TriggerState::Triggered;
            tracing::debug!("Trigger disabled, free-running capture");
            return Ok(TriggerOutcome::Immediate);
        }

        transport.clear()?;

        for poll in 1..=policy.max_polls {
            let status = transport.query("ACQ:TRIG:STAT?")?;
            let status = status.trim();
            if poll == 1 {
                tracing::debug!(status, "Initial trigger state");
            } else {
                tracing::trace!(poll, status, "trigger_poll");
            }

            if status == TRIGGER_DETECTED {
                self.state = TriggerState::Triggered;
                tracing::info!(
                    polls = poll,
                    source = config.trigger_source.scpi_name(),
                    "Trigger detected"
                );
                return Ok(TriggerOutcome::Triggered);
            }

            if poll < policy.max_polls {
                pause(policy.interval);
            }
        }

        self.state = TriggerState::Timeout;
        tracing::warn!(
            polls = policy.max_polls,
            source = config.trigger_source.scpi_name(),
            level_v = config.trigger_level_volts,
            "No trigger detected within poll budget, stopping acquisition"
        );
        transport.write("ACQ:STOP")?;
        Ok(TriggerOutcome::Timeout)
    }
}

impl Default for TriggerController {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(500))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::config::Decimation;
    use crate::transport::ScriptedTransport;

    fn instant_controller() -> TriggerController {
        TriggerController::new(Duration::ZERO, Duration::ZERO)
    }

    fn fast_policy(max_polls: u32) -> PollPolicy {
        PollPolicy::new(Duration::ZERO, max_polls)
    }

    fn config(source: TriggerSource, level: f64) -> AcquisitionConfig {
        AcquisitionConfig::new(Decimation::X64, 1024, 0, source, level).unwrap()
    }

    #[test]
    fn test_external_level_clamped_to_unit_range() {
        for volts in [-20.0, -1.0, 0.0, 1.65, 3.3, 7.0, 20.0] {
            let level = normalize_trigger_level(TriggerSource::ExtPe, volts).unwrap();
            assert!((0.0..=1.0).contains(&level), "{} V -> {}", volts, level);
        }
        let half = normalize_trigger_level(TriggerSource::ExtNe, 1.65).unwrap();
        assert!((half - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_channel_level_clamped_to_signed_range() {
        for volts in [-100.0, -20.0, -0.5, 0.0, 10.0, 20.0, 100.0] {
            let level = normalize_trigger_level(TriggerSource::Ch2Pe, volts).unwrap();
            assert!((-1.0..=1.0).contains(&level), "{} V -> {}", volts, level);
        }
        assert_eq!(normalize_trigger_level(TriggerSource::Ch1Ne, -10.0), Some(-0.5));
        assert_eq!(normalize_trigger_level(TriggerSource::Ch1Ne, f64::NAN), Some(0.0));
    }

    #[test]
    fn test_normalization_is_deterministic() {
        for src in TriggerSource::ALL {
            for volts in [-3.0, 0.25, 2.0, 19.9] {
                assert_eq!(
                    normalize_trigger_level(src, volts),
                    normalize_trigger_level(src, volts)
                );
            }
        }
    }

    #[test]
    fn test_setup_commands_with_channel_trigger() {
        let commands = setup_commands(&config(TriggerSource::Ch1Pe, 0.5));
        assert_eq!(
            commands,
            vec![
                "ACQ:RST",
                "ACQ:STOP",
                "ACQ:DEC 64",
                "ACQ:BUF:SIZE 1024",
                "ACQ:TRIG:DLY -0",
                "ACQ:TRIG CH1_PE",
                "ACQ:TRIG:LEV 0.025",
            ]
        );
    }

    #[test]
    fn test_setup_commands_with_trigger_disabled() {
        let mut cfg = config(TriggerSource::Disabled, 1.0);
        cfg.pretrigger_samples = 256;
        let commands = setup_commands(&cfg);
        assert_eq!(commands.len(), 6);
        assert_eq!(commands[4], "ACQ:TRIG:DLY -256");
        assert_eq!(commands[5], "ACQ:TRIG:DIS");
    }

    #[test]
    fn test_arm_writes_setup_sequence() {
        let scope = ScriptedTransport::new();
        let mut link = scope.clone();
        let mut controller = instant_controller();
        let cfg = config(TriggerSource::ExtPe, 3.3);

        controller.arm(&mut link, &cfg).unwrap();
        assert_eq!(scope.commands(), setup_commands(&cfg));
        assert_eq!(scope.commands()[6], "ACQ:TRIG:LEV 1");
        assert_eq!(controller.state(), TriggerState::Waiting);
    }

    #[test]
    fn test_disabled_source_returns_immediate_without_polling() {
        let scope = ScriptedTransport::new();
        let mut link = scope.clone();
        let mut controller = instant_controller();

        let outcome = controller
            .wait_for_trigger(&mut link, &config(TriggerSource::Disabled, 0.0), fast_policy(50))
            .unwrap();

        assert_eq!(outcome, TriggerOutcome::Immediate);
        assert_eq!(scope.count("ACQ:TRIG:STAT?"), 0);
        assert_eq!(scope.commands(), vec!["ACQ:START"]);
        assert_eq!(controller.state(), TriggerState::Triggered);
    }

    #[test]
    fn test_trigger_detected_stops_polling() {
        let scope = ScriptedTransport::new();
        scope.respond_default("ACQ:TRIG:STAT?", "WAIT");
        for _ in 0..2 {
            scope.respond("ACQ:TRIG:STAT?", "WAIT");
        }
        scope.respond("ACQ:TRIG:STAT?", "TD\r\n");
        let mut link = scope.clone();
        let mut controller = instant_controller();

        let outcome = controller
            .wait_for_trigger(&mut link, &config(TriggerSource::Ch2Ne, 1.0), fast_policy(30))
            .unwrap();

        assert_eq!(outcome, TriggerOutcome::Triggered);
        assert_eq!(scope.count("ACQ:TRIG:STAT?"), 3);
        assert_eq!(scope.count("ACQ:STOP"), 0);
        assert_eq!(scope.clears(), 1);
        assert_eq!(controller.state(), TriggerState::Triggered);
    }

    #[test]
    fn test_timeout_exhausts_budget_and_stops() {
        let scope = ScriptedTransport::new();
        scope.respond_default("ACQ:TRIG:STAT?", "WAIT");
        let mut link = scope.clone();
        let mut controller = instant_controller();

        let outcome = controller
            .wait_for_trigger(&mut link, &config(TriggerSource::Ch1Pe, 0.5), fast_policy(30))
            .unwrap();

        assert_eq!(outcome, TriggerOutcome::Timeout);
        assert_eq!(scope.count("ACQ:TRIG:STAT?"), 30);
        assert_eq!(scope.commands().last().map(String::as_str), Some("ACQ:STOP"));
        assert_eq!(controller.state(), TriggerState::Timeout);
    }

    #[test]
    fn test_poll_failure_propagates() {
        let scope = ScriptedTransport::new();
        scope.fail_next("ACQ:TRIG:STAT?");
        let mut link = scope.clone();
        let mut controller = instant_controller();

        let result =
            controller.wait_for_trigger(&mut link, &config(TriggerSource::Ch1Pe, 0.5), fast_policy(5));
        assert!(result.is_err());
    }

    #[test]
    fn test_policy_budgets() {
        assert_eq!(PollPolicy::TRIGGER_TEST.max_polls, 30);
        assert_eq!(PollPolicy::CAPTURE.max_polls, 50);
        assert_eq!(PollPolicy::CAPTURE.interval, Duration::from_millis(100));
        assert_eq!(PollPolicy::new(Duration::from_millis(10), 0).budget(), Duration::ZERO);
    }
}
