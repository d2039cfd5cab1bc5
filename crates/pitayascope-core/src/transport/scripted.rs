//! Scripted in-memory instrument
//!
//! Stands in for the digitizer in tests and offline demos. It provides:
//! - A log of every command written or queried, in order
//! - Per-command response queues with a fallback default response
//! - One-shot query failures and whole-link failure injection
//!
//! Clones share the same script and log, so a test can keep one handle while
//! the orchestrator owns another.

use super::{Transport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// A single scripted reply
#[derive(Debug, Clone)]
enum Reply {
    Line(String),
    Fail,
}

#[derive(Debug, Default)]
struct Script {
    log: Vec<String>,
    queued: HashMap<String, VecDeque<Reply>>,
    defaults: HashMap<String, String>,
    link_down: bool,
    clears: usize,
    timeout: Option<Duration>,
}

/// In-memory transport answering from a script
///
/// # Example
/// ```
/// use pitayascope_core::transport::{ScriptedTransport, Transport};
///
/// let scope = ScriptedTransport::new();
/// scope.respond_default("ACQ:TRIG:STAT?", "WAIT");
/// scope.respond("ACQ:TRIG:STAT?", "TD");
///
/// let mut link = scope.clone();
/// assert_eq!(link.query("ACQ:TRIG:STAT?").unwrap(), "TD");
/// assert_eq!(link.query("ACQ:TRIG:STAT?").unwrap(), "WAIT");
/// assert_eq!(scope.commands().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// Create an empty script (every query answers with an empty line)
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a script that answers `*IDN?` like a Red Pitaya
    pub fn red_pitaya() -> Self {
        let transport = Self::new();
        transport.respond_default("*IDN?", "REDPITAYA,INSTR2020,0,01-02");
        transport
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue a one-time response for `command`
    pub fn respond(&self, command: &str, response: &str) {
        self.lock()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(Reply::Line(response.to_string()));
    }

    /// Answer `command` with `response` whenever its queue is empty
    pub fn respond_default(&self, command: &str, response: &str) {
        self.lock()
            .defaults
            .insert(command.to_string(), response.to_string());
    }

    /// Queue a failed answer for `command` (behind any responses already queued)
    pub fn fail_next(&self, command: &str) {
        self.lock()
            .queued
            .entry(command.to_string())
            .or_default()
            .push_back(Reply::Fail);
    }

    /// Fail every subsequent operation, as if the socket dropped
    pub fn disconnect(&self) {
        self.lock().link_down = true;
    }

    /// Restore the link after [`Self::disconnect`]
    pub fn restore(&self) {
        self.lock().link_down = false;
    }

    /// Every command seen so far, writes and queries alike
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Number of times `command` was sent
    pub fn count(&self, command: &str) -> usize {
        self.lock().log.iter().filter(|c| *c == command).count()
    }

    /// Number of `clear()` calls
    pub fn clears(&self) -> usize {
        self.lock().clears
    }

    /// Last timeout passed to `set_timeout`
    pub fn timeout(&self) -> Option<Duration> {
        self.lock().timeout
    }

    /// Forget the command log (script is kept)
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn link_error() -> TransportError {
        TransportError::Io(std::io::Error::new(
            ErrorKind::ConnectionReset,
            "scripted link down",
        ))
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        let mut script = self.lock();
        if script.link_down {
            return Err(Self::link_error());
        }
        script.log.push(command.to_string());
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        let mut script = self.lock();
        if script.link_down {
            return Err(Self::link_error());
        }
        script.log.push(command.to_string());

        let queued = script
            .queued
            .get_mut(command)
            .and_then(|queue| queue.pop_front());
        match queued {
            Some(Reply::Line(line)) => Ok(line),
            Some(Reply::Fail) => Err(TransportError::Io(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("scripted failure for '{}'", command),
            ))),
            None => Ok(script.defaults.get(command).cloned().unwrap_or_default()),
        }
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        let mut script = self.lock();
        if script.link_down {
            return Err(Self::link_error());
        }
        script.clears += 1;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.lock().timeout = Some(timeout);
        Ok(())
    }
}
