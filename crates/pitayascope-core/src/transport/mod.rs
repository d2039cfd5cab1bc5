//! Request/response channel to the instrument
//!
//! The engine only ever talks to the digitizer through the [`Transport`] trait:
//! - [`tcp`]: raw SCPI socket with `\r\n` termination (real hardware)
//! - [`scripted`]: in-memory instrument double with a command log

pub mod scripted;
pub mod tcp;

pub use scripted::ScriptedTransport;
pub use tcp::TcpTransport;

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a transport channel
///
/// Any of these reaching the orchestrator is a connection-level failure.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timed out after {timeout:?} waiting for response to '{command}'")]
    Timeout { command: String, timeout: Duration },

    #[error("Connection closed by instrument")]
    Closed,

    #[error("Failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// Line-oriented command/response channel
///
/// Implementations own the line termination and the read timeout; callers
/// pass bare command strings and receive responses without terminators.
pub trait Transport {
    /// Send a command without waiting for a response
    fn write(&mut self, command: &str) -> Result<(), TransportError>;

    /// Send a command and read one response line
    fn query(&mut self, command: &str) -> Result<String, TransportError>;

    /// Discard any pending input so the next query starts clean
    fn clear(&mut self) -> Result<(), TransportError>;

    /// Change the response timeout
    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        (**self).write(command)
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        (**self).query(command)
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        (**self).clear()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        (**self).set_timeout(timeout)
    }
}
