//! Raw SCPI socket transport
//!
//! The Red Pitaya SCPI server listens on TCP port 5000 and terminates both
//! commands and responses with `\r\n`. Data queries return a whole buffer
//! (up to 16384 values) on a single line.

use super::{Transport, TransportError};
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Line terminator used in both directions
const TERMINATOR: &str = "\r\n";

/// TCP transport to a SCPI socket server
#[derive(Debug)]
pub struct TcpTransport {
    address: SocketAddr,
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    timeout: Duration,
}

impl TcpTransport {
    /// Open a connection to `host:port`
    ///
    /// # Arguments
    /// * `host` - Instrument hostname or IP address
    /// * `port` - SCPI server port (5000 on the Red Pitaya)
    /// * `timeout` - Connect timeout and per-response read timeout
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, TransportError> {
        let address_str = format!("{}:{}", host, port);
        let address = address_str
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                address: address_str.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::Connect {
                address: address_str.clone(),
                source: std::io::Error::new(ErrorKind::NotFound, "no address resolved"),
            })?;

        let stream = TcpStream::connect_timeout(&address, timeout).map_err(|source| {
            TransportError::Connect {
                address: address_str.clone(),
                source,
            }
        })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;

        let writer = stream.try_clone()?;
        tracing::info!(address = %address, timeout_ms = timeout.as_millis() as u64, "SCPI socket connected");

        Ok(Self {
            address,
            reader: BufReader::new(stream),
            writer,
            timeout,
        })
    }

    /// Remote socket address
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    fn map_read_error(&self, command: &str, err: std::io::Error) -> TransportError {
        match err.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => TransportError::Timeout {
                command: command.to_string(),
                timeout: self.timeout,
            },
            _ => TransportError::Io(err),
        }
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        tracing::debug!(command, "scpi_write");
        self.writer.write_all(command.as_bytes())?;
        self.writer.write_all(TERMINATOR.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.write(command)?;

        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .map_err(|e| self.map_read_error(command, e))?;
        if read == 0 {
            return Err(TransportError::Closed);
        }

        let response = line.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!(command, bytes = response.len(), "scpi_response");
        Ok(response)
    }

    fn clear(&mut self) -> Result<(), TransportError> {
        // Drop whatever BufReader already holds, then drain the socket
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);

        let stream = self.reader.get_mut();
        stream.set_nonblocking(true)?;
        let mut scratch = [0u8; 4096];
        let mut discarded = buffered;
        let drained = loop {
            match stream.read(&mut scratch) {
                Ok(0) => break Err(TransportError::Closed),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(TransportError::Io(e)),
            }
        };
        stream.set_nonblocking(false)?;

        if discarded > 0 {
            tracing::debug!(discarded, "Cleared pending input");
        }
        drained
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.reader.get_ref().set_read_timeout(Some(timeout))?;
        self.writer.set_write_timeout(Some(timeout))?;
        self.timeout = timeout;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Minimal SCPI echo server: answers `*IDN?` and records everything else
    fn spawn_server() -> (u16, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut writer = stream;
            let mut received = Vec::new();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 {
                    break;
                }
                let cmd = line.trim_end().to_string();
                if cmd == "*IDN?" {
                    writer
                        .write_all(b"REDPITAYA,INSTR2020,0,01-02\r\n")
                        .unwrap();
                }
                received.push(cmd);
            }
            received
        });

        (port, handle)
    }

    #[test]
    fn test_query_strips_terminator() {
        let (port, server) = spawn_server();
        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_secs(2)).unwrap();

        let idn = transport.query("*IDN?").unwrap();
        assert_eq!(idn, "REDPITAYA,INSTR2020,0,01-02");

        transport.write("ACQ:START").unwrap();
        drop(transport);

        let received = server.join().unwrap();
        assert_eq!(received, vec!["*IDN?", "ACQ:START"]);
    }

    #[test]
    fn test_query_timeout() {
        let (port, _server) = spawn_server();
        let mut transport =
            TcpTransport::connect("127.0.0.1", port, Duration::from_millis(100)).unwrap();

        // The test server never answers this query
        let result = transport.query("ACQ:TRIG:STAT?");
        assert!(matches!(result, Err(TransportError::Timeout { .. })));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let result = TcpTransport::connect("127.0.0.1", port, Duration::from_millis(200));
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
