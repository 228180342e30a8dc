//! # Serial transport
//!
//! Line oriented byte transport underneath the actuator driver. The driver only needs four
//! operations, each bounded by an explicit timeout, so the transport is a trait with two
//! implementations:
//!
//! - [`SerialPortTransport`] - a real serial port, through the `serialport` crate.
//! - [`SimTransport`] - an in-memory board used for testing and for running without hardware.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use log::trace;
use serialport::{ClearBuffer, SerialPort};
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Interval between two polls of the port while waiting for data.
const DATA_POLL_INTERVAL: Duration = Duration::from_micros(250);

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A byte stream exchanging newline terminated lines.
pub trait SerialTransport {
    /// Write all of `bytes` within `timeout`, returning the number of bytes written.
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Wait at most `timeout` for incoming data, returning true if some is available.
    fn wait_for_data(&mut self, timeout: Duration) -> bool;

    /// Read one line, without its terminator, within `timeout`.
    fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError>;

    /// Discard any data received but not yet read.
    fn clear_input(&mut self) -> Result<(), TransportError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Options used when opening a serial port.
#[derive(Debug, Clone)]
pub struct SerialOptions {
    pub data_bits: serialport::DataBits,
    pub parity: serialport::Parity,
    pub stop_bits: serialport::StopBits,
    pub flow_control: serialport::FlowControl,

    /// Default timeout of blocking port operations
    pub timeout: Duration,
}

/// Transport over a real serial port.
pub struct SerialPortTransport {
    port: Box<dyn SerialPort>,

    /// Bytes received but not yet returned as a line
    rx_buf: Vec<u8>,
}

/// In-memory transport emulating the board.
///
/// Every query line written (`f ...` and `r ...`) is answered from the queue of scripted
/// responses first, then from the responder function if there is one. A `None` in the queue
/// simulates a board which stays silent.
#[derive(Default)]
pub struct SimTransport {
    written: Vec<String>,
    scripted: VecDeque<Option<String>>,
    responder: Option<Box<dyn FnMut(&str) -> Option<String> + Send>>,
    pending: VecDeque<String>,
    fail_writes: bool,

    /// Number of upcoming writes which fail before the link recovers
    num_writes_to_fail: usize,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Could not open the port: {0}")]
    OpenError(serialport::Error),

    #[error("Could not configure the port: {0}")]
    ConfigError(serialport::Error),

    #[error("Operation timed out")]
    Timeout,

    #[error("Only {written} of {expected} bytes were written")]
    IncompleteWrite { written: usize, expected: usize },

    #[error("I/O error: {0}")]
    IoError(io::Error),

    #[error("Received line is not valid UTF-8")]
    NotUtf8,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            data_bits: serialport::DataBits::Eight,
            parity: serialport::Parity::None,
            stop_bits: serialport::StopBits::One,
            flow_control: serialport::FlowControl::None,
            timeout: Duration::from_millis(10),
        }
    }
}

impl SerialPortTransport {
    /// Open the port at `path` with the given baud rate.
    pub fn open(path: &str, baud_rate: u32, options: SerialOptions) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .data_bits(options.data_bits)
            .parity(options.parity)
            .stop_bits(options.stop_bits)
            .flow_control(options.flow_control)
            .timeout(options.timeout)
            .open()
            .map_err(TransportError::OpenError)?;

        Ok(Self {
            port,
            rx_buf: Vec::new(),
        })
    }

    /// Pop a complete line from the receive buffer if there is one.
    fn take_line(&mut self) -> Option<Result<String, TransportError>> {
        let end = self.rx_buf.iter().position(|&b| b == b'\n')?;

        let mut line: Vec<u8> = self.rx_buf.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }

        Some(String::from_utf8(line).map_err(|_| TransportError::NotUtf8))
    }
}

impl SerialTransport for SerialPortTransport {
    fn write(&mut self, bytes: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        self.port
            .set_timeout(timeout)
            .map_err(TransportError::ConfigError)?;

        self.port.write_all(bytes).map_err(io_to_transport)?;
        self.port.flush().map_err(io_to_transport)?;

        Ok(bytes.len())
    }

    fn wait_for_data(&mut self, timeout: Duration) -> bool {
        if !self.rx_buf.is_empty() {
            return true;
        }

        let start = Instant::now();

        loop {
            match self.port.bytes_to_read() {
                Ok(n) if n > 0 => return true,
                Ok(_) => (),
                Err(e) => {
                    trace!("Could not poll the port: {}", e);
                    return false;
                }
            }

            if start.elapsed() >= timeout {
                return false;
            }

            thread::sleep(DATA_POLL_INTERVAL);
        }
    }

    fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let start = Instant::now();
        let mut chunk = [0u8; 64];

        loop {
            if let Some(line) = self.take_line() {
                return line;
            }

            let remaining = match timeout.checked_sub(start.elapsed()) {
                Some(r) if r > Duration::from_micros(0) => r,
                _ => return Err(TransportError::Timeout),
            };

            self.port
                .set_timeout(remaining)
                .map_err(TransportError::ConfigError)?;

            match self.port.read(&mut chunk) {
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(io_to_transport(e)),
            }
        }
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.rx_buf.clear();
        self.port
            .clear(ClearBuffer::Input)
            .map_err(TransportError::ConfigError)
    }
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a transport which answers every query with `responder`.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: FnMut(&str) -> Option<String> + Send + 'static,
    {
        Self {
            responder: Some(Box::new(responder)),
            ..Default::default()
        }
    }

    /// A board at rest: the encoder reads zero, as do all properties.
    pub fn idle_board() -> Self {
        Self::with_responder(|line| {
            if line.starts_with("f ") {
                Some(String::from("0 0"))
            } else {
                Some(String::from("0"))
            }
        })
    }

    /// Queue the response to the next unanswered query.
    pub fn push_response(&mut self, line: &str) {
        self.scripted.push_back(Some(line.to_string()));
    }

    /// Queue a query which will never be answered.
    pub fn push_silence(&mut self) {
        self.scripted.push_back(None);
    }

    /// Make every following write fail with a timeout.
    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    /// Make only the next `n` writes fail with a timeout.
    pub fn fail_next_writes(&mut self, n: usize) {
        self.num_writes_to_fail = n;
    }

    /// All lines written so far, without terminators.
    pub fn written(&self) -> &[String] {
        &self.written
    }

    /// Forget the lines written so far.
    pub fn clear_written(&mut self) {
        self.written.clear();
    }

    fn answer(&mut self, line: &str) {
        let is_query = line.starts_with("f ") || line.starts_with("r ");
        if !is_query {
            return;
        }

        let response = match self.scripted.pop_front() {
            Some(r) => r,
            None => match self.responder {
                Some(ref mut f) => f(line),
                None => None,
            },
        };

        if let Some(r) = response {
            self.pending.push_back(r);
        }
    }
}

impl SerialTransport for SimTransport {
    fn write(&mut self, bytes: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        if self.fail_writes {
            return Err(TransportError::Timeout);
        }

        if self.num_writes_to_fail > 0 {
            self.num_writes_to_fail -= 1;
            return Err(TransportError::Timeout);
        }

        let text = String::from_utf8_lossy(bytes).into_owned();

        for line in text.lines() {
            self.written.push(line.to_string());
            self.answer(line);
        }

        Ok(bytes.len())
    }

    fn wait_for_data(&mut self, _timeout: Duration) -> bool {
        !self.pending.is_empty()
    }

    fn read_line(&mut self, _timeout: Duration) -> Result<String, TransportError> {
        self.pending.pop_front().ok_or(TransportError::Timeout)
    }

    fn clear_input(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn io_to_transport(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportError::Timeout,
        _ => TransportError::IoError(e),
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn test_sim_scripted_then_responder() {
        let mut sim = SimTransport::with_responder(|line| {
            if line == "r vbus_voltage" {
                Some(String::from("24.0"))
            } else {
                None
            }
        });
        sim.push_response("1.0 2.0");

        sim.write(b"f 0\n", T).unwrap();
        assert!(sim.wait_for_data(T));
        assert_eq!(sim.read_line(T).unwrap(), "1.0 2.0");

        sim.write(b"r vbus_voltage\n", T).unwrap();
        assert_eq!(sim.read_line(T).unwrap(), "24.0");

        // Commands never get a response
        sim.write(b"c 0 0.5\n", T).unwrap();
        assert!(!sim.wait_for_data(T));
        assert!(matches!(sim.read_line(T), Err(TransportError::Timeout)));

        assert_eq!(sim.written(), &["f 0", "r vbus_voltage", "c 0 0.5"]);
    }

    #[test]
    fn test_idle_board() {
        let mut sim = SimTransport::idle_board();

        sim.write(b"f 1\n", T).unwrap();
        sim.write(b"r vbus_voltage\n", T).unwrap();
        assert_eq!(sim.read_line(T).unwrap(), "0 0");
        assert_eq!(sim.read_line(T).unwrap(), "0");
    }

    #[test]
    fn test_sim_silence_and_failures() {
        let mut sim = SimTransport::new();
        sim.push_silence();
        sim.push_response("3");

        sim.write(b"r axis0.current_state\n", T).unwrap();
        assert!(!sim.wait_for_data(T));

        sim.write(b"r axis0.current_state\n", T).unwrap();
        assert_eq!(sim.read_line(T).unwrap(), "3");

        sim.fail_next_writes(1);
        assert!(matches!(sim.write(b"c 0 0\n", T), Err(TransportError::Timeout)));
        sim.write(b"c 0 0\n", T).unwrap();
        assert_eq!(sim.written().len(), 3);

        sim.set_fail_writes(true);
        assert!(matches!(sim.write(b"c 0 0\n", T), Err(TransportError::Timeout)));
        assert_eq!(sim.written().len(), 3);
    }
}
