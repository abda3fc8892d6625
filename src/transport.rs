//! The byte channel between controller and pump.

use std::io::{Read, Write};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::{BAUD_RATE, READ_TIMEOUT};
use crate::error::TransportError;

/// A byte-stream link to the pump.
///
/// Implementations must make every operation after a successful
/// [`Channel::close`] fail with [`TransportError::Closed`].
pub trait Channel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Number of received bytes that can be read without blocking.
    fn bytes_available(&mut self) -> Result<usize, TransportError>;

    fn read_byte(&mut self) -> Result<u8, TransportError>;

    fn close(&mut self) -> Result<(), TransportError>;
}

/// A [`Channel`] over a local serial port.
pub struct SerialChannel {
    name: String,
    port: Option<Box<dyn SerialPort>>,
}

impl SerialChannel {
    /// Opens `name` at the pump's fixed 19200 baud, 8N1, no flow control.
    pub fn open(name: &str) -> Result<Self, TransportError> {
        let port = serialport::new(name, BAUD_RATE)
            .timeout(READ_TIMEOUT)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|source| TransportError::Open {
                port: name.to_string(),
                source,
            })?;
        tracing::info!(port = name, baud = BAUD_RATE, "opened serial port");
        Ok(Self {
            name: name.to_string(),
            port: Some(port),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl Channel for SerialChannel {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes).map_err(TransportError::Write)?;
        port.flush().map_err(TransportError::Write)
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let waiting = self.port()?.bytes_to_read().map_err(TransportError::Status)?;
        Ok(waiting as usize)
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut byte = [0u8; 1];
        self.port()?
            .read_exact(&mut byte)
            .map_err(TransportError::Read)?;
        Ok(byte[0])
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let port = self.port.take().ok_or(TransportError::Closed)?;
        drop(port);
        tracing::info!(port = %self.name, "closed serial port");
        Ok(())
    }
}

/// Names of the serial ports present on this machine.
pub fn available_ports() -> Result<Vec<String>, TransportError> {
    let ports = serialport::available_ports().map_err(TransportError::Enumerate)?;
    Ok(ports.into_iter().map(|port| port.port_name).collect())
}
