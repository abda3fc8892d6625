//! Simulated pump for session tests.
//!
//! Records every frame written to it and answers each command through a
//! caller-supplied responder, so tests can assert on the full exchange
//! history without a serial port.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;

use syringe::{Channel, PumpConfig, TransportError};

type Responder = Box<dyn Fn(&str) -> String>;

struct PumpState {
    frames: Vec<Vec<u8>>,
    written_at: Vec<Instant>,
    pending: VecDeque<u8>,
    responder: Responder,
    fail_on: Option<String>,
    closed: bool,
    close_calls: usize,
}

/// Cloneable handle; every clone sees the same simulated pump.
#[derive(Clone)]
pub struct MockPump {
    state: Rc<RefCell<PumpState>>,
}

#[allow(dead_code)]
impl MockPump {
    /// A pump that never answers.
    pub fn silent() -> Self {
        Self::replying(|_| String::new())
    }

    pub fn replying(responder: impl Fn(&str) -> String + 'static) -> Self {
        Self {
            state: Rc::new(RefCell::new(PumpState {
                frames: Vec::new(),
                written_at: Vec::new(),
                pending: VecDeque::new(),
                responder: Box::new(responder),
                fail_on: None,
                closed: false,
                close_calls: 0,
            })),
        }
    }

    /// Makes writing `command` fail with a write error.
    pub fn failing_on(self, command: &str) -> Self {
        self.state.borrow_mut().fail_on = Some(command.to_string());
        self
    }

    /// Raw frames as written to the wire.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.state.borrow().frames.clone()
    }

    /// When each frame was written, in the order of [`MockPump::frames`].
    pub fn frame_times(&self) -> Vec<Instant> {
        self.state.borrow().written_at.clone()
    }

    /// Command texts written so far, terminator removed.
    pub fn sent(&self) -> Vec<String> {
        self.state
            .borrow()
            .frames
            .iter()
            .map(|frame| String::from_utf8_lossy(frame.strip_suffix(b"\r").unwrap_or(frame)).into_owned())
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub fn close_calls(&self) -> usize {
        self.state.borrow().close_calls
    }
}

impl Channel for MockPump {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(TransportError::Closed);
        }
        let command = String::from_utf8_lossy(bytes.strip_suffix(b"\r").unwrap_or(bytes)).into_owned();
        if state.fail_on.as_deref() == Some(command.as_str()) {
            return Err(TransportError::Write(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "pump unplugged",
            )));
        }
        state.frames.push(bytes.to_vec());
        state.written_at.push(Instant::now());
        let reply = (state.responder)(&command);
        state.pending.extend(reply.into_bytes());
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize, TransportError> {
        let state = self.state.borrow();
        if state.closed {
            return Err(TransportError::Closed);
        }
        Ok(state.pending.len())
    }

    fn read_byte(&mut self) -> Result<u8, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state
            .pending
            .pop_front()
            .ok_or_else(|| TransportError::Read(io::ErrorKind::TimedOut.into()))
    }

    fn close(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }
}

/// In-memory sink for a reporter, readable after the session is gone.
#[derive(Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

#[allow(dead_code)]
impl SharedOutput {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Default settings with every wait set to zero.
pub fn fast_config() -> PumpConfig {
    PumpConfig::from_toml(
        "[timing]\nsettle_secs = 0.0\nreset_delay_secs = 0.0\ncommand_delay_secs = 0.0\n",
    )
    .expect("valid test config")
}
