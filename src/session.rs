//! # Pump session
//!
//! A [`PumpSession`] owns the channel to one pump. Starting a session resets
//! the pump and programs the syringe diameter; afterwards commands are sent
//! one at a time, each followed by a fixed wait and a read of whatever the
//! pump has answered so far.
//!
//! The channel is closed exactly once: at the end of [`PumpSession::run_recipe`],
//! on [`PumpSession::close`], when starting the session fails, or on drop.

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{PumpConfig, ResponsePolicy, Timing};
use crate::error::{PumpError, Result, TransportError};
use crate::recipe::Recipe;
use crate::report::Reporter;
use crate::transport::{Channel, SerialChannel};

/// Carriage return; the only terminator the pump accepts.
pub const COMMAND_TERMINATOR: u8 = 0x0D;

pub const RESET_COMMAND: &str = "*RESET";

/// Volume pushed through the line by [`PumpSession::flush_line`] by default.
pub const DEFAULT_FLUSH_LENGTH: u32 = 200;

/// Interval between polls of the input buffer under a deadline policy.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Returns `text` framed for the wire, or an error if the text would break
/// the framing.
pub fn frame_command(text: &str) -> Result<Vec<u8>> {
    if text.contains(['\r', '\n']) {
        return Err(PumpError::InvalidCommand(text.to_string()));
    }
    let mut frame = Vec::with_capacity(text.len() + 1);
    frame.extend_from_slice(text.as_bytes());
    frame.push(COMMAND_TERMINATOR);
    Ok(frame)
}

pub struct PumpSession<C: Channel> {
    channel: Option<C>,
    recipe: Recipe,
    timing: Timing,
    policy: ResponsePolicy,
    reporter: Box<dyn Reporter>,
}

impl PumpSession<SerialChannel> {
    /// Opens the serial port `port` and starts a session on it.
    pub fn open(
        port: &str,
        recipe: Recipe,
        config: &PumpConfig,
        reporter: Box<dyn Reporter>,
    ) -> Result<Self> {
        let channel = SerialChannel::open(port)?;
        Self::start(channel, recipe, config, reporter)
    }

    /// Loads the recipe at `path` using the configured field matching, then
    /// behaves like [`PumpSession::open`]. The port is not touched when the
    /// recipe fails to load.
    pub fn open_recipe_file(
        port: &str,
        path: impl AsRef<Path>,
        config: &PumpConfig,
        reporter: Box<dyn Reporter>,
    ) -> Result<Self> {
        let recipe = Recipe::load_with(path, config.recipe.field_matching)?;
        Self::open(port, recipe, config, reporter)
    }
}

impl<C: Channel> PumpSession<C> {
    /// Takes ownership of an open channel, resets the pump and programs the
    /// recipe's diameter. The channel is closed if any step fails.
    pub fn start(
        channel: C,
        recipe: Recipe,
        config: &PumpConfig,
        reporter: Box<dyn Reporter>,
    ) -> Result<Self> {
        let mut session = Self {
            channel: Some(channel),
            recipe,
            timing: Timing::ZERO,
            policy: ResponsePolicy::Quiet,
            reporter,
        };
        // Dropping `session` on any early return closes the channel.
        session.timing = config.timing()?;
        session.policy = config.response_policy()?;

        thread::sleep(session.timing.settle);
        session.send_command_with_delay(RESET_COMMAND, session.timing.reset_delay)?;
        let dia = session.recipe.diameter_command();
        session.send_command(&dia)?;
        tracing::info!(diameter = session.recipe.diameter(), "pump reset and syringe programmed");
        Ok(session)
    }

    /// Loads the recipe at `path` with the configured field matching and
    /// starts a session on `channel`. The channel is closed if the recipe
    /// does not load.
    pub fn start_recipe_file(
        mut channel: C,
        path: impl AsRef<Path>,
        config: &PumpConfig,
        reporter: Box<dyn Reporter>,
    ) -> Result<Self> {
        match Recipe::load_with(path, config.recipe.field_matching) {
            Ok(recipe) => Self::start(channel, recipe, config, reporter),
            Err(err) => {
                if let Err(close_err) = channel.close() {
                    tracing::warn!(error = %close_err, "failed to close pump channel");
                }
                Err(err.into())
            }
        }
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Sends one command with the configured post-command delay and returns
    /// the pump's reply.
    pub fn send_command(&mut self, text: &str) -> Result<String> {
        self.send_command_with_delay(text, self.timing.command_delay)
    }

    pub fn send_command_with_delay(&mut self, text: &str, delay: Duration) -> Result<String> {
        let frame = frame_command(text)?;
        let channel = self.channel.as_mut().ok_or(TransportError::Closed)?;
        channel.write_all(&frame)?;
        thread::sleep(delay);
        let response = read_response(channel, self.policy)?;

        tracing::debug!(sent = text, received = %response.escape_debug(), "pump exchange");
        self.reporter
            .exchange(text, &response)
            .map_err(PumpError::Report)?;
        Ok(response)
    }

    /// Replays the recipe's commands `cycles` times, then closes the channel.
    ///
    /// The channel is closed whether or not the run succeeded; the first
    /// failing command ends the run.
    pub fn run_recipe(&mut self) -> Result<()> {
        let outcome = self.replay();
        let closed = self.close();
        outcome.and(closed)
    }

    fn replay(&mut self) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::Closed.into());
        }
        let cycles = self.recipe.cycles();
        let commands = self.recipe.commands().to_vec();
        for cycle in 1..=cycles {
            tracing::info!(cycle, cycles, "starting cycle");
            for command in &commands {
                self.send_command(command)?;
            }
        }
        tracing::info!(cycles, "recipe complete");
        Ok(())
    }

    /// Pushes `flush_length` through the line at a high rate to clear air
    /// from the tubing. Leaves the channel open.
    pub fn flush_line(&mut self, flush_length: u32) -> Result<()> {
        tracing::info!(flush_length, "flushing line");
        self.send_command("RAT 1000 UM")?;
        self.send_command(&format!("VOL {flush_length}"))?;
        self.send_command("DIR INF")?;
        self.send_command("RUN")?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        let mut channel = self.channel.take().ok_or(TransportError::Closed)?;
        channel.close()?;
        Ok(())
    }
}

impl<C: Channel> Drop for PumpSession<C> {
    fn drop(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            if let Err(err) = channel.close() {
                tracing::warn!(error = %err, "failed to close pump channel");
            }
        }
    }
}

fn read_response<C: Channel>(channel: &mut C, policy: ResponsePolicy) -> Result<String> {
    let mut response = Vec::new();
    match policy {
        ResponsePolicy::Quiet => {
            while channel.bytes_available()? > 0 {
                response.push(channel.read_byte()?);
            }
        }
        ResponsePolicy::Deadline {
            timeout,
            quiet_period,
            terminator,
        } => {
            let started = Instant::now();
            let mut last_byte: Option<Instant> = None;
            'poll: loop {
                let available = channel.bytes_available()?;
                for _ in 0..available {
                    let byte = channel.read_byte()?;
                    response.push(byte);
                    last_byte = Some(Instant::now());
                    if terminator == Some(byte) {
                        break 'poll;
                    }
                    if started.elapsed() >= timeout {
                        break;
                    }
                }
                let now = Instant::now();
                if now.duration_since(started) >= timeout {
                    tracing::debug!(?timeout, bytes = response.len(), "response deadline reached");
                    break;
                }
                if available > 0 {
                    continue;
                }
                if last_byte.is_some_and(|at| now.duration_since(at) >= quiet_period) {
                    break;
                }
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
    Ok(String::from_utf8_lossy(&response).into_owned())
}
