//! Error types for recipe loading, the serial transport and configuration.

use std::num::{ParseFloatError, ParseIntError};
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating a recipe.
#[derive(Debug, Error)]
pub enum RecipeError {
    /// The recipe file could not be read.
    #[error("failed to read recipe {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// A `cycles` or `diameter` line has no `=` to split on.
    #[error("line {line}: field `{field}` has no `=` value")]
    MissingValue { line: usize, field: &'static str },
    /// The right-hand side of `cycles` is not an integer.
    #[error("line {line}: invalid cycles value `{value}`: {source}")]
    InvalidCycles {
        line: usize,
        value: String,
        #[source]
        source: ParseIntError,
    },
    /// The right-hand side of `diameter` is not a number.
    #[error("line {line}: invalid diameter value `{value}`: {source}")]
    InvalidDiameter {
        line: usize,
        value: String,
        #[source]
        source: ParseFloatError,
    },
    #[error("recipe does not set `cycles`")]
    MissingCycles,
    #[error("recipe does not set `diameter`")]
    MissingDiameter,
    #[error("cycles must be at least 1")]
    ZeroCycles,
    #[error("diameter must be a positive number of millimetres, got {0}")]
    DiameterOutOfRange(f64),
    #[error("recipe contains no commands")]
    NoCommands,
    /// An in-memory command is blank or spans more than one line.
    #[error("invalid recipe command {0:?}")]
    InvalidCommand(String),
}

/// Errors raised by the serial channel.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial write failed: {0}")]
    Write(#[source] std::io::Error),
    #[error("serial read failed: {0}")]
    Read(#[source] std::io::Error),
    /// Querying the number of buffered input bytes failed.
    #[error("failed to query serial input buffer: {0}")]
    Status(#[source] serialport::Error),
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(#[source] serialport::Error),
    /// The channel has already been closed.
    #[error("serial channel is closed")]
    Closed,
}

/// Errors raised while loading a [`crate::config::PumpConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level error for pump sessions.
#[derive(Debug, Error)]
pub enum PumpError {
    #[error(transparent)]
    Recipe(#[from] RecipeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The exchange happened but could not be written to the operator output.
    #[error("failed to report pump exchange: {0}")]
    Report(#[source] std::io::Error),
    /// Command text would break the carriage-return framing.
    #[error("command {0:?} contains a line terminator")]
    InvalidCommand(String),
}

pub type Result<T> = std::result::Result<T, PumpError>;
