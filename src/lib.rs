//! # Syringe Pump Driver Library
//!
//! This library drives a laboratory syringe pump over a serial link. It loads
//! a small text recipe of pump commands and replays it against the device a
//! configured number of times, enforcing the pump's command framing and its
//! fixed-wait response timing.

pub mod config;
pub mod error;
pub mod logging;
pub mod recipe;
pub mod report;
pub mod session;
pub mod transport;

pub use config::{PumpConfig, ResponsePolicy, Timing};
pub use error::{ConfigError, PumpError, RecipeError, Result, TransportError};
pub use recipe::{FieldMatching, Recipe};
pub use report::{PlainReporter, Reporter, StyledReporter};
pub use session::{PumpSession, DEFAULT_FLUSH_LENGTH};
pub use transport::{available_ports, Channel, SerialChannel};
