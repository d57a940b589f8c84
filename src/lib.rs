pub mod actuator;
pub mod config;
pub mod error;
pub mod messages;
pub mod prefs;
pub mod runtime;
pub mod sim;
pub mod swerve;
pub mod telemetry;

pub use error::{Error, Result};
