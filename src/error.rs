// Error types for the swerve runtime

use crate::actuator::bus::BusError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Steering request was NaN or outside the accepted range.
    /// The module keeps its previous target.
    #[error("invalid steer angle {angle} rad requested for module '{module}'")]
    InvalidAngle { module: String, angle: f64 },

    /// Persisted configuration key was missing or had the wrong type.
    /// Resolved by falling back to the default and persisting it; surfaced
    /// here only when the store itself cannot be read or written.
    #[error("configuration error for key '{key}': {reason}")]
    Configuration { key: String, reason: String },

    /// Hardware read/write failure. Reported to telemetry and retried on the
    /// next control cycle, never within the same cycle.
    #[error("actuator {id} communication failure")]
    Actuator {
        id: u8,
        #[source]
        source: BusError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
