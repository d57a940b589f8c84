// Wire message types for the runtime

use serde::{Deserialize, Serialize};

/// Chassis motion command from teleop/scripts -> runtime.
///
/// Velocities are normalized to -1.0..1.0 joystick units; `heading` (radians)
/// is present only when the sender wants field-oriented control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct DriveCommand {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
}

/// Health status published by the runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    /// No fresh command; the watchdog is holding the chassis still.
    CmdStale,
    /// At least one module rejected its command last cycle.
    Fault,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heading_is_optional_on_the_wire() {
        let cmd: DriveCommand =
            serde_json::from_str(r#"{"vx":0.5,"vy":0.0,"omega":-0.2}"#).unwrap();
        assert_eq!(cmd.vx, 0.5);
        assert!(cmd.heading.is_none());

        let cmd: DriveCommand =
            serde_json::from_str(r#"{"vx":0.0,"vy":0.1,"omega":0.0,"heading":1.57}"#).unwrap();
        assert_eq!(cmd.heading, Some(1.57));
    }

    #[test]
    fn health_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&RuntimeHealth::CmdStale).unwrap(),
            r#""cmd_stale""#
        );
    }
}
