// Loop rate, topics, chassis geometry, and module hardware layout

use std::time::Duration;

use crate::swerve::kinematics::Corner;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_CHASSIS: &str = "swerve/cmd/chassis"; // commands
pub const TOPIC_RT_TELEMETRY: &str = "swerve/rt/telemetry"; // module telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Chassis frame dimensions. Both are in inches, but exact units don't matter
// as long as both use the same units.
pub const CHASSIS_LENGTH: f64 = 32.0;
pub const CHASSIS_WIDTH: f64 = 28.0;

// Default wheel speed cap handed to the controller during teleop, expressed
// in the same normalized units as the joystick axes.
pub const TELEOP_MAX_WHEEL_SPEED: f64 = 1.0;

/// One swerve module's wiring: which chassis corner it sits on, its
/// preference-store name, and the bus IDs of its two servos.
#[derive(Debug, Clone, Copy)]
pub struct ModuleLayout {
    pub corner: Corner,
    pub name: &'static str,
    pub steer_id: u8,
    pub drive_id: u8,
}

/// Module hardware configuration. The order here is the wiring list from the
/// electrical sheet; the controller re-indexes by `corner`, so this order
/// carries no kinematic meaning.
pub const MODULE_LAYOUT: [ModuleLayout; 4] = [
    ModuleLayout {
        corner: Corner::BackRight,
        name: "Back Right",
        steer_id: 15,
        drive_id: 12,
    },
    ModuleLayout {
        corner: Corner::BackLeft,
        name: "Back Left",
        steer_id: 4,
        drive_id: 10,
    },
    ModuleLayout {
        corner: Corner::FrontRight,
        name: "Front Right",
        steer_id: 1,
        drive_id: 2,
    },
    ModuleLayout {
        corner: Corner::FrontLeft,
        name: "Front Left",
        steer_id: 5,
        drive_id: 13,
    },
];

/// Fallback values used when a module has no persisted configuration yet.
/// Offsets are raw steer encoder readings taken with the wheel pointed
/// chassis-forward.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDefaults {
    pub offset: f64,
    pub drive_reversed: bool,
    pub steer_reversed: bool,
    pub drive_sensor_reverse: bool,
    pub steer_sensor_reverse: bool,
    pub max_wheel_speed: f64,
}

impl Default for ModuleDefaults {
    fn default() -> Self {
        Self {
            offset: 0.0,
            drive_reversed: false,
            steer_reversed: false,
            drive_sensor_reverse: false,
            steer_sensor_reverse: false,
            max_wheel_speed: 370.0,
        }
    }
}
