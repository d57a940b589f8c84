// Swerve drive control
//
// Provides:
// - Inverse/forward chassis kinematics sharing one corner mapping
// - Per-module shortest-path steering with continuous-angle tracking
// - The whole-chassis controller with optional field-oriented control

pub mod controller;
pub mod kinematics;
pub mod module;

pub use controller::{SwerveDrive, rotate_to_field};
pub use kinematics::{
    ChassisCommand, ChassisGeometry, ChassisVelocity, Corner, ModuleCommand, WheelState, forward,
    inverse,
};
pub use module::{ModuleConfig, STEER_NATIVE_RANGE, SwerveModule};
