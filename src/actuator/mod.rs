// Actuator abstraction for swerve modules
//
// Each module owns two actuators (steer and drive) behind one capability
// trait, so the control logic is identical against real serial servos and
// the instant-servo mock used by tests and simulation.

pub mod bus;
pub mod mock;

pub use bus::{BusActuator, BusError, ServoBus};
pub use mock::MockActuator;

pub type Result<T> = std::result::Result<T, BusError>;

/// Closed-loop control modes an actuator target can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    Position,
    Velocity,
    PercentOutput,
}

/// Which sensor the actuator's closed loop runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSource {
    /// Absolute analog encoder, 1024 native units per rotation. Used by the
    /// steering axis.
    AbsoluteAnalog,
    /// Incremental quadrature encoder. Used by the drive axis.
    Quadrature,
}

/// Capability surface consumed per module axis. All calls complete
/// synchronously; a failure is reported, never retried within the cycle.
pub trait Actuator {
    fn id(&self) -> u8;

    fn configure_feedback(&mut self, source: FeedbackSource) -> Result<()>;

    fn set_closed_loop_target(&mut self, mode: ControlMode, value: f64) -> Result<()>;

    fn position(&mut self) -> Result<f64>;

    fn velocity(&mut self) -> Result<f64>;

    fn closed_loop_error(&mut self) -> Result<f64>;

    fn output_current(&mut self) -> Result<f64>;

    fn set_sensor_phase(&mut self, reversed: bool) -> Result<()>;

    fn set_inverted(&mut self, inverted: bool) -> Result<()>;

    /// Zero the position counter. Leaves every other setting untouched.
    fn reset_position(&mut self) -> Result<()>;
}
