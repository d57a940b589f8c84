// Instant-servo mock actuator for tests and simulation
//
// Closed-loop position targets are treated as instantly reached, so a
// module reading the sensor back immediately sees the commanded position.
// Velocity and percent targets are recorded as the measured value. Failures
// can be injected to exercise the communication-error path.

use super::{Actuator, BusError, ControlMode, FeedbackSource, Result};

#[derive(Debug, Default)]
pub struct MockActuator {
    id: u8,
    position: f64,
    velocity: f64,
    percent: f64,
    closed_loop_error: f64,
    current: f64,
    feedback: Option<FeedbackSource>,
    sensor_phase: bool,
    inverted: bool,
    last_target: Option<(ControlMode, f64)>,
    fail_next: Option<BusError>,
}

impl MockActuator {
    pub fn new(id: u8) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Force the measured sensor position (e.g. a raw steer encoder reading
    /// before the module is constructed).
    pub fn set_measured_position(&mut self, position: f64) {
        self.position = position;
    }

    pub fn set_measured_velocity(&mut self, velocity: f64) {
        self.velocity = velocity;
    }

    pub fn set_closed_loop_error(&mut self, error: f64) {
        self.closed_loop_error = error;
    }

    pub fn set_output_current(&mut self, current: f64) {
        self.current = current;
    }

    /// Fail the next bus call with the given error.
    pub fn inject_failure(&mut self, error: BusError) {
        self.fail_next = Some(error);
    }

    /// The last target issued, regardless of mode.
    pub fn last_target(&self) -> Option<(ControlMode, f64)> {
        self.last_target
    }

    /// Last commanded closed-loop position (instantly reached).
    pub fn commanded_position(&self) -> f64 {
        self.position
    }

    /// Last commanded closed-loop velocity.
    pub fn commanded_velocity(&self) -> f64 {
        self.velocity
    }

    /// Last commanded percent output.
    pub fn commanded_percent(&self) -> f64 {
        self.percent
    }

    pub fn feedback_source(&self) -> Option<FeedbackSource> {
        self.feedback
    }

    pub fn sensor_phase(&self) -> bool {
        self.sensor_phase
    }

    pub fn inverted(&self) -> bool {
        self.inverted
    }

    fn check_failure(&mut self) -> Result<()> {
        match self.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Actuator for MockActuator {
    fn id(&self) -> u8 {
        self.id
    }

    fn configure_feedback(&mut self, source: FeedbackSource) -> Result<()> {
        self.check_failure()?;
        self.feedback = Some(source);
        Ok(())
    }

    fn set_closed_loop_target(&mut self, mode: ControlMode, value: f64) -> Result<()> {
        self.check_failure()?;
        match mode {
            ControlMode::Position => self.position = value,
            ControlMode::Velocity => self.velocity = value,
            ControlMode::PercentOutput => self.percent = value,
        }
        self.last_target = Some((mode, value));
        Ok(())
    }

    fn position(&mut self) -> Result<f64> {
        self.check_failure()?;
        Ok(self.position)
    }

    fn velocity(&mut self) -> Result<f64> {
        self.check_failure()?;
        Ok(self.velocity)
    }

    fn closed_loop_error(&mut self) -> Result<f64> {
        self.check_failure()?;
        Ok(self.closed_loop_error)
    }

    fn output_current(&mut self) -> Result<f64> {
        self.check_failure()?;
        Ok(self.current)
    }

    fn set_sensor_phase(&mut self, reversed: bool) -> Result<()> {
        self.check_failure()?;
        self.sensor_phase = reversed;
        Ok(())
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<()> {
        self.check_failure()?;
        self.inverted = inverted;
        Ok(())
    }

    fn reset_position(&mut self) -> Result<()> {
        self.check_failure()?;
        self.position = 0.0;
        Ok(())
    }
}
