// Simulation harness: closes the control loop without hardware
//
// The mock actuators record exactly what the controller commanded; this
// reads those targets back, undoes the native-unit and reversal plumbing,
// and runs forward kinematics to estimate the chassis motion the real robot
// would perform.

use std::f64::consts::TAU;

use crate::actuator::MockActuator;
use crate::swerve::{ChassisVelocity, Corner, STEER_NATIVE_RANGE, SwerveDrive, WheelState, forward};

pub struct SimulationHarness;

impl SimulationHarness {
    /// Estimate the chassis velocity produced by the targets currently held
    /// in the drive's mock actuators.
    pub fn estimate(drive: &SwerveDrive<MockActuator>) -> ChassisVelocity {
        let states: [WheelState; 4] = std::array::from_fn(|i| {
            let module = drive.module(Corner::ORDER[i]);
            let config = module.config();

            let native = module.steer_actuator().commanded_position();
            let angle = (native - config.offset) / STEER_NATIVE_RANGE * TAU;

            let mut speed = module.drive_actuator().commanded_velocity() / config.max_wheel_speed;
            if config.drive_reversed {
                // A reversed motor spins the wheel forward on a negative command
                speed = -speed;
            }

            WheelState { angle, speed }
        });

        forward(&states, drive.geometry())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModuleDefaults;
    use crate::prefs::{JsonPreferences, PreferenceStore};
    use crate::swerve::{ChassisGeometry, SwerveModule};

    const TOL: f64 = 1e-6;

    fn drive_with_store(store: &mut JsonPreferences) -> SwerveDrive<MockActuator> {
        let layout = [
            (Corner::FrontLeft, "Front Left", 5u8, 13u8),
            (Corner::FrontRight, "Front Right", 1, 2),
            (Corner::BackLeft, "Back Left", 4, 10),
            (Corner::BackRight, "Back Right", 15, 12),
        ];
        let modules = layout.map(|(corner, name, steer_id, drive_id)| {
            let module = SwerveModule::new(
                name,
                MockActuator::new(steer_id),
                MockActuator::new(drive_id),
                ModuleDefaults::default(),
                store,
            )
            .unwrap();
            (corner, module)
        });
        SwerveDrive::new(ChassisGeometry::new(32.0, 28.0), modules).unwrap()
    }

    fn drive() -> SwerveDrive<MockActuator> {
        drive_with_store(&mut JsonPreferences::in_memory())
    }

    fn assert_estimate(
        d: &mut SwerveDrive<MockActuator>,
        (vx, vy, omega): (f64, f64, f64),
    ) {
        d.drive(vx, vy, omega, 1.0, None).unwrap();
        let estimate = SimulationHarness::estimate(d);
        assert!((estimate.vx - vx).abs() < TOL, "vx: {estimate:?}");
        assert!((estimate.vy - vy).abs() < TOL, "vy: {estimate:?}");
        assert!((estimate.omega - omega).abs() < TOL, "omega: {estimate:?}");
    }

    #[test]
    fn recovers_commanded_motion() {
        let mut d = drive();
        assert_estimate(&mut d, (0.0, 0.0, 0.0));
        assert_estimate(&mut d, (0.5, 0.0, 0.0));
        assert_estimate(&mut d, (0.0, -0.4, 0.0));
        assert_estimate(&mut d, (0.0, 0.0, 0.02));
        assert_estimate(&mut d, (0.3, 0.2, -0.01));
    }

    #[test]
    fn estimate_survives_drive_direction_flips() {
        let mut d = drive();
        // Forward first so the wheels settle at zero steering
        assert_estimate(&mut d, (0.5, 0.0, 0.0));
        // Reversing requests the opposite angle; modules hold orientation
        // and flip the drive instead
        assert_estimate(&mut d, (-0.5, 0.0, 0.0));
        assert!(d.module(Corner::FrontLeft).drive_temp_flipped());
    }

    #[test]
    fn estimate_compensates_reversed_drive_motors() {
        let mut store = JsonPreferences::in_memory();
        store.put_bool("Front Left-reversed", true);
        store.put_bool("Back Right-reversed", true);
        let mut d = drive_with_store(&mut store);
        assert_estimate(&mut d, (0.4, -0.2, 0.0));
    }

    #[test]
    fn steer_offsets_cancel_out() {
        let mut store = JsonPreferences::in_memory();
        store.put_f64("Front Left-offset", 412.0);
        store.put_f64("Back Left-offset", 997.0);
        let mut d = drive_with_store(&mut store);
        assert_estimate(&mut d, (0.0, 0.3, 0.01));
    }

    #[test]
    fn idle_cycle_estimates_zero_motion() {
        let mut d = drive();
        d.drive(0.5, 0.0, 0.0, 1.0, None).unwrap();
        d.drive(0.5, 0.0, 0.0, 0.0, None).unwrap();
        let estimate = SimulationHarness::estimate(&d);
        assert!(estimate.vx.abs() < TOL);
        assert!(estimate.vy.abs() < TOL);
        assert!(estimate.omega.abs() < TOL);
    }
}
