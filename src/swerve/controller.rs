// Whole-chassis swerve controller
//
// Owns the four modules at fixed chassis geometry. Each drive call optionally
// rotates the translation input into the field frame, runs inverse
// kinematics, and fans the resulting targets out to the modules.

use tracing::warn;

use crate::actuator::Actuator;
use crate::error::{Error, Result};
use crate::prefs::PreferenceStore;
use crate::swerve::kinematics::{self, ChassisCommand, ChassisGeometry, Corner};
use crate::swerve::module::SwerveModule;
use crate::telemetry::TelemetrySink;

/// Passive (alias) rotation of a driver-frame vector into the field frame.
/// Its own inverse under heading negation.
pub fn rotate_to_field(vx: f64, vy: f64, heading: f64) -> (f64, f64) {
    let (sin, cos) = heading.sin_cos();
    (cos * vx + sin * vy, -sin * vx + cos * vy)
}

pub struct SwerveDrive<A: Actuator> {
    geometry: ChassisGeometry,
    /// Modules indexed by `Corner::ORDER`.
    modules: [SwerveModule<A>; 4],
}

impl<A: Actuator> SwerveDrive<A> {
    /// Build a controller from four corner-tagged modules. The wiring list
    /// may come in any order; modules are re-indexed into the canonical
    /// kinematic corner order here.
    pub fn new(
        geometry: ChassisGeometry,
        modules: [(Corner, SwerveModule<A>); 4],
    ) -> Result<Self> {
        let mut slots: [Option<SwerveModule<A>>; 4] = [None, None, None, None];
        for (corner, module) in modules {
            let slot = &mut slots[corner.index()];
            if slot.is_some() {
                return Err(Error::Configuration {
                    key: module.name().to_string(),
                    reason: format!("duplicate module for corner {corner:?}"),
                });
            }
            *slot = Some(module);
        }

        fn filled<A: Actuator>(slot: Option<SwerveModule<A>>) -> Result<SwerveModule<A>> {
            slot.ok_or_else(|| Error::Configuration {
                key: "chassis".to_string(),
                reason: "missing corner module".to_string(),
            })
        }

        let [fl, fr, bl, br] = slots;
        let modules = [filled(fl)?, filled(fr)?, filled(bl)?, filled(br)?];

        Ok(Self { geometry, modules })
    }

    pub fn geometry(&self) -> &ChassisGeometry {
        &self.geometry
    }

    pub fn module(&self, corner: Corner) -> &SwerveModule<A> {
        &self.modules[corner.index()]
    }

    pub fn module_mut(&mut self, corner: Corner) -> &mut SwerveModule<A> {
        &mut self.modules[corner.index()]
    }

    /// Command whole-chassis motion for this control cycle.
    ///
    /// `heading` switches on field-oriented control: the translation input
    /// is interpreted in the driver's frame and rotated by the chassis
    /// heading before kinematics. `max_wheel_speed == 0` means "no operator
    /// input": every drive speed goes to zero but steering targets are left
    /// where they are, so idle cycles do not snap the wheels around.
    ///
    /// A module that fails to accept its command is skipped for this cycle
    /// and retried naturally on the next one; the remaining modules are
    /// still commanded and the first error is returned.
    pub fn drive(
        &mut self,
        vx: f64,
        vy: f64,
        omega: f64,
        max_wheel_speed: f64,
        heading: Option<f64>,
    ) -> Result<()> {
        let (vx, vy) = match heading {
            Some(h) => rotate_to_field(vx, vy, h),
            None => (vx, vy),
        };

        if max_wheel_speed == 0.0 {
            return self.for_each_module(|module| module.set_drive_speed(0.0, false));
        }

        let command = ChassisCommand {
            vx,
            vy,
            omega,
            max_wheel_speed,
        };
        let targets = kinematics::inverse(&command, &self.geometry);

        let mut first_error = None;
        for corner in Corner::ORDER {
            let target = targets[corner.index()];
            let module = &mut self.modules[corner.index()];
            let result = match target.angle {
                Some(angle) => module.set_target(angle, target.speed, false),
                // Wheel has no velocity: hold steering, stop the drive
                None => module.set_drive_speed(0.0, false),
            };
            if let Err(e) = result {
                warn!("module '{}' command failed: {}", module.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Zero every drive encoder (e.g. before a measured-distance move).
    pub fn reset_drive_positions(&mut self) -> Result<()> {
        self.for_each_module(|module| module.reset_drive_position())
    }

    /// Reload every module's configuration. Mode-transition boundaries only.
    pub fn load_config(&mut self, store: &mut dyn PreferenceStore) -> Result<()> {
        let mut first_error = None;
        for module in &mut self.modules {
            if let Err(e) = module.load_config(store) {
                warn!("module '{}' config load failed: {}", module.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn save_config(&self, store: &mut dyn PreferenceStore) {
        for module in &self.modules {
            module.save_config(store);
        }
    }

    pub fn update_telemetry(&mut self, sink: &mut dyn TelemetrySink) -> Result<()> {
        let mut first_error = None;
        for module in &mut self.modules {
            if let Err(e) = module.update_telemetry(sink) {
                warn!("module '{}' telemetry failed: {}", module.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn for_each_module(
        &mut self,
        mut f: impl FnMut(&mut SwerveModule<A>) -> Result<()>,
    ) -> Result<()> {
        let mut first_error = None;
        for module in &mut self.modules {
            if let Err(e) = f(module) {
                warn!("module '{}' command failed: {}", module.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::{BusError, MockActuator};
    use crate::config::ModuleDefaults;
    use crate::prefs::JsonPreferences;

    const TOL: f64 = 1e-9;

    fn drive() -> SwerveDrive<MockActuator> {
        let mut store = JsonPreferences::in_memory();
        let layout = [
            (Corner::BackRight, "Back Right", 15u8, 12u8),
            (Corner::BackLeft, "Back Left", 4, 10),
            (Corner::FrontRight, "Front Right", 1, 2),
            (Corner::FrontLeft, "Front Left", 5, 13),
        ];
        let modules = layout.map(|(corner, name, steer_id, drive_id)| {
            let module = SwerveModule::new(
                name,
                MockActuator::new(steer_id),
                MockActuator::new(drive_id),
                ModuleDefaults::default(),
                &mut store,
            )
            .unwrap();
            (corner, module)
        });
        SwerveDrive::new(ChassisGeometry::new(32.0, 28.0), modules).unwrap()
    }

    #[test]
    fn wiring_order_is_reindexed_by_corner() {
        let drive = drive();
        assert_eq!(drive.module(Corner::FrontLeft).name(), "Front Left");
        assert_eq!(drive.module(Corner::BackRight).name(), "Back Right");
    }

    #[test]
    fn forward_translation_points_wheels_forward() {
        let mut d = drive();
        d.drive(0.5, 0.0, 0.0, 1.0, None).unwrap();
        for corner in Corner::ORDER {
            let module = d.module(corner);
            assert!(module.steer_target().abs() < TOL);
            assert!(
                (module.drive_actuator().commanded_velocity() - 0.5 * 370.0).abs() < TOL,
                "corner {corner:?}"
            );
        }
    }

    #[test]
    fn foc_rotation_is_inverted_by_negated_heading() {
        let (vx, vy) = (0.3, -0.7);
        for heading in [0.0, 0.4, -1.2, 2.9] {
            let (fx, fy) = rotate_to_field(vx, vy, heading);
            let (bx, by) = rotate_to_field(fx, fy, -heading);
            assert!((bx - vx).abs() < TOL);
            assert!((by - vy).abs() < TOL);
        }
    }

    #[test]
    fn heading_of_zero_changes_nothing() {
        let (fx, fy) = rotate_to_field(0.3, -0.7, 0.0);
        assert!((fx - 0.3).abs() < TOL);
        assert!((fy + 0.7).abs() < TOL);
    }

    #[test]
    fn foc_drive_rotates_translation_into_field_frame() {
        let mut d = drive();
        // Driver pushes straight ahead while the chassis faces +90deg; in
        // the field frame the command becomes a pure -y translation.
        let heading = std::f64::consts::FRAC_PI_2;
        d.drive(1.0, 0.0, 0.0, 1.0, Some(heading)).unwrap();
        let expected = (-std::f64::consts::FRAC_PI_2).rem_euclid(std::f64::consts::TAU);
        for corner in Corner::ORDER {
            let target = d.module(corner).steer_target().rem_euclid(std::f64::consts::TAU);
            let diff = (target - expected).abs();
            assert!(diff < 1e-6 || (diff - std::f64::consts::TAU).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_max_wheel_speed_holds_steering() {
        let mut d = drive();
        d.drive(0.0, 0.5, 0.0, 1.0, None).unwrap();
        let held: Vec<f64> = Corner::ORDER
            .iter()
            .map(|&c| d.module(c).steer_target())
            .collect();

        // Idle cycle with a completely different remembered direction
        d.drive(0.5, -0.5, 0.3, 0.0, None).unwrap();
        for (i, corner) in Corner::ORDER.into_iter().enumerate() {
            let module = d.module(corner);
            assert_eq!(module.steer_target(), held[i]);
            assert!(module.drive_actuator().commanded_velocity().abs() < TOL);
        }
    }

    #[test]
    fn zero_command_keeps_wheel_orientation() {
        let mut d = drive();
        d.drive(0.5, 0.5, 0.0, 1.0, None).unwrap();
        let before = d.module(Corner::FrontLeft).steer_target();

        d.drive(0.0, 0.0, 0.0, 1.0, None).unwrap();
        assert_eq!(d.module(Corner::FrontLeft).steer_target(), before);
        assert!(
            d.module(Corner::FrontLeft)
                .drive_actuator()
                .commanded_velocity()
                .abs()
                < TOL
        );
    }

    #[test]
    fn saturated_command_caps_fastest_wheel() {
        let mut d = drive();
        d.drive(1.0, 0.0, 2.0 / d.geometry().radius(), 1.0, None).unwrap();
        let mut max = 0.0f64;
        for corner in Corner::ORDER {
            let v = d.module(corner).drive_actuator().commanded_velocity().abs();
            max = max.max(v);
        }
        assert!((max - 370.0).abs() < 1e-6);
    }

    #[test]
    fn one_failing_module_does_not_block_the_others() {
        let mut d = drive();
        d.module_mut(Corner::FrontLeft)
            .steer_actuator_mut()
            .inject_failure(BusError::Simulated { id: 5 });

        let result = d.drive(0.5, 0.0, 0.0, 1.0, None);
        assert!(matches!(result, Err(Error::Actuator { id: 5, .. })));

        // The other three still got their commands
        for corner in [Corner::FrontRight, Corner::BackLeft, Corner::BackRight] {
            assert!(
                (d.module(corner).drive_actuator().commanded_velocity() - 0.5 * 370.0).abs()
                    < TOL
            );
        }
    }

    #[test]
    fn duplicate_corner_is_a_configuration_error() {
        let mut store = JsonPreferences::in_memory();
        let mut make = |name: &str, corner| {
            let module = SwerveModule::new(
                name,
                MockActuator::new(1),
                MockActuator::new(2),
                ModuleDefaults::default(),
                &mut store,
            )
            .unwrap();
            (corner, module)
        };
        let modules = [
            make("A", Corner::FrontLeft),
            make("B", Corner::FrontLeft),
            make("C", Corner::BackLeft),
            make("D", Corner::BackRight),
        ];
        assert!(matches!(
            SwerveDrive::new(ChassisGeometry::new(32.0, 28.0), modules),
            Err(Error::Configuration { .. })
        ));
    }
}
