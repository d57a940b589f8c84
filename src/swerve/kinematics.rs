// Swerve drive kinematics for a four-module chassis
//
// Inverse: chassis velocity command -> per-module (angle, speed) targets.
// Forward: per-module (angle, speed) measurements -> chassis velocity.
// The two share one corner-order mapping and are exact inverses of each
// other as long as no speed normalization kicked in.

/// Chassis corner identifiers. `ORDER` is the canonical index mapping used by
/// every `[_; 4]` kinematics array in this crate; inverse and forward
/// kinematics both index through it, never positionally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    FrontLeft,
    FrontRight,
    BackLeft,
    BackRight,
}

impl Corner {
    pub const ORDER: [Corner; 4] = [
        Corner::FrontLeft,
        Corner::FrontRight,
        Corner::BackLeft,
        Corner::BackRight,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::FrontLeft => 0,
            Corner::FrontRight => 1,
            Corner::BackLeft => 2,
            Corner::BackRight => 3,
        }
    }

    /// Sign of this corner's position relative to the chassis center,
    /// with x pointing forward and y pointing left.
    fn position_signs(self) -> (f64, f64) {
        match self {
            Corner::FrontLeft => (1.0, 1.0),
            Corner::FrontRight => (1.0, -1.0),
            Corner::BackLeft => (-1.0, 1.0),
            Corner::BackRight => (-1.0, -1.0),
        }
    }
}

/// Chassis frame dimensions. The wheelbase radius (center-to-corner
/// distance) is computed once at construction and never changes.
#[derive(Debug, Clone, Copy)]
pub struct ChassisGeometry {
    length: f64,
    width: f64,
    radius: f64,
}

impl ChassisGeometry {
    pub fn new(length: f64, width: f64) -> Self {
        Self {
            length,
            width,
            radius: f64::hypot(length / 2.0, width / 2.0),
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    /// Position of a corner module relative to the chassis center.
    fn corner_position(&self, corner: Corner) -> (f64, f64) {
        let (sx, sy) = corner.position_signs();
        (sx * self.length / 2.0, sy * self.width / 2.0)
    }

    /// Unit vector tangential to the rotation circle at a corner
    /// (the direction a wheel points during pure counter-clockwise spin).
    fn corner_tangent(&self, corner: Corner) -> (f64, f64) {
        let (rx, ry) = self.corner_position(corner);
        (-ry / self.radius, rx / self.radius)
    }
}

/// Desired whole-chassis motion for one control cycle.
#[derive(Debug, Clone, Copy)]
pub struct ChassisCommand {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
    /// Cap on per-wheel speed magnitude; same units as vx/vy.
    pub max_wheel_speed: f64,
}

/// Reconstructed whole-chassis motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChassisVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

/// Per-module output of inverse kinematics. `angle == None` means the wheel
/// speed is zero and the module should hold its last steering target rather
/// than snap to a resting orientation.
#[derive(Debug, Clone, Copy)]
pub struct ModuleCommand {
    pub angle: Option<f64>,
    pub speed: f64,
}

/// Per-module measurement fed to forward kinematics.
#[derive(Debug, Clone, Copy)]
pub struct WheelState {
    pub angle: f64,
    pub speed: f64,
}

const ZERO_SPEED_EPS: f64 = 1e-9;

/// Chassis command -> four module targets, indexed by `Corner::ORDER`.
///
/// Each corner's velocity is the chassis translation plus the rotational
/// contribution `omega x r_corner`. If any wheel speed exceeds the command's
/// cap, all four are scaled by the same factor so the wheel-speed ratios are
/// preserved exactly and the chassis direction is not distorted.
pub fn inverse(cmd: &ChassisCommand, geometry: &ChassisGeometry) -> [ModuleCommand; 4] {
    let mut angles = [0.0f64; 4];
    let mut speeds = [0.0f64; 4];

    for corner in Corner::ORDER {
        let (rx, ry) = geometry.corner_position(corner);
        let wx = cmd.vx - cmd.omega * ry;
        let wy = cmd.vy + cmd.omega * rx;

        let i = corner.index();
        angles[i] = wy.atan2(wx);
        speeds[i] = f64::hypot(wx, wy);
    }

    let max_speed = speeds.iter().cloned().fold(0.0f64, f64::max);
    if max_speed > cmd.max_wheel_speed {
        let scale = cmd.max_wheel_speed / max_speed;
        for speed in &mut speeds {
            *speed *= scale;
        }
    }

    let mut commands = [ModuleCommand {
        angle: None,
        speed: 0.0,
    }; 4];
    for corner in Corner::ORDER {
        let i = corner.index();
        commands[i] = ModuleCommand {
            // A wheel with no velocity has no defined direction; hold the
            // last steering target instead of snapping to atan2(0, 0).
            angle: (speeds[i] > ZERO_SPEED_EPS).then_some(angles[i]),
            speed: speeds[i],
        };
    }
    commands
}

/// Four module measurements -> chassis velocity estimate.
///
/// Input is indexed by `Corner::ORDER`, matching `inverse`. Translation is
/// the average of the wheel velocity vectors; rotation is the average
/// tangential component divided by the wheelbase radius, where each corner's
/// tangent direction carries the diagonal sign pattern.
pub fn forward(states: &[WheelState; 4], geometry: &ChassisGeometry) -> ChassisVelocity {
    let mut vx = 0.0;
    let mut vy = 0.0;
    let mut omega = 0.0;

    for corner in Corner::ORDER {
        let state = &states[corner.index()];
        let wx = state.speed * state.angle.cos();
        let wy = state.speed * state.angle.sin();

        vx += wx;
        vy += wy;

        let (tx, ty) = geometry.corner_tangent(corner);
        omega += (wx * tx + wy * ty) / geometry.radius();
    }

    ChassisVelocity {
        vx: vx * 0.25,
        vy: vy * 0.25,
        omega: omega * 0.25,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-6;

    fn geometry() -> ChassisGeometry {
        ChassisGeometry::new(32.0, 28.0)
    }

    fn round_trip(cmd: ChassisCommand) -> ChassisVelocity {
        let geom = geometry();
        let modules = inverse(&cmd, &geom);
        let states: [WheelState; 4] = std::array::from_fn(|i| WheelState {
            angle: modules[i].angle.unwrap_or(0.0),
            speed: modules[i].speed,
        });
        forward(&states, &geom)
    }

    #[test]
    fn radius_is_half_diagonal() {
        let geom = ChassisGeometry::new(6.0, 8.0);
        assert!((geom.radius() - 5.0).abs() < TOL);
    }

    #[test]
    fn zero_command_holds_angles() {
        let modules = inverse(
            &ChassisCommand {
                vx: 0.0,
                vy: 0.0,
                omega: 0.0,
                max_wheel_speed: 1.0,
            },
            &geometry(),
        );
        for module in &modules {
            assert!(module.angle.is_none());
            assert_eq!(module.speed, 0.0);
        }
    }

    #[test]
    fn pure_translation_points_all_wheels_the_same_way() {
        let modules = inverse(
            &ChassisCommand {
                vx: 0.3,
                vy: 0.4,
                omega: 0.0,
                max_wheel_speed: 1.0,
            },
            &geometry(),
        );
        let expected = 0.4f64.atan2(0.3);
        for module in &modules {
            assert!((module.angle.unwrap() - expected).abs() < TOL);
            assert!((module.speed - 0.5).abs() < TOL);
        }
    }

    #[test]
    fn pure_rotation_is_tangential_everywhere() {
        let geom = geometry();
        let omega = 0.02;
        let modules = inverse(
            &ChassisCommand {
                vx: 0.0,
                vy: 0.0,
                omega,
                max_wheel_speed: 1.0,
            },
            &geom,
        );
        for corner in Corner::ORDER {
            let module = &modules[corner.index()];
            assert!((module.speed - omega * geom.radius()).abs() < TOL);

            let (tx, ty) = geom.corner_tangent(corner);
            let expected = ty.atan2(tx);
            assert!((module.angle.unwrap() - expected).abs() < TOL);
        }
    }

    #[test]
    fn forward_recovers_unsaturated_commands() {
        let cases = [
            (0.0, 0.0, 0.0),
            (0.5, 0.0, 0.0),
            (0.0, -0.3, 0.0),
            (0.0, 0.0, 0.01),
            (0.2, -0.1, -0.008),
        ];
        for (vx, vy, omega) in cases {
            let estimate = round_trip(ChassisCommand {
                vx,
                vy,
                omega,
                max_wheel_speed: 10.0,
            });
            assert!((estimate.vx - vx).abs() < TOL, "vx for case ({vx}, {vy}, {omega})");
            assert!((estimate.vy - vy).abs() < TOL, "vy for case ({vx}, {vy}, {omega})");
            assert!(
                (estimate.omega - omega).abs() < TOL,
                "omega for case ({vx}, {vy}, {omega})"
            );
        }
    }

    #[test]
    fn saturation_preserves_wheel_speed_ratios() {
        // R = 1 so the rotational term alone exceeds the cap
        let geom = ChassisGeometry::new(2.0f64.sqrt(), 2.0f64.sqrt());
        assert!((geom.radius() - 1.0).abs() < TOL);

        let capped = ChassisCommand {
            vx: 1.0,
            vy: 0.0,
            omega: 2.0,
            max_wheel_speed: 1.0,
        };
        let uncapped = ChassisCommand {
            max_wheel_speed: f64::INFINITY,
            ..capped
        };

        let raw = inverse(&uncapped, &geom);
        let scaled = inverse(&capped, &geom);

        let raw_max = raw.iter().map(|m| m.speed).fold(0.0f64, f64::max);
        assert!(raw_max > 1.0, "command must actually saturate");

        let scaled_max = scaled.iter().map(|m| m.speed).fold(0.0f64, f64::max);
        assert!((scaled_max - 1.0).abs() < TOL);

        for i in 0..4 {
            for j in 0..4 {
                let raw_ratio = raw[i].speed / raw[j].speed;
                let scaled_ratio = scaled[i].speed / scaled[j].speed;
                assert!((raw_ratio - scaled_ratio).abs() < TOL);
            }
            // Scaling touches magnitudes only
            assert!((scaled[i].angle.unwrap() - raw[i].angle.unwrap()).abs() < TOL);
        }
    }
}
