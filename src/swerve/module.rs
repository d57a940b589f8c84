// One swerve module: a steering servo on an absolute encoder plus a drive
// servo on a quadrature encoder.
//
// Steering works on a continuous (unwrapped) angle so the module can keep
// rotating past a full turn. Each steering command picks the cheapest of the
// physically equivalent targets; reaching the opposite angle and reversing
// the drive direction costs at most a quarter turn instead of a half turn.

use std::collections::VecDeque;
use std::f64::consts::{PI, TAU};

use crate::actuator::{Actuator, ControlMode, FeedbackSource};
use crate::config::ModuleDefaults;
use crate::error::{Error, Result};
use crate::prefs::{PreferenceStore, module_key};
use crate::telemetry::TelemetrySink;

/// Steer encoder native units per full rotation.
pub const STEER_NATIVE_RANGE: f64 = 1024.0;

const NATIVE_PER_RADIAN: f64 = STEER_NATIVE_RANGE / TAU;

/// Steering requests beyond this magnitude are rejected as faults.
const MAX_STEER_REQUEST: f64 = 2.0 * TAU;

/// Ring buffer capacity for drive speed smoothing.
const SPEED_SAMPLE_CAPACITY: usize = 50;

/// Persisted per-module configuration. Read-only to the control path;
/// replaced wholesale by `load_config`.
#[derive(Debug, Clone, Copy)]
pub struct ModuleConfig {
    pub offset: f64,
    pub drive_reversed: bool,
    pub steer_reversed: bool,
    pub drive_sensor_reverse: bool,
    pub steer_sensor_reverse: bool,
    pub max_wheel_speed: f64,
}

impl ModuleConfig {
    fn from_defaults(defaults: &ModuleDefaults) -> Self {
        Self {
            offset: defaults.offset,
            drive_reversed: defaults.drive_reversed,
            steer_reversed: defaults.steer_reversed,
            drive_sensor_reverse: defaults.drive_sensor_reverse,
            steer_sensor_reverse: defaults.steer_sensor_reverse,
            max_wheel_speed: defaults.max_wheel_speed,
        }
    }

    /// Load every field through its typed accessor. Missing keys fall back
    /// to the module's defaults and are persisted by the store itself.
    pub fn load(name: &str, defaults: &ModuleDefaults, store: &mut dyn PreferenceStore) -> Self {
        Self {
            offset: store.get_f64(&module_key(name, "offset"), defaults.offset),
            drive_reversed: store.get_bool(&module_key(name, "reversed"), defaults.drive_reversed),
            steer_reversed: store
                .get_bool(&module_key(name, "steer-reversed"), defaults.steer_reversed),
            drive_sensor_reverse: store.get_bool(
                &module_key(name, "Sensor Reverse"),
                defaults.drive_sensor_reverse,
            ),
            steer_sensor_reverse: store.get_bool(
                &module_key(name, "Steer Sensor Reverse"),
                defaults.steer_sensor_reverse,
            ),
            max_wheel_speed: store.get_f64(
                &module_key(name, "Max Wheel Speed"),
                defaults.max_wheel_speed,
            ),
        }
    }

    pub fn save(&self, name: &str, store: &mut dyn PreferenceStore) {
        store.put_f64(&module_key(name, "offset"), self.offset);
        store.put_bool(&module_key(name, "reversed"), self.drive_reversed);
        store.put_bool(&module_key(name, "steer-reversed"), self.steer_reversed);
        store.put_bool(
            &module_key(name, "Sensor Reverse"),
            self.drive_sensor_reverse,
        );
        store.put_bool(
            &module_key(name, "Steer Sensor Reverse"),
            self.steer_sensor_reverse,
        );
        store.put_f64(&module_key(name, "Max Wheel Speed"), self.max_wheel_speed);
    }
}

pub struct SwerveModule<A: Actuator> {
    name: String,
    steer: A,
    drive: A,
    config: ModuleConfig,
    defaults: ModuleDefaults,
    /// Current steering target in radians, continuous.
    steer_target: f64,
    /// The native-unit position last sent to the steer servo.
    raw_steer_target: f64,
    /// Whether the drive direction is inverted because steering servoed to
    /// the opposite angle. Recomputed on every steering command.
    drive_temp_flipped: bool,
    /// Full rotations accumulated by the steer sensor, refreshed once per
    /// sensor read.
    rotations: i32,
    drive_speed_samples: VecDeque<f64>,
}

impl<A: Actuator> SwerveModule<A> {
    /// Set up both servos and take the initial steering angle from the first
    /// sensor read. Configuration is pulled from the store immediately.
    pub fn new(
        name: impl Into<String>,
        steer: A,
        drive: A,
        defaults: ModuleDefaults,
        store: &mut dyn PreferenceStore,
    ) -> Result<Self> {
        let mut module = Self {
            name: name.into(),
            steer,
            drive,
            config: ModuleConfig::from_defaults(&defaults),
            defaults,
            steer_target: 0.0,
            raw_steer_target: 0.0,
            drive_temp_flipped: false,
            rotations: 0,
            drive_speed_samples: VecDeque::with_capacity(SPEED_SAMPLE_CAPACITY),
        };

        let steer_id = module.steer.id();
        module
            .steer
            .configure_feedback(FeedbackSource::AbsoluteAnalog)
            .map_err(|source| Error::Actuator {
                id: steer_id,
                source,
            })?;

        let drive_id = module.drive.id();
        module
            .drive
            .configure_feedback(FeedbackSource::Quadrature)
            .map_err(|source| Error::Actuator {
                id: drive_id,
                source,
            })?;
        module.reset_drive_position()?;

        module.load_config(store)?;

        let initial = module.read_steer_angle()?;
        module.steer_target = initial;
        module.raw_steer_target = initial * NATIVE_PER_RADIAN + module.config.offset;

        Ok(module)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    pub fn steer_actuator(&self) -> &A {
        &self.steer
    }

    pub fn drive_actuator(&self) -> &A {
        &self.drive
    }

    #[cfg(test)]
    pub(crate) fn steer_actuator_mut(&mut self) -> &mut A {
        &mut self.steer
    }

    #[cfg(test)]
    pub(crate) fn drive_actuator_mut(&mut self) -> &mut A {
        &mut self.drive
    }

    /// Current steering target in radians (continuous).
    pub fn steer_target(&self) -> f64 {
        self.steer_target
    }

    /// Steering target in native units, as last sent to the servo.
    pub fn raw_steer_target(&self) -> f64 {
        self.raw_steer_target
    }

    pub fn drive_temp_flipped(&self) -> bool {
        self.drive_temp_flipped
    }

    /// Current continuous steering angle in radians. Reads the sensor and
    /// refreshes the stored rotation counter.
    pub fn steer_angle(&mut self) -> Result<f64> {
        self.read_steer_angle()
    }

    fn read_steer_angle(&mut self) -> Result<f64> {
        let id = self.steer.id();
        let raw = self
            .steer
            .position()
            .map_err(|source| Error::Actuator { id, source })?;
        let turns = (raw - self.config.offset) / STEER_NATIVE_RANGE;
        self.rotations = turns.trunc() as i32;
        Ok(turns * TAU)
    }

    /// Steer towards `angle_radians` (0 = chassis forward) along the
    /// shortest path, possibly servoing to the opposite angle and flagging
    /// the drive direction for reversal.
    pub fn set_steer_angle(&mut self, angle_radians: f64) -> Result<()> {
        if !angle_radians.is_finite() || angle_radians.abs() > MAX_STEER_REQUEST {
            return Err(Error::InvalidAngle {
                module: self.name.clone(),
                angle: angle_radians,
            });
        }

        let current = self.read_steer_angle()?;
        let adjusted = angle_radians + f64::from(self.rotations) * TAU;

        // Equivalent targets, in tie-break order. The +/- pi pair reaches the
        // opposite wheel orientation and requires reversing the drive.
        let candidates = [
            adjusted + PI,
            adjusted - PI,
            adjusted + TAU,
            adjusted - TAU,
        ];

        let mut shortest = adjusted;
        let mut reverse_drive = false;
        for (i, &candidate) in candidates.iter().enumerate() {
            if (candidate - current).abs() < (shortest - current).abs() {
                shortest = candidate;
                reverse_drive = i < 2;
            }
        }

        self.steer_target = shortest;
        self.drive_temp_flipped = reverse_drive;

        let native = shortest * NATIVE_PER_RADIAN + self.config.offset;
        self.raw_steer_target = native;

        let id = self.steer.id();
        self.steer
            .set_closed_loop_target(ControlMode::Position, native)
            .map_err(|source| Error::Actuator { id, source })
    }

    /// Drive at `speed`, a signed fraction of the module's configured
    /// maximum wheel speed. With `direct` set, `speed` is passed through as
    /// a raw native velocity target instead.
    pub fn set_drive_speed(&mut self, speed: f64, direct: bool) -> Result<()> {
        let signed = speed * self.drive_sign();
        let target = if direct {
            signed
        } else {
            signed * self.config.max_wheel_speed
        };

        let id = self.drive.id();
        self.drive
            .set_closed_loop_target(ControlMode::Velocity, target)
            .map_err(|source| Error::Actuator { id, source })
    }

    /// Open-loop drive output, -1.0..1.0.
    pub fn set_drive_percent(&mut self, pct_out: f64) -> Result<()> {
        let id = self.drive.id();
        self.drive
            .set_closed_loop_target(ControlMode::PercentOutput, pct_out * self.drive_sign())
            .map_err(|source| Error::Actuator { id, source })
    }

    /// Closed-loop drive position target in encoder ticks, for fixed
    /// distance moves.
    pub fn set_drive_distance(&mut self, ticks: f64) -> Result<()> {
        let id = self.drive.id();
        self.drive
            .set_closed_loop_target(ControlMode::Position, ticks * self.drive_sign())
            .map_err(|source| Error::Actuator { id, source })
    }

    fn drive_sign(&self) -> f64 {
        let mut sign = 1.0;
        if self.config.drive_reversed {
            sign = -sign;
        }
        if self.drive_temp_flipped {
            sign = -sign;
        }
        sign
    }

    /// Set a steering angle and a drive speed together.
    pub fn set_target(&mut self, angle_radians: f64, speed: f64, direct: bool) -> Result<()> {
        self.set_steer_angle(angle_radians)?;
        self.set_drive_speed(speed, direct)
    }

    /// Zero the drive encoder. Steering state is untouched.
    pub fn reset_drive_position(&mut self) -> Result<()> {
        let id = self.drive.id();
        self.drive
            .reset_position()
            .map_err(|source| Error::Actuator { id, source })
    }

    /// Reload configuration from the store and apply sensor phase and
    /// inversion settings to the servos. Blocking; call only at mode
    /// transitions.
    pub fn load_config(&mut self, store: &mut dyn PreferenceStore) -> Result<()> {
        let config = ModuleConfig::load(&self.name, &self.defaults, store);

        let drive_id = self.drive.id();
        self.drive
            .set_sensor_phase(config.drive_sensor_reverse)
            .map_err(|source| Error::Actuator {
                id: drive_id,
                source,
            })?;

        let steer_id = self.steer.id();
        self.steer
            .set_sensor_phase(config.steer_sensor_reverse)
            .map_err(|source| Error::Actuator {
                id: steer_id,
                source,
            })?;
        self.steer
            .set_inverted(config.steer_reversed)
            .map_err(|source| Error::Actuator {
                id: steer_id,
                source,
            })?;

        self.config = config;
        Ok(())
    }

    pub fn save_config(&self, store: &mut dyn PreferenceStore) {
        self.config.save(&self.name, store);
    }

    /// Mean of the recent drive speed samples; zero before the first sample.
    pub fn smoothed_drive_speed(&self) -> f64 {
        if self.drive_speed_samples.is_empty() {
            return 0.0;
        }
        self.drive_speed_samples.iter().sum::<f64>() / self.drive_speed_samples.len() as f64
    }

    /// Push current measurements to the telemetry sink. Read-only against
    /// the actuators apart from sampling the drive speed into the smoothing
    /// buffer.
    pub fn update_telemetry(&mut self, sink: &mut dyn TelemetrySink) -> Result<()> {
        let drive_id = self.drive.id();
        let steer_id = self.steer.id();

        let sample = self
            .drive
            .velocity()
            .map_err(|source| Error::Actuator {
                id: drive_id,
                source,
            })?;
        if self.drive_speed_samples.len() == SPEED_SAMPLE_CAPACITY {
            self.drive_speed_samples.pop_front();
        }
        self.drive_speed_samples.push_back(sample);

        let steer_position = self
            .steer
            .position()
            .map_err(|source| Error::Actuator {
                id: steer_id,
                source,
            })?;
        let drive_ticks = self
            .drive
            .position()
            .map_err(|source| Error::Actuator {
                id: drive_id,
                source,
            })?;
        let steer_error = self
            .steer
            .closed_loop_error()
            .map_err(|source| Error::Actuator {
                id: steer_id,
                source,
            })?;
        let drive_error = self
            .drive
            .closed_loop_error()
            .map_err(|source| Error::Actuator {
                id: drive_id,
                source,
            })?;
        let steer_current = self
            .steer
            .output_current()
            .map_err(|source| Error::Actuator {
                id: steer_id,
                source,
            })?;
        let drive_current = self
            .drive
            .output_current()
            .map_err(|source| Error::Actuator {
                id: drive_id,
                source,
            })?;

        sink.publish(&format!("{} CL Position", self.name), steer_position);
        sink.publish(&format!("{} Drive Ticks", self.name), drive_ticks);
        sink.publish(
            &format!("{} Drive Velocity", self.name),
            self.smoothed_drive_speed(),
        );
        sink.publish(&format!("{} Steer Error", self.name), steer_error);
        sink.publish(&format!("{} Drive Error", self.name), drive_error);
        sink.publish(&format!("{} Steer Current", self.name), steer_current);
        sink.publish(&format!("{} Drive Current", self.name), drive_current);
        Ok(())
    }
}
