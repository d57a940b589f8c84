// Serial protocol for the steer/drive servos
//
// Frame layout: [0xFF, 0xFF, id, len, instruction, params..., checksum],
// where len counts instruction + params + checksum and the checksum is the
// complement of the byte sum after the header. Register values are
// little-endian 16-bit; positions and closed-loop errors are two's
// complement, velocities, PWM duty, and current readings are sign-magnitude
// (bit 15 = direction, bits 0-14 = magnitude).

use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serialport::{self, SerialPort};
use tracing::debug;

use super::{Actuator, ControlMode, FeedbackSource, Result};

pub const DEFAULT_BAUDRATE: u32 = 1_000_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Percent output -1.0..1.0 maps to +/-1000 raw PWM duty.
const PWM_FULL_SCALE: f64 = 1000.0;

const HEADER: [u8; 2] = [0xFF, 0xFF];

#[repr(u8)]
#[derive(Debug, Clone, Copy)]
enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
}

/// RAM register addresses.
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    FeedbackSource = 26,  // 0=absolute analog, 1=quadrature
    ControlMode = 33,     // 0=position, 1=velocity, 2=pwm
    TorqueEnable = 40,
    GoalPosition = 42,    // two's complement
    GoalVelocity = 46,    // sign-magnitude
    GoalPwm = 48,         // sign-magnitude, +/-1000
    SensorPhase = 50,
    MotorInvert = 51,
    Lock = 55,
    PresentPosition = 56, // two's complement
    PresentVelocity = 58, // sign-magnitude
    ClosedLoopError = 60, // two's complement
    PresentCurrent = 69,  // sign-magnitude
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response from servo {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for servo {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Servo {id} returned error status: 0x{status:02X}")]
    ServoError { id: u8, status: u8 },

    #[error("Timeout waiting for response from servo {id}")]
    Timeout { id: u8 },

    #[error("Servo bus lock poisoned")]
    Poisoned,

    /// Injected by the mock actuator in tests
    #[error("Simulated communication failure on actuator {id}")]
    Simulated { id: u8 },
}

/// One serial port shared by every servo on the chain. Commands are strictly
/// request/response; nothing is pipelined.
pub struct ServoBus {
    port: Box<dyn SerialPort>,
}

impl ServoBus {
    pub fn open(port_name: &str) -> Result<Self> {
        Self::open_with_baudrate(port_name, DEFAULT_BAUDRATE)
    }

    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;
        Ok(Self { port })
    }

    /// Complement checksum over everything after the header.
    fn checksum(payload: &[u8]) -> u8 {
        let sum: u16 = payload.iter().map(|&b| u16::from(b)).sum();
        (!sum & 0xFF) as u8
    }

    fn frame(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(6 + params.len());
        out.extend_from_slice(&HEADER);
        out.push(id);
        out.push((params.len() + 2) as u8);
        out.push(instruction as u8);
        out.extend_from_slice(params);
        let check = Self::checksum(&out[2..]);
        out.push(check);
        out
    }

    /// Send one frame and return the reply's parameter bytes.
    fn exchange(&mut self, id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>> {
        let frame = Self::frame(id, instruction, params);
        self.port.write_all(&frame)?;
        self.port.flush()?;
        self.read_reply(id)
    }

    fn read_reply(&mut self, id: u8) -> Result<Vec<u8>> {
        let mut head = [0u8; 4];
        self.port.read_exact(&mut head).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                BusError::Timeout { id }
            } else {
                BusError::Io(e)
            }
        })?;

        if head[..2] != HEADER {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("bad header: {:02X?}", &head[..2]),
            });
        }
        if head[2] != id {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("reply from servo {} instead", head[2]),
            });
        }

        // len counts status + params + checksum
        let len = head[3] as usize;
        if len < 2 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("reply length {len} too short"),
            });
        }
        let mut body = vec![0u8; len];
        self.port.read_exact(&mut body)?;

        let mut checked = vec![head[2], head[3]];
        checked.extend_from_slice(&body[..len - 1]);
        if Self::checksum(&checked) != body[len - 1] {
            return Err(BusError::ChecksumMismatch { id });
        }

        let status = body[0];
        if status != 0 {
            return Err(BusError::ServoError { id, status });
        }

        body.truncate(len - 1);
        body.remove(0);
        Ok(body)
    }

    /// Ping a servo; a timeout means "not present", any other failure is an
    /// actual bus fault.
    pub fn ping(&mut self, id: u8) -> Result<bool> {
        match self.exchange(id, Instruction::Ping, &[]) {
            Ok(_) => Ok(true),
            Err(BusError::Timeout { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn write_register(&mut self, id: u8, register: Register, data: &[u8]) -> Result<()> {
        debug!("servo {} write reg={:?} data={:02X?}", id, register, data);
        let mut params = Vec::with_capacity(1 + data.len());
        params.push(register as u8);
        params.extend_from_slice(data);
        self.exchange(id, Instruction::Write, &params)?;
        Ok(())
    }

    fn read_register_u16(&mut self, id: u8, register: Register) -> Result<u16> {
        let reply = self.exchange(id, Instruction::Read, &[register as u8, 2])?;
        if reply.len() < 2 {
            return Err(BusError::InvalidResponse {
                id,
                reason: format!("expected 2 bytes, got {}", reply.len()),
            });
        }
        Ok(u16::from_le_bytes([reply[0], reply[1]]))
    }

    pub fn write_u8(&mut self, id: u8, register: Register, value: u8) -> Result<()> {
        self.write_register(id, register, &[value])
    }

    /// Write a two's-complement value (positions).
    pub fn write_i16(&mut self, id: u8, register: Register, value: i16) -> Result<()> {
        self.write_register(id, register, &(value as u16).to_le_bytes())
    }

    /// Write a sign-magnitude value (velocities, PWM).
    pub fn write_i16_sign_magnitude(
        &mut self,
        id: u8,
        register: Register,
        value: i16,
    ) -> Result<()> {
        self.write_register(id, register, &encode_sign_magnitude(value).to_le_bytes())
    }

    /// Read a two's-complement value (positions, closed-loop error).
    pub fn read_i16(&mut self, id: u8, register: Register) -> Result<i16> {
        Ok(self.read_register_u16(id, register)? as i16)
    }

    /// Read a sign-magnitude value (velocities, current).
    pub fn read_i16_sign_magnitude(&mut self, id: u8, register: Register) -> Result<i16> {
        Ok(decode_sign_magnitude(self.read_register_u16(id, register)?))
    }

    /// Torque on plus register lock, the required order for this servo family.
    pub fn enable_torque(&mut self, id: u8) -> Result<()> {
        self.write_u8(id, Register::TorqueEnable, 1)?;
        self.write_u8(id, Register::Lock, 1)
    }
}

/// One servo on a shared bus, seen through the `Actuator` capability trait.
/// All eight module servos hold handles to the same underlying port.
pub struct BusActuator {
    bus: Arc<Mutex<ServoBus>>,
    id: u8,
    // Last control mode written, so the mode register is only touched on change
    mode: Option<ControlMode>,
}

impl BusActuator {
    pub fn new(bus: Arc<Mutex<ServoBus>>, id: u8) -> Self {
        Self {
            bus,
            id,
            mode: None,
        }
    }

    fn bus(&self) -> Result<MutexGuard<'_, ServoBus>> {
        self.bus.lock().map_err(|_| BusError::Poisoned)
    }

    fn select_mode(&mut self, mode: ControlMode) -> Result<()> {
        if self.mode == Some(mode) {
            return Ok(());
        }
        let value = match mode {
            ControlMode::Position => 0u8,
            ControlMode::Velocity => 1,
            ControlMode::PercentOutput => 2,
        };
        self.bus()?.write_u8(self.id, Register::ControlMode, value)?;
        self.mode = Some(mode);
        Ok(())
    }
}

impl Actuator for BusActuator {
    fn id(&self) -> u8 {
        self.id
    }

    fn configure_feedback(&mut self, source: FeedbackSource) -> Result<()> {
        let value = match source {
            FeedbackSource::AbsoluteAnalog => 0u8,
            FeedbackSource::Quadrature => 1,
        };
        self.bus()?.write_u8(self.id, Register::FeedbackSource, value)
    }

    fn set_closed_loop_target(&mut self, mode: ControlMode, value: f64) -> Result<()> {
        self.select_mode(mode)?;
        let id = self.id;
        let mut bus = self.bus()?;
        match mode {
            ControlMode::Position => {
                let raw = value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16;
                bus.write_i16(id, Register::GoalPosition, raw)
            }
            ControlMode::Velocity => {
                let raw = value.round().clamp(-(0x7FFF as f64), 0x7FFF as f64) as i16;
                bus.write_i16_sign_magnitude(id, Register::GoalVelocity, raw)
            }
            ControlMode::PercentOutput => {
                let raw = (value * PWM_FULL_SCALE)
                    .round()
                    .clamp(-PWM_FULL_SCALE, PWM_FULL_SCALE) as i16;
                bus.write_i16_sign_magnitude(id, Register::GoalPwm, raw)
            }
        }
    }

    fn position(&mut self) -> Result<f64> {
        Ok(self.bus()?.read_i16(self.id, Register::PresentPosition)? as f64)
    }

    fn velocity(&mut self) -> Result<f64> {
        Ok(self
            .bus()?
            .read_i16_sign_magnitude(self.id, Register::PresentVelocity)? as f64)
    }

    fn closed_loop_error(&mut self) -> Result<f64> {
        Ok(self.bus()?.read_i16(self.id, Register::ClosedLoopError)? as f64)
    }

    fn output_current(&mut self) -> Result<f64> {
        Ok(self
            .bus()?
            .read_i16_sign_magnitude(self.id, Register::PresentCurrent)? as f64)
    }

    fn set_sensor_phase(&mut self, reversed: bool) -> Result<()> {
        self.bus()?
            .write_u8(self.id, Register::SensorPhase, reversed as u8)
    }

    fn set_inverted(&mut self, inverted: bool) -> Result<()> {
        self.bus()?
            .write_u8(self.id, Register::MotorInvert, inverted as u8)
    }

    fn reset_position(&mut self) -> Result<()> {
        self.bus()?.write_i16(self.id, Register::PresentPosition, 0)
    }
}

fn encode_sign_magnitude(value: i16) -> u16 {
    if value >= 0 {
        value as u16
    } else {
        0x8000 | (-(value as i32) as u16)
    }
}

fn decode_sign_magnitude(raw: u16) -> i16 {
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_complements_byte_sum() {
        // id=1, len=4, write, reg=42, value 0x0200 little-endian
        let payload = [1u8, 4, 0x03, 42, 0, 2];
        // ~(1+4+3+42+0+2) = ~52 = 203
        assert_eq!(ServoBus::checksum(&payload), 203);
    }

    #[test]
    fn sign_magnitude_round_trips() {
        assert_eq!(encode_sign_magnitude(0), 0);
        assert_eq!(encode_sign_magnitude(100), 100);
        assert_eq!(encode_sign_magnitude(-100), 0x8064);
        assert_eq!(encode_sign_magnitude(-1), 0x8001);

        assert_eq!(decode_sign_magnitude(0), 0);
        assert_eq!(decode_sign_magnitude(100), 100);
        assert_eq!(decode_sign_magnitude(0x8064), -100);
        assert_eq!(decode_sign_magnitude(0x8001), -1);
    }

    #[test]
    fn ping_frame_is_six_bytes() {
        let frame = ServoBus::frame(1, Instruction::Ping, &[]);
        assert_eq!(frame.len(), 6);
        assert_eq!(&frame[..2], &HEADER);
        assert_eq!(frame[2], 1);
        assert_eq!(frame[3], 2); // instruction + checksum
        assert_eq!(frame[4], 0x01);
    }

    #[test]
    fn write_frame_layout_is_little_endian() {
        let frame = ServoBus::frame(
            15,
            Instruction::Write,
            &[Register::GoalPosition as u8, 0x34, 0x12],
        );
        assert_eq!(frame[2], 15);
        assert_eq!(frame[3], 5); // 3 params + instruction + checksum
        assert_eq!(frame[4], 0x03);
        assert_eq!(frame[5], 42);
        assert_eq!(frame[6], 0x34); // low byte first
        assert_eq!(frame[7], 0x12);
    }
}
