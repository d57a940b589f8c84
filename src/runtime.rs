// 50 Hz control loop with command watchdog
//
// One control pass per tick: drain pending commands, decide what to actuate,
// fan out through the swerve controller, publish telemetry and health. A
// stale command stream drives with max_wheel_speed = 0, which zeroes the
// wheels without snapping the steering to a resting orientation.

use std::time::Instant;
use tokio::time::interval;
use tracing::{info, warn};

use crate::actuator::Actuator;
use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, TELEOP_MAX_WHEEL_SPEED, TOPIC_CMD_CHASSIS, TOPIC_HEALTH,
    TOPIC_RT_TELEMETRY,
};
use crate::messages::{DriveCommand, RuntimeHealth};
use crate::swerve::SwerveDrive;
use crate::telemetry::TelemetryFrame;

pub struct Runtime {
    latest_cmd: Option<DriveCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: DriveCommand) {
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// Decide this cycle's actuation based on watchdog state. Returns the
    /// command to apply and the wheel speed cap; the cap is zero when the
    /// command stream is stale, so the chassis stops but keeps its steering.
    pub fn compute_actuation(&mut self) -> (DriveCommand, f64) {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > CMD_TIMEOUT || self.latest_cmd.is_none() {
            if self.health == RuntimeHealth::Ok {
                warn!("Command stale ({:?} old), stopping chassis", cmd_age);
            }
            self.health = RuntimeHealth::CmdStale;
            // Hold the last steering targets; FOC is irrelevant at zero drive
            let held = DriveCommand {
                heading: None,
                ..self.latest_cmd.unwrap_or_default()
            };
            (held, 0.0)
        } else {
            self.health = RuntimeHealth::Ok;
            (self.latest_cmd.unwrap_or_default(), TELEOP_MAX_WHEEL_SPEED)
        }
    }

    pub fn mark_fault(&mut self) {
        self.health = RuntimeHealth::Fault;
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn run<A: Actuator>(
    mut drive: SwerveDrive<A>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_CHASSIS).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_RT_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut frame = TelemetryFrame::new();
    let mut tick = interval(std::time::Duration::from_millis(1000 / LOOP_HZ));

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_CHASSIS);
    info!("Publishing to: {}, {}", TOPIC_RT_TELEMETRY, TOPIC_HEALTH);

    loop {
        tick.tick().await;

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<DriveCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Decide actuation (includes watchdog logic) and dispatch
        let (cmd, max_wheel_speed) = runtime.compute_actuation();
        if let Err(e) = drive.drive(cmd.vx, cmd.vy, cmd.omega, max_wheel_speed, cmd.heading) {
            // Reported here; the failed module is retried next cycle
            warn!("drive dispatch failed: {}", e);
            runtime.mark_fault();
        }

        // 3. Publish telemetry
        frame.clear();
        if let Err(e) = drive.update_telemetry(&mut frame) {
            warn!("telemetry collection failed: {}", e);
            runtime.mark_fault();
        }
        if !frame.is_empty() {
            pub_telemetry.put(frame.to_json().to_string()).await?;
        }

        // 4. Publish health
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_stale_and_holds_zero() {
        let mut runtime = Runtime::new();
        let (cmd, cap) = runtime.compute_actuation();
        assert_eq!(cap, 0.0);
        assert_eq!(cmd.vx, 0.0);
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn fresh_command_is_applied_at_full_cap() {
        let mut runtime = Runtime::new();
        runtime.on_command(DriveCommand {
            vx: 0.5,
            vy: -0.2,
            omega: 0.1,
            heading: None,
        });
        let (cmd, cap) = runtime.compute_actuation();
        assert_eq!(cap, TELEOP_MAX_WHEEL_SPEED);
        assert_eq!(cmd.vx, 0.5);
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn stale_command_keeps_last_motion_with_zero_cap() {
        let mut runtime = Runtime::new();
        runtime.on_command(DriveCommand {
            vx: 0.3,
            vy: 0.0,
            omega: 0.0,
            heading: Some(1.0),
        });
        runtime.cmd_received_at = Instant::now() - (CMD_TIMEOUT * 2);

        let (cmd, cap) = runtime.compute_actuation();
        assert_eq!(cap, 0.0);
        // Last translation is remembered so steering holds its direction
        assert_eq!(cmd.vx, 0.3);
        assert!(cmd.heading.is_none());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn fault_is_sticky_until_next_watchdog_decision() {
        let mut runtime = Runtime::new();
        runtime.on_command(DriveCommand::default());
        runtime.mark_fault();
        assert_eq!(runtime.health(), RuntimeHealth::Fault);

        // The next cycle's watchdog decision clears it
        let _ = runtime.compute_actuation();
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }
}
