// Keyboard teleop publishing chassis commands at ~50Hz.
// WASD translate, Z/X rotate, R/F change speed level, Q or Esc quit.

use std::time::{Duration, Instant};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::info;

use swerve_runtime::config::TOPIC_CMD_CHASSIS;
use swerve_runtime::messages::DriveCommand;

// Normalized -1..1 joystick units per speed level
const SPEED_LEVELS: [(f64, f64, &str); 3] = [
    (0.25, 0.25, "LOW"),
    (0.75, 0.5, "MED"),
    (1.0, 1.0, "HIGH"),
];

// Velocities drop to zero after this long without a movement key
const INPUT_TIMEOUT: Duration = Duration::from_millis(100);

struct Teleop {
    level: usize,
    cmd: DriveCommand,
    last_input: Instant,
}

impl Teleop {
    fn new() -> Self {
        Self {
            level: 0,
            cmd: DriveCommand::default(),
            last_input: Instant::now(),
        }
    }

    /// Apply one key press. Returns false when the operator quit.
    fn handle_key(&mut self, code: KeyCode) -> bool {
        let (speed, omega, _) = SPEED_LEVELS[self.level];
        let motion = match code {
            KeyCode::Char('w') => Some((speed, self.cmd.vy, self.cmd.omega)),
            KeyCode::Char('s') => Some((-speed, self.cmd.vy, self.cmd.omega)),
            KeyCode::Char('a') => Some((self.cmd.vx, speed, self.cmd.omega)),
            KeyCode::Char('d') => Some((self.cmd.vx, -speed, self.cmd.omega)),
            KeyCode::Char('z') => Some((self.cmd.vx, self.cmd.vy, omega)),
            KeyCode::Char('x') => Some((self.cmd.vx, self.cmd.vy, -omega)),
            KeyCode::Char('r') => {
                self.set_level(self.level.saturating_add(1));
                None
            }
            KeyCode::Char('f') => {
                self.set_level(self.level.saturating_sub(1));
                None
            }
            KeyCode::Char('q') | KeyCode::Esc => return false,
            _ => None,
        };

        if let Some((vx, vy, omega)) = motion {
            self.cmd = DriveCommand {
                vx,
                vy,
                omega,
                heading: None,
            };
            self.last_input = Instant::now();
        }
        true
    }

    fn set_level(&mut self, level: usize) {
        self.level = level.min(SPEED_LEVELS.len() - 1);
        info!("Speed: {}", SPEED_LEVELS[self.level].2);
    }

    /// The command to publish this tick, zeroed when input went quiet.
    fn current(&mut self) -> DriveCommand {
        if self.last_input.elapsed() > INPUT_TIMEOUT {
            self.cmd = DriveCommand::default();
        }
        self.cmd
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_CHASSIS).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = pump(&publisher).await;
    disable_raw_mode()?;
    result
}

async fn pump(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut teleop = Teleop::new();

    loop {
        // 20ms poll gives an effective 50Hz publish rate
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind == KeyEventKind::Press || kind == KeyEventKind::Repeat {
                    if !teleop.handle_key(code) {
                        break;
                    }
                }
            }
        }

        // Publish every tick; the runtime watchdog treats silence as a fault
        let cmd = teleop.current();
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    Ok(())
}
