use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swerve_runtime::actuator::{Actuator, BusActuator, MockActuator, ServoBus};
use swerve_runtime::config::{CHASSIS_LENGTH, CHASSIS_WIDTH, MODULE_LAYOUT, ModuleDefaults};
use swerve_runtime::error::Error;
use swerve_runtime::prefs::JsonPreferences;
use swerve_runtime::runtime;
use swerve_runtime::swerve::{ChassisGeometry, Corner, SwerveDrive, SwerveModule};

#[derive(Parser, Debug)]
#[command(about = "Swerve drive runtime: chassis commands in, servo targets out")]
struct Args {
    /// Serial port of the servo bus. Omit to run against mock actuators.
    #[arg(long)]
    port: Option<String>,

    /// Preference file holding per-module calibration.
    #[arg(long, default_value = "swerve_prefs.json")]
    prefs: PathBuf,
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut store = JsonPreferences::open(&args.prefs)?;

    match &args.port {
        Some(port) => {
            info!("Opening servo bus on {}", port);
            let mut bus = ServoBus::open(port)?;
            for layout in MODULE_LAYOUT {
                for id in [layout.steer_id, layout.drive_id] {
                    if !bus.ping(id)? {
                        return Err(format!("servo {id} did not answer ping").into());
                    }
                    bus.enable_torque(id)?;
                }
            }
            let bus = Arc::new(Mutex::new(bus));
            let drive = build_drive(&mut store, |id| BusActuator::new(Arc::clone(&bus), id))?;
            // Persist any defaults filled in during module setup
            store.save()?;
            runtime::run(drive).await
        }
        None => {
            info!("No serial port given, running with mock actuators");
            let drive = build_drive(&mut store, MockActuator::new)?;
            store.save()?;
            runtime::run(drive).await
        }
    }
}

fn build_drive<A: Actuator>(
    store: &mut JsonPreferences,
    mut make: impl FnMut(u8) -> A,
) -> Result<SwerveDrive<A>, Error> {
    let mut built = Vec::with_capacity(MODULE_LAYOUT.len());
    for layout in MODULE_LAYOUT {
        let module = SwerveModule::new(
            layout.name,
            make(layout.steer_id),
            make(layout.drive_id),
            ModuleDefaults::default(),
            store,
        )?;
        built.push((layout.corner, module));
    }
    let modules: [(Corner, SwerveModule<A>); 4] =
        built.try_into().map_err(|_| Error::Configuration {
            key: "module layout".to_string(),
            reason: "expected exactly four modules".to_string(),
        })?;
    SwerveDrive::new(ChassisGeometry::new(CHASSIS_LENGTH, CHASSIS_WIDTH), modules)
}
