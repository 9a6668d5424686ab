//! RathIO - rover control daemon
//!
//! Owns the shared I2C bus and accepts length-prefixed JSON commands over TCP
//! (default port 5555). Without the `hardware` feature the daemon runs against
//! a simulated bus and IMU.

use rath_io::error::Error;
use rath_io::{CommandServer, Config, I2cBus, OrientationSensor, Result, Robot};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Parse config path from command line arguments.
///
/// Supports:
/// - `rath-io <path>` (positional)
/// - `rath-io --config <path>` (flag-based)
/// - `rath-io -c <path>` (short flag)
///
/// Built-in defaults are used when no path is given.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

#[cfg(feature = "hardware")]
fn open_devices(
    config: &Config,
) -> Result<(Box<dyn I2cBus>, Option<Box<dyn OrientationSensor>>)> {
    use rath_io::imu::Bno055;
    use rath_io::transport::LinuxI2cBus;

    let bus = LinuxI2cBus::open(config.bus.i2c_bus)?;
    let imu: Option<Box<dyn OrientationSensor>> =
        match Bno055::open(config.imu.i2c_bus, config.imu.address) {
            Ok(sensor) => Some(Box::new(sensor)),
            Err(e) => {
                log::warn!("Orientation sensor unavailable, heading hold disabled: {}", e);
                None
            }
        };
    Ok((Box::new(bus), imu))
}

#[cfg(not(feature = "hardware"))]
fn open_devices(
    _config: &Config,
) -> Result<(Box<dyn I2cBus>, Option<Box<dyn OrientationSensor>>)> {
    use rath_io::{MockBus, MockImu};

    log::warn!("Built without the `hardware` feature, using simulated bus and IMU");
    Ok((Box::new(MockBus::new()), Some(Box::new(MockImu::new()))))
}

fn main() -> Result<()> {
    let config = match parse_config_path() {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("RathIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Bus /dev/i2c-{}: UNO {:#04x}, MEGA {:#04x}",
        config.bus.i2c_bus,
        config.uno.address,
        config.mega.address
    );

    let (bus, imu) = open_devices(&config)?;
    let server_config = config.server.clone();
    let robot = Arc::new(Robot::new(config, bus, imu)?);

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let mut server = if server_config.enabled {
        Some(CommandServer::start(
            Arc::clone(&robot),
            &server_config.bind_address,
        )?)
    } else {
        log::info!("Command server disabled");
        None
    };

    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    log::info!("Shutting down...");
    if let Some(server) = server.as_mut() {
        server.shutdown()?;
    }
    robot.shutdown()?;

    log::info!("RathIO stopped");
    Ok(())
}
