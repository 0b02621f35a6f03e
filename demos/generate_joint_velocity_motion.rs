// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use yumi::{DriverConfig, DualArmHardware, YumiResult, N_JOINTS};

/// An example showing how to generate a joint velocity motion on both arms.
///
/// WARNING: Before executing this example, make sure there is enough space around the robot.
#[derive(Parser, Debug)]
#[clap(author, version, name = "generate_joint_velocity_motion")]
struct CommandLineArguments {
    /// IP-Address or hostname of the robot controller
    pub yumi_ip: String,
    /// Port of the management interface
    #[clap(long, default_value = "80")]
    pub port: String,
    /// Driver configuration file (TOML)
    #[clap(short, long)]
    pub config: Option<PathBuf>,
}

fn main() -> YumiResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = CommandLineArguments::parse();
    let config = match &args.config {
        Some(path) => DriverConfig::load(path)?,
        None => DriverConfig::default(),
    };
    let mut hardware = DualArmHardware::new(&config)?;
    hardware.setup(&args.yumi_ip, &args.port)?;
    println!("WARNING: This example will move the robot! Please make sure to have the emergency stop at hand!");
    println!("Press Enter to continue...");
    std::io::stdin().read_line(&mut String::new()).unwrap();
    if !hardware.init() {
        return Ok(());
    }

    let omega_max = 0.2;
    let time_max = 2.0;
    let start = Instant::now();
    let mut last = start;
    let mut result = Ok(());
    loop {
        let period = last.elapsed();
        last = Instant::now();
        let time = start.elapsed();
        if let Err(e) = hardware.read(time, period) {
            result = Err(e);
            break;
        }
        let t = time.as_secs_f64();
        if t >= 2. * time_max {
            println!("Finished motion, shutting down example");
            break;
        }
        let cycle = f64::floor(f64::powf(-1.0, (t - t % time_max) / time_max));
        let omega = cycle * omega_max / 2. * (1. - f64::cos(2. * PI / time_max * t));
        let mut command = [0.; N_JOINTS];
        // elbows of both arms, in opposite directions
        command[3] = omega;
        command[10] = -omega;
        hardware.set_velocity_command(&command);
        if let Err(e) = hardware.write(time, period) {
            result = Err(e);
            break;
        }
    }
    hardware.set_velocity_command(&[0.; N_JOINTS]);
    let _ = hardware.write(start.elapsed(), last.elapsed());
    hardware.stop();
    result
}
