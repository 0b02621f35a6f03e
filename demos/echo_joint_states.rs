// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use yumi::{DriverConfig, DualArmHardware, YumiResult, JOINT_NAMES};

/// An example showing how to continuously read the joint states of both arms.
#[derive(Parser, Debug)]
#[clap(author, version, name = "echo_joint_states")]
struct CommandLineArguments {
    /// IP-Address or hostname of the robot controller
    pub yumi_ip: String,
    /// Port of the management interface
    #[clap(long, default_value = "80")]
    pub port: String,
    /// Driver configuration file (TOML)
    #[clap(short, long)]
    pub config: Option<PathBuf>,
    /// Number of joint states to print
    #[clap(short, long, default_value_t = 100)]
    pub count: usize,
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
    if !hardware.init() {
        return Ok(());
    }

    let start = Instant::now();
    let mut last = start;
    let mut result = Ok(());
    for _ in 0..args.count {
        let period = last.elapsed();
        last = Instant::now();
        if let Err(e) = hardware.read(start.elapsed(), period) {
            result = Err(e);
            break;
        }
        // Printing to standard output adds a delay. This is acceptable for a read loop such as this, but
        // should not be done in a control loop.
        let positions = hardware.joint_positions();
        let velocities = hardware.joint_velocities();
        for (j, name) in JOINT_NAMES.iter().enumerate() {
            print!("{}: {:.4} ({:.4}) ", name, positions[j], velocities[j]);
        }
        println!();
        std::thread::sleep(Duration::from_millis(1));
    }
    hardware.stop();
    result
}
