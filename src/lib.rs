// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! # libyumi-rs
//! libyumi-rs is the control loop core of a driver for the dual arm ABB YuMi (IRB 14000).
//! It brings the robot controller into a motion session and exchanges joint velocity
//! commands with both arms.
//!
//! **ALWAYS HAVE THE EMERGENCY STOP AT
//! HAND WHILE CONTROLLING THE ROBOT!**
//!
//! ## Design
//! Each arm runs its own cyclic motion channel, a UDP session in which the robot streams its
//! joint state and accepts speed commands. Before the channels are opened the session has to be
//! prepared over the management interface of the controller: the RAPID program has to run,
//! the controller has to be in AUTO mode and the session parameters of both arms are pushed.
//!
//! The library is divided into these modules:
//! * [hardware](`crate::hardware`) - the adapter a host control loop calls once per cycle.
//! * [controller](`crate::controller`) - combines both arms to one 14 joint device.
//! * [supervisor](`crate::supervisor`) - handshake and start/stop signalling.
//! * [management](`crate::management`) - client of the management interface.
//! * [motion](`crate::motion`) - channels, the joint layout of the robot and unit conversion.
//! * [config](`crate::config`) - driver configuration.
//!
//! Joints are always given as 14 vectors, the left arm first. Within an arm the joints are in
//! kinematic order and in \[rad\], while the robot itself reports six main axes and one
//! external axis in \[deg\].
//!
//! # Example:
//!```no_run
//! use std::time::{Duration, Instant};
//! use yumi::{DriverConfig, DualArmHardware, YumiResult};
//! fn main() -> YumiResult<()> {
//!     let config = DriverConfig::default();
//!     let mut hardware = DualArmHardware::new(&config)?;
//!     hardware.setup("192.168.125.1", "80")?;
//!     if !hardware.init() {
//!         return Ok(());
//!     }
//!     let start = Instant::now();
//!     let mut last = start;
//!     while start.elapsed() < Duration::from_secs(5) {
//!         let period = last.elapsed();
//!         last = Instant::now();
//!         hardware.read(start.elapsed(), period)?;
//!         let mut command = [0.; 14];
//!         command[6] = 0.05;
//!         hardware.set_velocity_command(&command);
//!         hardware.write(start.elapsed(), period)?;
//!     }
//!     hardware.stop();
//!     Ok(())
//! }
//!```
//! `read` blocks until both arms have sent feedback, so the loop runs at the rate of the robot.
//! Every function which talks to the robot returns a [`YumiResult`], errors of `init` and `stop`
//! are logged with [`tracing`] and reported as `false`.
pub mod config;
pub mod controller;
pub mod exception;
pub mod filters;
pub mod hardware;
pub mod management;
pub mod motion;
mod network;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

pub use config::DriverConfig;
pub use controller::{ControlStrategy, DualArmController};
pub use exception::{YumiException, YumiResult};
pub use hardware::{DualArmHardware, JOINT_NAMES};
pub use motion::types::{Arm, JointStates, JointVector14, N_JOINTS};
pub use supervisor::{SessionState, Signal};
