// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the hardware adapter which is driven by a host control loop.
//!
//! The host calls [`read`](DualArmHardware::read) and [`write`](DualArmHardware::write) once
//! per cycle. `read` refreshes the joint buffers from the robot, the host then computes a new
//! velocity command from them and `write` sends it.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info};

use crate::config::DriverConfig;
use crate::controller::DualArmController;
use crate::exception::{YumiException, YumiResult};
use crate::filters::{exponential_smoothing, finite_difference};
use crate::management::{ManagementConnector, TcpConnector};
use crate::motion::channel::{MotionTransport, UdpTransport};
use crate::motion::types::{JointVector14, N_JOINTS};
use crate::supervisor::SessionState;

/// Names of the joints in the order of a [`JointVector14`].
pub static JOINT_NAMES: [&str; N_JOINTS] = [
    "yumi_joint_1_l",
    "yumi_joint_2_l",
    "yumi_joint_3_l",
    "yumi_joint_4_l",
    "yumi_joint_5_l",
    "yumi_joint_6_l",
    "yumi_joint_7_l",
    "yumi_joint_1_r",
    "yumi_joint_2_r",
    "yumi_joint_3_r",
    "yumi_joint_4_r",
    "yumi_joint_5_r",
    "yumi_joint_6_r",
    "yumi_joint_7_r",
];

struct JointBuffers {
    position: JointVector14,
    position_prev: JointVector14,
    velocity: JointVector14,
    acceleration: JointVector14,
    velocity_command: JointVector14,
    velocity_targets: JointVector14,
    /// false until the first sample after init has been stored
    seeded: bool,
}

impl Default for JointBuffers {
    fn default() -> Self {
        JointBuffers {
            position: [0.; N_JOINTS],
            position_prev: [0.; N_JOINTS],
            velocity: [0.; N_JOINTS],
            acceleration: [0.; N_JOINTS],
            velocity_command: [0.; N_JOINTS],
            velocity_targets: [0.; N_JOINTS],
            seeded: false,
        }
    }
}

/// Hardware adapter of the dual arm robot with joint velocity control.
///
/// The joint velocities are not taken from the feedback of the robot but estimated from the
/// positions by a finite difference and exponential smoothing.
pub struct DualArmHardware<C: ManagementConnector, T: MotionTransport> {
    controller: Mutex<DualArmController<C, T>>,
    buffers: Mutex<JointBuffers>,
    address: Option<String>,
    port: Option<u16>,
    alpha: f64,
    initialized: AtomicBool,
}

impl DualArmHardware<TcpConnector, UdpTransport> {
    /// # Errors
    /// * [`ConfigException`](`crate::exception::YumiException::ConfigException`) if the
    /// configuration is invalid.
    pub fn new(config: &DriverConfig) -> YumiResult<Self> {
        Ok(DualArmHardware::with_controller(
            DualArmController::from_config(config)?,
            config.filter.exponential_smoothing_alpha,
        ))
    }
}

impl<C: ManagementConnector, T: MotionTransport> DualArmHardware<C, T> {
    /// # Arguments
    /// * `controller` - Controller which has not been initialized yet
    /// * `alpha` - Smoothing factor of the velocity estimation, in (0, 1]
    pub fn with_controller(controller: DualArmController<C, T>, alpha: f64) -> Self {
        DualArmHardware {
            controller: Mutex::new(controller),
            buffers: Mutex::new(JointBuffers::default()),
            address: None,
            port: None,
            alpha,
            initialized: AtomicBool::new(false),
        }
    }

    /// Stores the address of the management interface of the robot.
    /// # Errors
    /// * [`ConfigException`](`crate::exception::YumiException::ConfigException`) if the port is
    /// not a number.
    pub fn setup(&mut self, address: &str, port: &str) -> YumiResult<()> {
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|e| YumiException::ConfigException {
                message: format!("invalid management port {:?}: {}", port, e),
            })?;
        self.address = Some(address.to_string());
        self.port = Some(port);
        Ok(())
    }

    /// Starts the motion session.
    ///
    /// # Return
    /// false if the adapter is already initialized, has not been set up or the session could
    /// not be started. The reason is logged.
    pub fn init(&mut self) -> bool {
        if self.is_initialized() {
            error!("{}", YumiException::AlreadyInitialized);
            return false;
        }
        let (address, port) = match (&self.address, self.port) {
            (Some(address), Some(port)) => (address.clone(), port),
            _ => {
                error!("{}", YumiException::ConfigMissing);
                return false;
            }
        };
        if let Err(e) = self.controller.lock().init(&address, port) {
            error!("failed to initialize the robot at {}:{}: {}", address, port, e);
            return false;
        }
        *self.buffers.lock() = JointBuffers::default();
        self.initialized.store(true, Ordering::Release);
        info!("robot at {}:{} initialized", address, port);
        true
    }

    /// Refreshes the joint buffers with the current state of the robot.
    ///
    /// Blocks until both arms have sent feedback. Does nothing while not initialized.
    /// # Arguments
    /// * `time` - Time of the host control loop
    /// * `period` - Time since the last read, used for the velocity estimation
    /// # Errors
    /// * every error of [`DualArmController::read`]
    pub fn read(&self, _time: Duration, period: Duration) -> YumiResult<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        let states = self.controller.lock().read()?;
        let period = period.as_secs_f64();
        let mut buffers = self.buffers.lock();
        let seeded = buffers.seeded;
        for j in 0..N_JOINTS {
            buffers.position_prev[j] = buffers.position[j];
            buffers.position[j] = states.position[j];
            buffers.acceleration[j] = states.acceleration[j];
            if !seeded {
                continue;
            }
            if let Some(raw) =
                finite_difference(buffers.position[j], buffers.position_prev[j], period)
            {
                buffers.velocity[j] = exponential_smoothing(raw, buffers.velocity[j], self.alpha);
            }
        }
        buffers.seeded = true;
        Ok(())
    }

    /// Sends the current velocity command to the robot. Does nothing while not initialized.
    /// # Errors
    /// * every error of [`DualArmController::write`]
    pub fn write(&self, _time: Duration, _period: Duration) -> YumiResult<()> {
        if !self.is_initialized() {
            return Ok(());
        }
        let targets = {
            let mut buffers = self.buffers.lock();
            buffers.velocity_targets = buffers.velocity_command;
            buffers.velocity_targets
        };
        self.controller.lock().write(&targets)
    }

    /// Stops the motion session.
    ///
    /// # Return
    /// false if the robot did not acknowledge the stop. The session is closed locally anyway.
    pub fn stop(&mut self) -> bool {
        self.initialized.store(false, Ordering::Release);
        match self.controller.lock().stop() {
            Ok(()) => true,
            Err(e) => {
                error!("{}", e);
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn session_state(&self) -> SessionState {
        self.controller.lock().session_state()
    }

    pub fn joint_names(&self) -> &'static [&'static str; N_JOINTS] {
        &JOINT_NAMES
    }

    /// joint positions \[rad\]
    pub fn joint_positions(&self) -> JointVector14 {
        self.buffers.lock().position
    }

    /// estimated joint velocities \[rad/s\]
    pub fn joint_velocities(&self) -> JointVector14 {
        self.buffers.lock().velocity
    }

    /// joint accelerations \[rad/s²\]
    pub fn joint_accelerations(&self) -> JointVector14 {
        self.buffers.lock().acceleration
    }

    /// Sets the joint velocities \[rad/s\] which are sent by the next [`write`](Self::write).
    pub fn set_velocity_command(&self, command: &JointVector14) {
        self.buffers.lock().velocity_command = *command;
    }

    pub fn velocity_command(&self) -> JointVector14 {
        self.buffers.lock().velocity_command
    }
}
