// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the motion controller, which combines the channels of both arms to one 14 joint
//! device.
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::exception::{YumiException, YumiResult};
use crate::management::{ManagementConnector, TcpConnector};
use crate::motion::channel::{ChannelOptions, MotionChannel, MotionTransport, UdpTransport};
use crate::motion::conversion::{app_to_native, joint_space_to_app};
use crate::motion::io_service::IoService;
use crate::motion::types::{arm_block, Arm, JointStates, JointVector14};
use crate::supervisor::{SessionState, SessionSupervisor};

/// Selects how commands are written to the arms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlStrategy {
    JointVelocity,
}

struct ArmChannels<M: MotionChannel> {
    left: M,
    right: M,
}

impl<M: MotionChannel> ArmChannels<M> {
    fn get_mut(&mut self, arm: Arm) -> &mut M {
        match arm {
            Arm::Left => &mut self.left,
            Arm::Right => &mut self.right,
        }
    }
}

/// Maintains the motion session of both arms.
///
/// One controller runs at most one session. After [`stop`](Self::stop) or a failed
/// [`init`](Self::init) a new controller is needed.
pub struct DualArmController<C: ManagementConnector, T: MotionTransport> {
    supervisor: SessionSupervisor<C>,
    transport: T,
    io_threads: usize,
    io_service: Option<IoService>,
    channels: Option<ArmChannels<T::Channel>>,
    strategy: ControlStrategy,
    is_initialized: bool,
}

impl DualArmController<TcpConnector, UdpTransport> {
    /// Creates a controller which talks to the robot over TCP and UDP.
    /// # Errors
    /// * [`ConfigException`](`crate::exception::YumiException::ConfigException`) if the
    /// configuration is invalid.
    pub fn from_config(config: &DriverConfig) -> YumiResult<Self> {
        config.validate()?;
        let connector = TcpConnector::new(config.management.response_timeout());
        let transport = UdpTransport::new(ChannelOptions {
            base_port: config.motion.base_port,
            communication_timeout: config.session.communication_timeout(),
            axes: config.motion.axes,
            use_speed: config.motion.use_speed,
            use_logging: config.motion.use_logging,
        });
        DualArmController::new(connector, transport, config)
    }
}

impl<C: ManagementConnector, T: MotionTransport> DualArmController<C, T> {
    /// # Errors
    /// * [`ConfigException`](`crate::exception::YumiException::ConfigException`) if the
    /// configuration is invalid.
    pub fn new(connector: C, transport: T, config: &DriverConfig) -> YumiResult<Self> {
        config.validate()?;
        Ok(DualArmController {
            supervisor: SessionSupervisor::new(
                connector,
                config.session.clone(),
                config.management.clone(),
            ),
            transport,
            io_threads: config.motion.io_threads,
            io_service: None,
            channels: None,
            strategy: ControlStrategy::JointVelocity,
            is_initialized: false,
        })
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized
    }

    pub fn session_state(&self) -> SessionState {
        self.supervisor.state()
    }

    pub fn strategy(&self) -> ControlStrategy {
        self.strategy
    }

    /// Runs the handshake, opens the channels of both arms and starts the motion session.
    ///
    /// # Errors
    /// * [`AlreadyInitialized`](`crate::exception::YumiException::AlreadyInitialized`) if the
    /// session is already running. The running channels are not touched.
    /// * every error of [`SessionSupervisor::handshake`] and [`SessionSupervisor::start`]
    /// * [`NetworkException`](`crate::exception::YumiException::NetworkException`) if a
    /// channel can not be opened.
    ///
    /// On error everything opened so far is closed again.
    pub fn init(&mut self, address: &str, port: u16) -> YumiResult<()> {
        if self.is_initialized {
            return Err(YumiException::AlreadyInitialized);
        }
        self.supervisor.handshake(address, port)?;
        if let Err(e) = self.open_channels() {
            self.teardown();
            self.supervisor.fail();
            return Err(e);
        }
        if let Err(e) = self.supervisor.start() {
            self.teardown();
            return Err(e);
        }
        self.is_initialized = true;
        info!("dual arm controller initialized with {:?} control", self.strategy);
        Ok(())
    }

    fn open_channels(&mut self) -> YumiResult<()> {
        let mut io_service = IoService::new(self.io_threads);
        let io = io_service.handle();
        let left = self.transport.open(Arm::Left, &io)?;
        let right = self.transport.open(Arm::Right, &io)?;
        io_service.start()?;
        self.channels = Some(ArmChannels { left, right });
        self.io_service = Some(io_service);
        Ok(())
    }

    /// Waits for the feedback of both arms and returns their joint states.
    ///
    /// # Errors
    /// * [`NotInitialized`](`crate::exception::YumiException::NotInitialized`)
    /// * [`CommunicationTimeout`](`crate::exception::YumiException::CommunicationTimeout`) if
    /// an arm does not send feedback in time.
    pub fn read(&mut self) -> YumiResult<JointStates> {
        let channels = self.running_channels()?;
        let mut states = JointStates::default();
        for arm in Arm::BOTH {
            let channel = channels.get_mut(arm);
            channel.wait_for_feedback()?;
            let joints = channel.read_feedback()?;
            states.set_arm(arm, &joint_space_to_app(&joints));
        }
        Ok(states)
    }

    /// Sends a command to both arms. Does not wait for the robot.
    ///
    /// # Errors
    /// * [`NotInitialized`](`crate::exception::YumiException::NotInitialized`)
    /// * [`NetworkException`](`crate::exception::YumiException::NetworkException`) if a
    /// command can not be queued.
    pub fn write(&mut self, command: &JointVector14) -> YumiResult<()> {
        let strategy = self.strategy;
        let channels = self.running_channels()?;
        match strategy {
            ControlStrategy::JointVelocity => {
                for arm in Arm::BOTH {
                    let speed = app_to_native(&arm_block(command, arm));
                    channels.get_mut(arm).send_command(&speed)?;
                }
            }
        }
        Ok(())
    }

    /// Signals the end of the session and closes both channels.
    ///
    /// The channels and the I/O workers are released even if the controller does not
    /// acknowledge the stop signal. Stopping a controller which is not initialized does nothing.
    /// # Errors
    /// * [`SignalFailed`](`crate::exception::YumiException::SignalFailed`) if the stop signal
    /// was not acknowledged.
    pub fn stop(&mut self) -> YumiResult<()> {
        if !self.is_initialized {
            return Ok(());
        }
        let result = self.supervisor.stop();
        self.teardown();
        self.is_initialized = false;
        result
    }

    fn running_channels(&mut self) -> YumiResult<&mut ArmChannels<T::Channel>> {
        if !self.is_initialized {
            return Err(YumiException::NotInitialized);
        }
        self.channels.as_mut().ok_or(YumiException::NotInitialized)
    }

    fn teardown(&mut self) {
        self.channels = None;
        if let Some(mut io_service) = self.io_service.take() {
            io_service.stop();
            debug!("I/O workers stopped");
        }
    }
}

impl<C: ManagementConnector, T: MotionTransport> Drop for DualArmController<C, T> {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("stopping the controller on drop failed: {}", e);
        }
    }
}
