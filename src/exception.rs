// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains exception and Result definitions
use std::time::Duration;

use thiserror::Error;

use crate::motion::types::Arm;
use crate::supervisor::{SessionState, Signal};

/// Represents all kind of errors which can occur while establishing or running a
/// motion control session.
#[derive(Error, Debug)]
pub enum YumiException {
    /// ConfigMissing is returned if the driver is initialized before the controller address
    /// has been configured.
    #[error("Trying to initialize the driver before it has been configured!")]
    ConfigMissing,

    /// ConfigException is returned if a configuration file can not be read or contains
    /// invalid values.
    #[error("{message:?}")]
    ConfigException { message: String },

    /// ControllerNotRunning is returned if the RAPID program is not running on the controller.
    #[error("Robot unavailable, make sure that the RAPID program is running on the flexpendant.")]
    ControllerNotRunning,

    /// WrongOperatingMode is returned if the controller is not in automatic mode.
    #[error("Robot unavailable, make sure to set the robot to AUTO mode on the flexpendant (current mode: {mode}).")]
    WrongOperatingMode {
        /// Operating mode reported by the controller.
        mode: String,
    },

    /// ParameterPushFailed is returned if the session parameters of an arm could not be read
    /// from or written to the controller.
    #[error("Could not push session parameters to the {arm} arm: {message}")]
    ParameterPushFailed { arm: Arm, message: String },

    /// SignalFailed is returned if the controller did not acknowledge a start or stop signal
    /// within the configured number of attempts.
    #[error("Failed to send {signal} signal after {attempts} attempts")]
    SignalFailed { signal: Signal, attempts: u32 },

    /// CommunicationTimeout is returned if an arm did not send feedback within the
    /// communication timeout.
    #[error("No feedback from the {arm} arm within {timeout:?}")]
    CommunicationTimeout { arm: Arm, timeout: Duration },

    /// AlreadyInitialized is returned if the motion controller is initialized twice.
    #[error("Motion controller is already initialized!")]
    AlreadyInitialized,

    /// NotInitialized is returned when trying to read or write without a running session.
    #[error("Trying to exchange joint data, but no session is running!")]
    NotInitialized,

    /// InvalidSessionState is returned if a session operation is not possible in the current state.
    #[error("Session operation not possible in state {state:?}")]
    InvalidSessionState { state: SessionState },

    /// NetworkException is returned if a connection cannot be established, or when a message
    /// could not be exchanged.
    #[error("{message:?}")]
    NetworkException { message: String },
}

/// creates a NetworkException from anything printable
pub(crate) fn create_network_exception(message: impl ToString) -> YumiException {
    YumiException::NetworkException {
        message: message.to_string(),
    }
}

/// Result type which can have YumiException as Error
pub type YumiResult<T> = Result<T, YumiException>;
