// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the session supervisor, which brings the controller into a state where it accepts
//! cyclic motion commands.
use std::fmt;

use tracing::{debug, error, info, warn};

use crate::config::{ManagementConfig, SessionConfig};
use crate::exception::{YumiException, YumiResult};
use crate::management::types::{OperatingMode, SessionParamsRecord};
use crate::management::{ManagementConnector, ManagementInterface};
use crate::motion::types::Arm;

/// Lifecycle of a motion session.
///
/// `Failed` is terminal, a new supervisor is needed to try again.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    HandshakeInProgress,
    Ready,
    Running,
    Stopped,
    Failed,
}

/// Signals which are sent to the RAPID program.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Signal {
    Start,
    Stop,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Signal::Start => write!(f, "start"),
            Signal::Stop => write!(f, "stop"),
        }
    }
}

/// Runs the handshake with the management interface and signals the start and stop of the
/// motion session.
pub struct SessionSupervisor<C: ManagementConnector> {
    connector: C,
    session_config: SessionConfig,
    management_config: ManagementConfig,
    management: Option<C::Management>,
    state: SessionState,
}

impl<C: ManagementConnector> SessionSupervisor<C> {
    pub fn new(
        connector: C,
        session_config: SessionConfig,
        management_config: ManagementConfig,
    ) -> Self {
        SessionSupervisor {
            connector,
            session_config,
            management_config,
            management: None,
            state: SessionState::Uninitialized,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session_config
    }

    /// Connects to the management interface, checks that the controller can run a session and
    /// pushes the session parameters of both arms.
    ///
    /// Each step is followed by the settling delay.
    /// # Errors
    /// * [`InvalidSessionState`](`crate::exception::YumiException::InvalidSessionState`) if the
    /// handshake has already been attempted.
    /// * [`ControllerNotRunning`](`crate::exception::YumiException::ControllerNotRunning`)
    /// * [`WrongOperatingMode`](`crate::exception::YumiException::WrongOperatingMode`)
    /// * [`ParameterPushFailed`](`crate::exception::YumiException::ParameterPushFailed`)
    /// * [`NetworkException`](`crate::exception::YumiException::NetworkException`) if the
    /// management interface can not be reached.
    ///
    /// Every error leaves the supervisor in [`SessionState::Failed`].
    pub fn handshake(&mut self, address: &str, port: u16) -> YumiResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(YumiException::InvalidSessionState { state: self.state });
        }
        self.state = SessionState::HandshakeInProgress;
        match self.run_handshake(address, port) {
            Ok(()) => {
                self.state = SessionState::Ready;
                Ok(())
            }
            Err(e) => {
                error!("handshake with {}:{} failed: {}", address, port, e);
                self.fail();
                Err(e)
            }
        }
    }

    fn run_handshake(&mut self, address: &str, port: u16) -> YumiResult<()> {
        info!("connecting to the management interface at {}:{}", address, port);
        self.management = Some(self.connector.connect(address, port)?);
        self.settle();

        if !self.connection()?.is_program_running()? {
            return Err(YumiException::ControllerNotRunning);
        }
        info!("RAPID program is running");
        self.settle();

        let mode = self.connection()?.operating_mode()?;
        if mode != OperatingMode::Auto {
            return Err(YumiException::WrongOperatingMode {
                mode: mode.to_string(),
            });
        }
        info!("controller is in {} mode", mode);
        self.settle();

        self.push_session_params()?;
        info!("session parameters pushed to both arms");
        self.settle();
        Ok(())
    }

    /// Reads the records of both arms first and writes them back afterwards.
    fn push_session_params(&mut self) -> YumiResult<()> {
        let session_config = self.session_config.clone();
        let management = self.connection()?;
        let mut records: Vec<(Arm, SessionParamsRecord)> = Vec::with_capacity(2);
        for arm in Arm::BOTH {
            let mut record = management.read_session_params(arm).map_err(|e| {
                YumiException::ParameterPushFailed {
                    arm,
                    message: format!("reading the parameter record failed: {}", e),
                }
            })?;
            debug!("{} arm parameter record read back: {}", arm, record);
            session_config.apply_to(&mut record);
            records.push((arm, record));
        }
        for (arm, record) in records {
            management
                .write_session_params(arm, &record)
                .map_err(|e| YumiException::ParameterPushFailed {
                    arm,
                    message: format!("writing the parameter record failed: {}", e),
                })?;
        }
        Ok(())
    }

    /// Signals the start of the motion session.
    /// # Errors
    /// * [`InvalidSessionState`](`crate::exception::YumiException::InvalidSessionState`) if the
    /// handshake has not been completed.
    /// * [`SignalFailed`](`crate::exception::YumiException::SignalFailed`) if no attempt was
    /// acknowledged. The supervisor is [`SessionState::Failed`] afterwards.
    pub fn start(&mut self) -> YumiResult<()> {
        if self.state != SessionState::Ready {
            return Err(YumiException::InvalidSessionState { state: self.state });
        }
        let max_attempts = self.management_config.max_signal_retries;
        let management = self.connection()?;
        match signal_with_retries(Signal::Start, max_attempts, || management.signal_start()) {
            Ok(_) => {
                self.state = SessionState::Running;
                info!("motion session started");
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                self.fail();
                Err(e)
            }
        }
    }

    /// Signals the end of the motion session.
    /// # Errors
    /// * [`InvalidSessionState`](`crate::exception::YumiException::InvalidSessionState`) if no
    /// session is running.
    /// * [`SignalFailed`](`crate::exception::YumiException::SignalFailed`) if no attempt was
    /// acknowledged. The supervisor stays [`SessionState::Running`].
    pub fn stop(&mut self) -> YumiResult<()> {
        if self.state != SessionState::Running {
            return Err(YumiException::InvalidSessionState { state: self.state });
        }
        let max_attempts = self.management_config.max_signal_retries;
        let management = self.connection()?;
        signal_with_retries(Signal::Stop, max_attempts, || management.signal_stop())?;
        self.state = SessionState::Stopped;
        self.management = None;
        info!("motion session stopped");
        Ok(())
    }

    /// Marks the session as failed and closes the management connection.
    pub fn fail(&mut self) {
        self.state = SessionState::Failed;
        self.management = None;
    }

    fn connection(&mut self) -> YumiResult<&mut C::Management> {
        let state = self.state;
        self.management
            .as_mut()
            .ok_or(YumiException::InvalidSessionState { state })
    }

    fn settle(&self) {
        let delay = self.management_config.settle_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

/// Sends a signal until it is acknowledged, at most `max_attempts` times.
///
/// # Return
/// The number of the attempt which was acknowledged.
/// # Errors
/// * [`SignalFailed`](`crate::exception::YumiException::SignalFailed`) after `max_attempts`
/// unacknowledged attempts.
pub fn signal_with_retries<F>(signal: Signal, max_attempts: u32, mut attempt: F) -> YumiResult<u32>
where
    F: FnMut() -> YumiResult<bool>,
{
    for i in 1..=max_attempts {
        match attempt() {
            Ok(true) => return Ok(i),
            Ok(false) => warn!(
                "failed to send {} signal! [Attempt {}/{}] rejected by the controller",
                signal, i, max_attempts
            ),
            Err(e) => warn!(
                "failed to send {} signal! [Attempt {}/{}] {}",
                signal, i, max_attempts, e
            ),
        }
    }
    Err(YumiException::SignalFailed {
        signal,
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use crate::config::{ManagementConfig, SessionConfig};
    use crate::exception::{create_network_exception, YumiException};
    use crate::management::types::{OperatingMode, SessionParamsRecord};
    use crate::management::MockManagementInterface;
    use crate::motion::types::Arm;
    use crate::supervisor::{signal_with_retries, SessionState, SessionSupervisor, Signal};
    use crate::testing::{ready_management, FakeConnector};
    use mockall::predicate::eq;
    use mockall::Sequence;

    fn management_config(retries: u32) -> ManagementConfig {
        ManagementConfig {
            delay_time: 0.,
            max_signal_retries: retries,
            response_timeout: 1.,
        }
    }

    fn supervisor(
        management: MockManagementInterface,
        retries: u32,
    ) -> SessionSupervisor<FakeConnector> {
        SessionSupervisor::new(
            FakeConnector::new(management),
            SessionConfig::default(),
            management_config(retries),
        )
    }

    #[test]
    fn retries_stop_at_first_acknowledge() {
        let mut calls = 0;
        let attempt = signal_with_retries(Signal::Start, 5, || {
            calls += 1;
            Ok(calls == 5)
        })
        .unwrap();
        assert_eq!(attempt, 5);
        assert_eq!(calls, 5);
    }

    #[test]
    fn retries_are_bounded() {
        let mut calls = 0;
        let result = signal_with_retries(Signal::Stop, 3, || {
            calls += 1;
            if calls % 2 == 0 {
                Err(create_network_exception("lost"))
            } else {
                Ok(false)
            }
        });
        assert_eq!(calls, 3);
        match result {
            Err(YumiException::SignalFailed { signal, attempts }) => {
                assert_eq!(signal, Signal::Stop);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected SignalFailed, got {:?}", other),
        }
    }

    #[test]
    fn handshake_pushes_configured_params_to_both_arms() {
        let mut management = MockManagementInterface::new();
        let mut seq = Sequence::new();
        management
            .expect_is_program_running()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(true));
        management
            .expect_operating_mode()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(OperatingMode::Auto));
        management
            .expect_read_session_params()
            .with(eq(Arm::Left))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SessionParamsRecord::default()));
        management
            .expect_read_session_params()
            .with(eq(Arm::Right))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SessionParamsRecord::default()));
        management
            .expect_write_session_params()
            .withf(|arm, record| {
                *arm == Arm::Left && record.tool_name == "tool0" && record.comm_timeout == 30.
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        management
            .expect_write_session_params()
            .withf(|arm, record| *arm == Arm::Right && record.wobj_name == "wobj0")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        let mut supervisor = supervisor(management, 5);
        supervisor.handshake("127.0.0.1", 80).unwrap();
        assert_eq!(supervisor.state(), SessionState::Ready);
    }

    #[test]
    fn program_not_running_fails_the_session() {
        let mut management = MockManagementInterface::new();
        management
            .expect_is_program_running()
            .times(1)
            .returning(|| Ok(false));
        management.expect_operating_mode().never();
        let mut supervisor = supervisor(management, 5);
        assert!(matches!(
            supervisor.handshake("127.0.0.1", 80),
            Err(YumiException::ControllerNotRunning)
        ));
        assert_eq!(supervisor.state(), SessionState::Failed);
        assert!(matches!(
            supervisor.handshake("127.0.0.1", 80),
            Err(YumiException::InvalidSessionState {
                state: SessionState::Failed
            })
        ));
    }

    #[test]
    fn manual_mode_is_rejected() {
        let mut management = MockManagementInterface::new();
        management
            .expect_is_program_running()
            .returning(|| Ok(true));
        management
            .expect_operating_mode()
            .returning(|| Ok(OperatingMode::ManualReducedSpeed));
        management.expect_read_session_params().never();
        let mut supervisor = supervisor(management, 5);
        match supervisor.handshake("127.0.0.1", 80) {
            Err(YumiException::WrongOperatingMode { mode }) => assert_eq!(mode, "MANR"),
            other => panic!("expected WrongOperatingMode, got {:?}", other),
        }
        assert_eq!(supervisor.state(), SessionState::Failed);
    }

    #[test]
    fn failed_write_names_the_arm() {
        let mut management = MockManagementInterface::new();
        management
            .expect_is_program_running()
            .returning(|| Ok(true));
        management
            .expect_operating_mode()
            .returning(|| Ok(OperatingMode::Auto));
        management
            .expect_read_session_params()
            .returning(|_| Ok(SessionParamsRecord::default()));
        management
            .expect_write_session_params()
            .returning(|arm, _| match arm {
                Arm::Left => Ok(()),
                Arm::Right => Err(create_network_exception("rejected")),
            });
        let mut supervisor = supervisor(management, 5);
        match supervisor.handshake("127.0.0.1", 80) {
            Err(YumiException::ParameterPushFailed { arm, .. }) => assert_eq!(arm, Arm::Right),
            other => panic!("expected ParameterPushFailed, got {:?}", other),
        }
    }

    #[test]
    fn unreachable_controller_fails_the_session() {
        let mut supervisor = SessionSupervisor::new(
            FakeConnector::unreachable(),
            SessionConfig::default(),
            management_config(5),
        );
        assert!(matches!(
            supervisor.handshake("127.0.0.1", 80),
            Err(YumiException::NetworkException { .. })
        ));
        assert_eq!(supervisor.state(), SessionState::Failed);
    }

    #[test]
    fn start_needs_a_completed_handshake() {
        let mut supervisor = supervisor(MockManagementInterface::new(), 5);
        assert!(matches!(
            supervisor.start(),
            Err(YumiException::InvalidSessionState {
                state: SessionState::Uninitialized
            })
        ));
    }

    #[test]
    fn start_and_stop_walk_through_the_states() {
        let mut management = ready_management();
        let mut start_calls = 0;
        management.expect_signal_start().times(2).returning(move || {
            start_calls += 1;
            Ok(start_calls == 2)
        });
        management
            .expect_signal_stop()
            .times(1)
            .returning(|| Ok(true));
        let mut supervisor = supervisor(management, 5);
        supervisor.handshake("127.0.0.1", 80).unwrap();
        supervisor.start().unwrap();
        assert_eq!(supervisor.state(), SessionState::Running);
        supervisor.stop().unwrap();
        assert_eq!(supervisor.state(), SessionState::Stopped);
    }

    #[test]
    fn unacknowledged_start_fails_the_session() {
        let mut management = ready_management();
        management
            .expect_signal_start()
            .times(4)
            .returning(|| Ok(false));
        let mut supervisor = supervisor(management, 4);
        supervisor.handshake("127.0.0.1", 80).unwrap();
        assert!(matches!(
            supervisor.start(),
            Err(YumiException::SignalFailed {
                signal: Signal::Start,
                attempts: 4
            })
        ));
        assert_eq!(supervisor.state(), SessionState::Failed);
    }

    #[test]
    fn unacknowledged_stop_keeps_running() {
        let mut management = ready_management();
        management.expect_signal_start().returning(|| Ok(true));
        management
            .expect_signal_stop()
            .times(2)
            .returning(|| Err(create_network_exception("timeout")));
        let mut supervisor = supervisor(management, 2);
        supervisor.handshake("127.0.0.1", 80).unwrap();
        supervisor.start().unwrap();
        assert!(matches!(
            supervisor.stop(),
            Err(YumiException::SignalFailed {
                signal: Signal::Stop,
                attempts: 2
            })
        ));
        assert_eq!(supervisor.state(), SessionState::Running);
    }
}
