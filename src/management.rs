// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the client of the management interface of the controller.
use std::fmt::Debug;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::exception::{create_network_exception, YumiResult};
use crate::management::types::{
    ArmTask, ManagementCommand, OperatingMode, SessionParamsRecord, SetSessionParamsRequest,
    Status, STATUS_SIZE,
};
use crate::motion::types::Arm;
use crate::network::{deserialize, Network};

pub mod types;

/// Request/response operations of the management interface.
#[cfg_attr(test, mockall::automock)]
pub trait ManagementInterface {
    /// Checks whether the RAPID program is running.
    fn is_program_running(&mut self) -> YumiResult<bool>;

    /// Returns the operating mode of the controller.
    fn operating_mode(&mut self) -> YumiResult<OperatingMode>;

    /// Reads the session parameter record of an arm.
    fn read_session_params(&mut self, arm: Arm) -> YumiResult<SessionParamsRecord>;

    /// Writes the session parameter record of an arm.
    fn write_session_params(&mut self, arm: Arm, record: &SessionParamsRecord) -> YumiResult<()>;

    /// Signals the RAPID program to start the motion session.
    ///
    /// # Return
    /// True if the controller accepted the signal, false if it rejected it.
    fn signal_start(&mut self) -> YumiResult<bool>;

    /// Signals the RAPID program to stop the motion session.
    ///
    /// # Return
    /// True if the controller accepted the signal, false if it rejected it.
    fn signal_stop(&mut self) -> YumiResult<bool>;
}

/// Opens connections to the management interface.
pub trait ManagementConnector {
    type Management: ManagementInterface;

    fn connect(&self, address: &str, port: u16) -> YumiResult<Self::Management>;
}

/// Opens [`ManagementClient`] connections over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    response_timeout: Duration,
}

impl TcpConnector {
    pub fn new(response_timeout: Duration) -> Self {
        TcpConnector { response_timeout }
    }
}

impl ManagementConnector for TcpConnector {
    type Management = ManagementClient;

    fn connect(&self, address: &str, port: u16) -> YumiResult<ManagementClient> {
        ManagementClient::new(address, port, self.response_timeout)
    }
}

/// Maintains a TCP connection to the management interface of the controller.
pub struct ManagementClient {
    network: Network,
}

impl ManagementClient {
    /// Connects to the management interface.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::YumiException::NetworkException`) if the
    /// connection can not be established.
    pub fn new(address: &str, port: u16, response_timeout: Duration) -> YumiResult<Self> {
        Ok(ManagementClient {
            network: Network::new(address, port, response_timeout)?,
        })
    }

    /// Sends a request and returns the status and the undecoded payload of the response.
    fn execute<T: Serialize + Debug>(
        &mut self,
        command: ManagementCommand,
        payload: &T,
    ) -> YumiResult<(Status, Vec<u8>)> {
        let command_id = self.network.tcp_send_request(command, payload)?;
        let body = self.network.tcp_blocking_receive_response(command_id)?;
        if body.len() < STATUS_SIZE {
            return Err(create_network_exception(format!(
                "response to {:?} has no status",
                command
            )));
        }
        let status: Status = deserialize(&body[..STATUS_SIZE])?;
        Ok((status, body[STATUS_SIZE..].to_vec()))
    }

    /// Executes a query which only succeeds with a payload.
    fn query<T: Serialize + Debug, R: DeserializeOwned>(
        &mut self,
        command: ManagementCommand,
        payload: &T,
    ) -> YumiResult<R> {
        match self.execute(command, payload)? {
            (Status::Success, body) => deserialize(&body),
            (status, _) => Err(create_network_exception(format!(
                "{:?} answered with {:?}",
                command, status
            ))),
        }
    }

    /// Executes a signal. A rejected signal is not an error.
    fn signal(&mut self, command: ManagementCommand) -> YumiResult<bool> {
        match self.execute(command, &())? {
            (Status::Success, _) => Ok(true),
            (Status::Rejected, _) => Ok(false),
            (Status::Fail, _) => Err(create_network_exception(format!("{:?} failed", command))),
        }
    }
}

impl ManagementInterface for ManagementClient {
    fn is_program_running(&mut self) -> YumiResult<bool> {
        self.query(ManagementCommand::IsProgramRunning, &())
    }

    fn operating_mode(&mut self) -> YumiResult<OperatingMode> {
        self.query(ManagementCommand::GetOperatingMode, &())
    }

    fn read_session_params(&mut self, arm: Arm) -> YumiResult<SessionParamsRecord> {
        self.query(ManagementCommand::GetSessionParams, &ArmTask::from(arm))
    }

    fn write_session_params(&mut self, arm: Arm, record: &SessionParamsRecord) -> YumiResult<()> {
        let request = SetSessionParamsRequest {
            task: ArmTask::from(arm),
            record: record.clone(),
        };
        match self.execute(ManagementCommand::SetSessionParams, &request)? {
            (Status::Success, _) => Ok(()),
            (status, _) => Err(create_network_exception(format!(
                "writing the session parameters of {} answered with {:?}",
                request.task, status
            ))),
        }
    }

    fn signal_start(&mut self) -> YumiResult<bool> {
        self.signal(ManagementCommand::SignalStart)
    }

    fn signal_stop(&mut self) -> YumiResult<bool> {
        self.signal(ManagementCommand::SignalStop)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use crate::management::types::{
        ArmTask, ManagementCommand, ManagementCommandHeader, OperatingMode, SessionParamsRecord,
        SetSessionParamsRequest, Status, HEADER_SIZE,
    };
    use crate::management::{ManagementClient, ManagementInterface};
    use crate::motion::types::Arm;
    use bincode::{deserialize, serialize};
    use mockall::automock;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::time::Duration;

    pub struct ServerReaction {}

    #[automock]
    #[allow(unused)]
    impl ServerReaction {
        fn process_request(&self, command: ManagementCommand, payload: Vec<u8>) -> (Status, Vec<u8>) {
            (Status::Fail, Vec::new())
        }
        fn number_of_reactions(&self) -> usize {
            0
        }
    }

    /// Controller side of the management interface, answering requests as the mock decides.
    pub struct ControllerMockServer {
        listener: TcpListener,
    }

    impl ControllerMockServer {
        pub fn new() -> Self {
            ControllerMockServer {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
            }
        }

        pub fn port(&self) -> u16 {
            self.listener.local_addr().unwrap().port()
        }

        pub fn server_thread(&self, reaction: &mut MockServerReaction) {
            let (mut socket, _) = self.listener.accept().unwrap();
            socket.set_nodelay(true).unwrap();
            for _ in 0..reaction.number_of_reactions() {
                let (header, payload) = receive_request(&mut socket);
                let (status, body) = reaction.process_request(header.command, payload);
                let mut response_body = serialize(&status).unwrap();
                response_body.extend_from_slice(&body);
                let mut response = serialize(&ManagementCommandHeader::new(
                    header.command,
                    header.command_id,
                    (HEADER_SIZE + response_body.len()) as u32,
                ))
                .unwrap();
                response.extend_from_slice(&response_body);
                socket.write_all(&response).unwrap();
            }
        }
    }

    fn receive_request(socket: &mut TcpStream) -> (ManagementCommandHeader, Vec<u8>) {
        let mut header_bytes = vec![0_u8; HEADER_SIZE];
        socket.read_exact(&mut header_bytes).unwrap();
        let header: ManagementCommandHeader = deserialize(&header_bytes).unwrap();
        let mut payload = vec![0_u8; header.size as usize - HEADER_SIZE];
        socket.read_exact(&mut payload).unwrap();
        (header, payload)
    }

    fn record() -> SessionParamsRecord {
        SessionParamsRecord {
            comm_timeout: 30.,
            tool_name: "tool0".to_string(),
            wobj_name: "wobj0".to_string(),
            cond_min_max: 0.5,
            lp_filter: 0.,
            max_speed_deviation: 400.,
            cond_time: 10.,
            ramp_in_time: 0.1,
            pos_corr_gain: 0.,
        }
    }

    #[test]
    fn queries_are_decoded() {
        let server = ControllerMockServer::new();
        let port = server.port();
        let thread = std::thread::spawn(move || {
            let mut mock = MockServerReaction::default();
            let mut counter = 0;
            mock.expect_process_request()
                .returning(move |command, payload| {
                    counter += 1;
                    match counter {
                        1 => {
                            assert_eq!(command, ManagementCommand::IsProgramRunning);
                            assert!(payload.is_empty());
                            (Status::Success, serialize(&true).unwrap())
                        }
                        2 => {
                            assert_eq!(command, ManagementCommand::GetOperatingMode);
                            (Status::Success, serialize(&OperatingMode::Auto).unwrap())
                        }
                        _ => {
                            assert_eq!(command, ManagementCommand::GetSessionParams);
                            let task: ArmTask = deserialize(&payload).unwrap();
                            assert_eq!(task, ArmTask::RobotRight);
                            (Status::Success, serialize(&record()).unwrap())
                        }
                    }
                })
                .times(3);
            mock.expect_number_of_reactions().return_const(3_usize);
            server.server_thread(&mut mock);
        });
        let mut client = ManagementClient::new("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        assert!(client.is_program_running().unwrap());
        assert_eq!(client.operating_mode().unwrap(), OperatingMode::Auto);
        assert_eq!(client.read_session_params(Arm::Right).unwrap(), record());
        thread.join().unwrap();
    }

    #[test]
    fn write_and_signals_report_status() {
        let server = ControllerMockServer::new();
        let port = server.port();
        let thread = std::thread::spawn(move || {
            let mut mock = MockServerReaction::default();
            let mut counter = 0;
            mock.expect_process_request()
                .returning(move |command, payload| {
                    counter += 1;
                    match counter {
                        1 => {
                            assert_eq!(command, ManagementCommand::SetSessionParams);
                            let request: SetSessionParamsRequest =
                                deserialize(&payload).unwrap();
                            assert_eq!(request.task, ArmTask::RobotLeft);
                            assert_eq!(request.record, record());
                            (Status::Success, Vec::new())
                        }
                        2 => {
                            assert_eq!(command, ManagementCommand::SignalStart);
                            (Status::Rejected, Vec::new())
                        }
                        3 => {
                            assert_eq!(command, ManagementCommand::SignalStart);
                            (Status::Success, Vec::new())
                        }
                        _ => {
                            assert_eq!(command, ManagementCommand::SignalStop);
                            (Status::Fail, Vec::new())
                        }
                    }
                })
                .times(4);
            mock.expect_number_of_reactions().return_const(4_usize);
            server.server_thread(&mut mock);
        });
        let mut client = ManagementClient::new("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        client.write_session_params(Arm::Left, &record()).unwrap();
        assert!(!client.signal_start().unwrap());
        assert!(client.signal_start().unwrap());
        assert!(client.signal_stop().is_err());
        thread.join().unwrap();
    }

    #[test]
    fn failed_query_is_an_error() {
        let server = ControllerMockServer::new();
        let port = server.port();
        let thread = std::thread::spawn(move || {
            let mut mock = MockServerReaction::default();
            mock.expect_process_request()
                .returning(|_, _| (Status::Fail, Vec::new()))
                .times(1);
            mock.expect_number_of_reactions().return_const(1_usize);
            server.server_thread(&mut mock);
        });
        let mut client = ManagementClient::new("127.0.0.1", port, Duration::from_secs(2)).unwrap();
        assert!(client.read_session_params(Arm::Left).is_err());
        thread.join().unwrap();
    }
}
