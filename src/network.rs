// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the TCP request/response connection to the management interface of the controller
//! and the binary encoding shared by all messages.
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::trace;

use crate::exception::{create_network_exception, YumiResult};
use crate::management::types::{ManagementCommand, ManagementCommandHeader, HEADER_SIZE};

const CLIENT: Token = Token(1);
const READ_CHUNK_SIZE: usize = 4096;

pub struct Network {
    tcp_socket: TcpStream,
    response_timeout: Duration,
    pub command_id: u32,
    read_buffer: Vec<u8>,
    received_responses: HashMap<u32, Vec<u8>>,
    /// set once the controller closed the connection
    closed: bool,
    poll_read: Poll,
    events: Events,
}

impl Network {
    /// Connects to the management interface of the controller.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::YumiException::NetworkException`) if the address
    /// can not be resolved or the connection is refused.
    pub fn new(address: &str, port: u16, response_timeout: Duration) -> YumiResult<Network> {
        let address_str: String = format!("{}:{}", address, port);
        let sock_address: SocketAddr = address_str
            .to_socket_addrs()
            .map_err(|e| create_network_exception(format!("{}: {}", address_str, e)))?
            .next()
            .ok_or_else(|| create_network_exception(format!("{}: no address", address_str)))?;
        let std_socket = StdTcpStream::connect_timeout(&sock_address, response_timeout)
            .map_err(|e| create_network_exception(format!("{}: {}", address_str, e)))?;
        std_socket
            .set_nodelay(true)
            .map_err(create_network_exception)?;
        std_socket
            .set_nonblocking(true)
            .map_err(create_network_exception)?;
        let mut tcp_socket = TcpStream::from_std(std_socket);
        let fd = tcp_socket.as_raw_fd();

        setsockopt(fd, KeepAlive, &true).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepIdle, &1).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepCount, &3).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepInterval, &1).map_err(create_network_exception)?;

        let poll_read = Poll::new().map_err(create_network_exception)?;
        poll_read
            .registry()
            .register(&mut tcp_socket, CLIENT, Interest::READABLE)
            .map_err(create_network_exception)?;
        Ok(Network {
            tcp_socket,
            response_timeout,
            command_id: 0,
            read_buffer: Vec::new(),
            received_responses: HashMap::new(),
            closed: false,
            poll_read,
            events: Events::with_capacity(128),
        })
    }

    /// Sends a request with a fresh command ID and returns that ID.
    pub fn tcp_send_request<T: Serialize + Debug>(
        &mut self,
        command: ManagementCommand,
        payload: &T,
    ) -> YumiResult<u32> {
        self.command_id = self.command_id.wrapping_add(1);
        let payload_bytes = serialize(payload)?;
        let header = ManagementCommandHeader::new(
            command,
            self.command_id,
            (HEADER_SIZE + payload_bytes.len()) as u32,
        );
        let mut message = serialize(&header)?;
        message.extend_from_slice(&payload_bytes);
        trace!("management request {:?} {:?}", header, payload);
        self.write_all(&message)?;
        Ok(self.command_id)
    }

    /// Blocks until the response with the given command ID has been received and returns its
    /// body, i.e. everything after the header.
    ///
    /// Responses to older commands which arrived after their own timeout are discarded.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::YumiException::NetworkException`) if the
    /// response does not arrive within the response timeout or the connection is closed
    /// before it arrived.
    pub fn tcp_blocking_receive_response(&mut self, command_id: u32) -> YumiResult<Vec<u8>> {
        let deadline = Instant::now() + self.response_timeout;
        loop {
            self.received_responses.retain(|id, _| *id >= command_id);
            if let Some(response) = self.received_responses.remove(&command_id) {
                return Ok(response);
            }
            if self.closed {
                return Err(create_network_exception(format!(
                    "connection closed by controller before the response to command {}",
                    command_id
                )));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(create_network_exception(format!(
                    "timeout while waiting for the response to command {}",
                    command_id
                )));
            }
            self.tcp_read_from_buffer(deadline - now)?;
        }
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> YumiResult<()> {
        let deadline = Instant::now() + self.response_timeout;
        while !bytes.is_empty() {
            match self.tcp_socket.write(bytes) {
                Ok(0) => return Err(create_network_exception("connection closed by controller")),
                Ok(written) => bytes = &bytes[written..],
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Err(create_network_exception("timeout while sending a request"));
                    }
                    std::thread::yield_now();
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(create_network_exception(e)),
            }
        }
        Ok(())
    }

    fn tcp_read_from_buffer(&mut self, timeout: Duration) -> YumiResult<()> {
        match self.poll_read.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(create_network_exception(e)),
        }
        let readable = self
            .events
            .iter()
            .any(|event| event.token() == CLIENT && event.is_readable());
        if !readable {
            return Ok(());
        }
        let mut chunk = [0_u8; READ_CHUNK_SIZE];
        let mut read_error = None;
        loop {
            match self.tcp_socket.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(read_bytes) => self.read_buffer.extend_from_slice(&chunk[..read_bytes]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }
        self.split_responses()?;
        match read_error {
            Some(e) => Err(create_network_exception(e)),
            None => Ok(()),
        }
    }

    /// moves every complete message of the read buffer into the received responses
    fn split_responses(&mut self) -> YumiResult<()> {
        while self.read_buffer.len() >= HEADER_SIZE {
            let header: ManagementCommandHeader = deserialize(&self.read_buffer[..HEADER_SIZE])?;
            let size = header.size as usize;
            if size < HEADER_SIZE {
                return Err(create_network_exception(format!(
                    "invalid response size {} for command {}",
                    size, header.command_id
                )));
            }
            if self.read_buffer.len() < size {
                break;
            }
            let message: Vec<u8> = self.read_buffer.drain(..size).collect();
            trace!("management response {:?}", header);
            self.received_responses
                .insert(header.command_id, message[HEADER_SIZE..].to_vec());
        }
        Ok(())
    }
}

pub(crate) fn serialize<T: Serialize>(s: &T) -> YumiResult<Vec<u8>> {
    bincode::serialize(s).map_err(create_network_exception)
}

pub(crate) fn deserialize<T: DeserializeOwned>(encoded: &[u8]) -> YumiResult<T> {
    bincode::deserialize(encoded).map_err(create_network_exception)
}
