// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the cyclic motion channel of one arm.
//!
//! The channel binds a UDP port and waits for the controller to stream feedback frames to it.
//! Command frames are sent back to the address of the latest feedback frame. Receiving and
//! sending happens on the workers of the [`IoService`](`crate::motion::io_service::IoService`).
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::net::UdpSocket;
use mio::{Events, Interest, Poll, Token};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::exception::{create_network_exception, YumiException, YumiResult};
use crate::motion::io_service::IoHandle;
use crate::motion::types::{
    Arm, Axes, CommandFrame, FeedbackFrame, FrameHeader, JointSpace, JointValues,
};
use crate::network::{deserialize, serialize};

const FEEDBACK: Token = Token(0);
/// Interval in which the receive job checks for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const RECEIVE_BUFFER_SIZE: usize = 1024;

/// Operations of the cyclic motion session of one arm.
pub trait MotionChannel: Send {
    /// Blocks until a new feedback frame has arrived.
    /// # Errors
    /// * [`CommunicationTimeout`](`crate::exception::YumiException::CommunicationTimeout`) if no
    /// frame arrives within the communication timeout.
    fn wait_for_feedback(&mut self) -> YumiResult<()>;

    /// Returns the joint state of the most recent feedback frame.
    fn read_feedback(&mut self) -> YumiResult<JointSpace>;

    /// Queues a command frame with the given native joint speeds \[deg/s\].
    fn send_command(&mut self, speed: &JointValues) -> YumiResult<()>;
}

/// Opens motion channels.
pub trait MotionTransport {
    type Channel: MotionChannel;

    /// Opens the channel of an arm and posts its I/O to the given service.
    fn open(&self, arm: Arm, io: &IoHandle) -> YumiResult<Self::Channel>;
}

/// Per-channel options.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ChannelOptions {
    /// UDP port of the left arm. The right arm uses the next port.
    pub base_port: u16,
    /// Maximum time to wait for a feedback frame.
    pub communication_timeout: Duration,
    pub axes: Axes,
    pub use_speed: bool,
    pub use_logging: bool,
}

/// Opens [`ArmChannel`]s on UDP ports.
#[derive(Debug, Clone)]
pub struct UdpTransport {
    options: ChannelOptions,
}

impl UdpTransport {
    pub fn new(options: ChannelOptions) -> Self {
        UdpTransport { options }
    }
}

impl MotionTransport for UdpTransport {
    type Channel = ArmChannel;

    fn open(&self, arm: Arm, io: &IoHandle) -> YumiResult<ArmChannel> {
        ArmChannel::open(arm, self.options, io.clone())
    }
}

#[derive(Default)]
struct SlotState {
    latest: Option<FeedbackFrame>,
    fresh: bool,
    remote: Option<SocketAddr>,
}

/// Latest feedback frame, shared between the receive job and the channel.
#[derive(Default)]
struct FeedbackSlot {
    state: Mutex<SlotState>,
    arrived: Condvar,
}

impl FeedbackSlot {
    fn publish(&self, frame: FeedbackFrame, remote: SocketAddr) {
        let mut state = self.state.lock();
        state.latest = Some(frame);
        state.fresh = true;
        state.remote = Some(remote);
        self.arrived.notify_all();
    }
}

/// Cyclic motion session of one arm.
pub struct ArmChannel {
    arm: Arm,
    options: ChannelOptions,
    socket: Arc<UdpSocket>,
    slot: Arc<FeedbackSlot>,
    io: IoHandle,
    sequence_number: u32,
    start_time: Instant,
}

impl ArmChannel {
    /// Binds the port of the arm and posts the receive job to the I/O service.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::YumiException::NetworkException`) if the port
    /// can not be bound.
    pub fn open(arm: Arm, options: ChannelOptions, io: IoHandle) -> YumiResult<ArmChannel> {
        let port = arm.port(options.base_port);
        let address = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        let mut socket = UdpSocket::bind(address).map_err(|e| {
            create_network_exception(format!("can not bind port {} for the {} arm: {}", port, arm, e))
        })?;
        let poll = Poll::new().map_err(create_network_exception)?;
        poll.registry()
            .register(&mut socket, FEEDBACK, Interest::READABLE)
            .map_err(create_network_exception)?;
        let socket = Arc::new(socket);
        let slot = Arc::new(FeedbackSlot::default());
        let receiver = FeedbackReceiver {
            arm,
            options,
            socket: socket.clone(),
            poll,
            slot: slot.clone(),
            io: io.clone(),
        };
        io.post(move || receiver.run())?;
        debug!("{} arm channel listening on port {}", arm, port);
        Ok(ArmChannel {
            arm,
            options,
            socket,
            slot,
            io,
            sequence_number: 0,
            start_time: Instant::now(),
        })
    }

    pub fn arm(&self) -> Arm {
        self.arm
    }

    /// local address of the bound socket
    pub fn local_addr(&self) -> YumiResult<SocketAddr> {
        self.socket.local_addr().map_err(create_network_exception)
    }
}

impl MotionChannel for ArmChannel {
    fn wait_for_feedback(&mut self) -> YumiResult<()> {
        let timeout = self.options.communication_timeout;
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock();
        while !state.fresh {
            if self.slot.arrived.wait_until(&mut state, deadline).timed_out() && !state.fresh {
                return Err(YumiException::CommunicationTimeout {
                    arm: self.arm,
                    timeout,
                });
            }
        }
        state.fresh = false;
        Ok(())
    }

    fn read_feedback(&mut self) -> YumiResult<JointSpace> {
        let state = self.slot.state.lock();
        match state.latest {
            Some(frame) => Ok(frame.joints),
            None => Err(create_network_exception(format!(
                "no feedback received from the {} arm",
                self.arm
            ))),
        }
    }

    fn send_command(&mut self, speed: &JointValues) -> YumiResult<()> {
        if !self.options.use_speed {
            return Err(create_network_exception(
                "velocity commands need a channel which sends speed values",
            ));
        }
        let remote = match self.slot.state.lock().remote {
            Some(remote) => remote,
            None => {
                return Err(create_network_exception(format!(
                    "no feedback received from the {} arm, can not address a command",
                    self.arm
                )))
            }
        };
        self.sequence_number = self.sequence_number.wrapping_add(1);
        let mut speed = *speed;
        if self.options.axes == Axes::Six {
            speed.external = 0.;
        }
        let frame = CommandFrame {
            header: FrameHeader {
                sequence_number: self.sequence_number,
                timestamp_ms: self.start_time.elapsed().as_millis() as u32,
            },
            speed,
        };
        let bytes = serialize(&frame)?;
        let socket = self.socket.clone();
        let arm = self.arm;
        let use_logging = self.options.use_logging;
        self.io.post(move || match socket.send_to(&bytes, remote) {
            Ok(sent) if sent == bytes.len() => {
                if use_logging {
                    trace!("{} arm command {:?}", arm, frame);
                }
            }
            Ok(sent) => warn!(
                "{} arm command frame truncated: {} of {} bytes sent",
                arm,
                sent,
                bytes.len()
            ),
            Err(e) => warn!("{} arm command frame could not be sent: {}", arm, e),
        })
    }
}

/// Long-running job which receives the feedback frames of one arm.
struct FeedbackReceiver {
    arm: Arm,
    options: ChannelOptions,
    socket: Arc<UdpSocket>,
    poll: Poll,
    slot: Arc<FeedbackSlot>,
    io: IoHandle,
}

impl FeedbackReceiver {
    fn run(mut self) {
        let frame_size = match bincode::serialized_size(&FeedbackFrame::default()) {
            Ok(size) => size as usize,
            Err(e) => {
                warn!("{} arm receive job can not size feedback frames: {}", self.arm, e);
                return;
            }
        };
        let mut events = Events::with_capacity(8);
        let mut buffer = vec![0_u8; RECEIVE_BUFFER_SIZE];
        while !self.io.is_shutdown() {
            if let Err(e) = self.poll.poll(&mut events, Some(POLL_INTERVAL)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                warn!("{} arm receive job stopped: {}", self.arm, e);
                return;
            }
            for event in events.iter() {
                if event.token() == FEEDBACK && event.is_readable() {
                    self.drain(&mut buffer, frame_size);
                }
            }
        }
        debug!("{} arm receive job finished", self.arm);
    }

    fn drain(&self, buffer: &mut [u8], frame_size: usize) {
        loop {
            match self.socket.recv_from(buffer) {
                Ok((read_bytes, remote)) => {
                    if read_bytes != frame_size {
                        warn!(
                            "{} arm feedback dropped: frame has {} bytes but it should have {} bytes",
                            self.arm, read_bytes, frame_size
                        );
                        continue;
                    }
                    match deserialize::<FeedbackFrame>(&buffer[..read_bytes]) {
                        Ok(mut frame) => {
                            if self.options.axes == Axes::Six {
                                frame.joints.position.external = 0.;
                                frame.joints.speed.external = 0.;
                                frame.joints.acceleration.external = 0.;
                            }
                            if self.options.use_logging {
                                trace!("{} arm feedback {:?}", self.arm, frame);
                            }
                            self.slot.publish(frame, remote);
                        }
                        Err(e) => warn!("{} arm feedback dropped: {}", self.arm, e),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("{} arm feedback could not be received: {}", self.arm, e);
                    return;
                }
            }
        }
    }
}
