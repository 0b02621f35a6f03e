// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Fakes of the management interface and the motion channels shared by the tests.
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::exception::{create_network_exception, YumiException, YumiResult};
use crate::management::types::{OperatingMode, SessionParamsRecord};
use crate::management::{ManagementConnector, MockManagementInterface};
use crate::motion::channel::{MotionChannel, MotionTransport};
use crate::motion::io_service::IoHandle;
use crate::motion::types::{Arm, JointSpace, JointValues};

/// Hands out one prepared management mock.
pub(crate) struct FakeConnector {
    management: Mutex<Option<MockManagementInterface>>,
    pub connects: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(management: MockManagementInterface) -> Self {
        FakeConnector {
            management: Mutex::new(Some(management)),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn unreachable() -> Self {
        FakeConnector {
            management: Mutex::new(None),
            connects: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ManagementConnector for FakeConnector {
    type Management = MockManagementInterface;

    fn connect(&self, address: &str, port: u16) -> YumiResult<MockManagementInterface> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.management
            .lock()
            .take()
            .ok_or_else(|| create_network_exception(format!("{}:{}: connection refused", address, port)))
    }
}

/// Management mock which passes every handshake step.
pub(crate) fn ready_management() -> MockManagementInterface {
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
        .returning(|_, _| Ok(()));
    management
}

/// Feedback and command record shared between a test and its fake channels.
#[derive(Default)]
pub(crate) struct ChannelScript {
    feedback: Mutex<[Option<JointSpace>; 2]>,
    commands: Mutex<Vec<(Arm, JointValues)>>,
}

impl ChannelScript {
    pub fn set_feedback(&self, arm: Arm, joints: JointSpace) {
        self.feedback.lock()[arm as usize] = Some(joints);
    }

    pub fn commands(&self) -> Vec<(Arm, JointValues)> {
        self.commands.lock().clone()
    }
}

pub(crate) struct FakeChannel {
    arm: Arm,
    script: Arc<ChannelScript>,
}

impl MotionChannel for FakeChannel {
    fn wait_for_feedback(&mut self) -> YumiResult<()> {
        match self.script.feedback.lock()[self.arm as usize] {
            Some(_) => Ok(()),
            None => Err(YumiException::CommunicationTimeout {
                arm: self.arm,
                timeout: Duration::ZERO,
            }),
        }
    }

    fn read_feedback(&mut self) -> YumiResult<JointSpace> {
        self.script.feedback.lock()[self.arm as usize]
            .ok_or_else(|| create_network_exception("no feedback received"))
    }

    fn send_command(&mut self, speed: &JointValues) -> YumiResult<()> {
        self.script.commands.lock().push((self.arm, *speed));
        Ok(())
    }
}

/// Opens [`FakeChannel`]s and counts how many were opened.
#[derive(Default)]
pub(crate) struct FakeTransport {
    pub script: Arc<ChannelScript>,
    pub opens: Arc<AtomicUsize>,
}

impl MotionTransport for FakeTransport {
    type Channel = FakeChannel;

    fn open(&self, arm: Arm, _io: &IoHandle) -> YumiResult<FakeChannel> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(FakeChannel {
            arm,
            script: self.script.clone(),
        })
    }
}
