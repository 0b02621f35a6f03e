// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the native joint layout and the frames which are exchanged on the motion channels.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of joints of one arm.
pub const N_ARM_JOINTS: usize = 7;
/// Number of joints of the whole robot.
pub const N_JOINTS: usize = 2 * N_ARM_JOINTS;
/// Number of main axes in the native layout of an arm.
pub const N_MAIN_AXES: usize = 6;

/// Joint vector of the whole robot: `[left arm (7), right arm (7)]`.
pub type JointVector14 = [f64; N_JOINTS];

/// The two arms of the robot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    /// Both arms in the order they appear in a [`JointVector14`].
    pub const BOTH: [Arm; 2] = [Arm::Left, Arm::Right];

    /// index of the first joint of this arm in a [`JointVector14`]
    pub fn joint_offset(&self) -> usize {
        match self {
            Arm::Left => 0,
            Arm::Right => N_ARM_JOINTS,
        }
    }

    /// motion channel port of this arm
    pub fn port(&self, base_port: u16) -> u16 {
        match self {
            Arm::Left => base_port,
            Arm::Right => base_port + 1,
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arm::Left => write!(f, "left"),
            Arm::Right => write!(f, "right"),
        }
    }
}

/// Number of axes which are exchanged with the controller.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Axes {
    /// Only the six main axes, the external axis is reported as zero.
    Six,
    /// Six main axes and the external axis.
    Seven,
}

/// Joint values of one arm in the native layout of the controller. \[deg\], \[deg/s\] or \[deg/s²\]
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct JointValues {
    pub main: [f64; N_MAIN_AXES],
    pub external: f64,
}

impl JointValues {
    pub fn new(main: [f64; N_MAIN_AXES], external: f64) -> Self {
        JointValues { main, external }
    }
}

/// Native joint state of one arm as received in a feedback frame.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct JointSpace {
    pub position: JointValues,
    pub speed: JointValues,
    pub acceleration: JointValues,
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct FrameHeader {
    pub sequence_number: u32,
    /// controller time of the frame \[ms\]
    pub timestamp_ms: u32,
}

/// Frame sent by the controller at its own cadence.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct FeedbackFrame {
    pub header: FrameHeader,
    pub joints: JointSpace,
}

/// Frame sent to the controller with the commanded joint speeds.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq)]
pub struct CommandFrame {
    pub header: FrameHeader,
    pub speed: JointValues,
}

/// Joint states of one arm in application order and units. \[rad\], \[rad/s\], \[rad/s²\]
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ArmJointStates {
    pub position: [f64; N_ARM_JOINTS],
    pub velocity: [f64; N_ARM_JOINTS],
    pub acceleration: [f64; N_ARM_JOINTS],
}

/// Snapshot of the joint states of both arms.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct JointStates {
    pub position: JointVector14,
    pub velocity: JointVector14,
    pub acceleration: JointVector14,
}

impl Default for JointStates {
    fn default() -> Self {
        JointStates {
            position: [0.; N_JOINTS],
            velocity: [0.; N_JOINTS],
            acceleration: [0.; N_JOINTS],
        }
    }
}

impl JointStates {
    /// copies the states of one arm into its block of the 14 joint vectors
    pub fn set_arm(&mut self, arm: Arm, states: &ArmJointStates) {
        let range = arm.joint_offset()..arm.joint_offset() + N_ARM_JOINTS;
        self.position[range.clone()].copy_from_slice(&states.position);
        self.velocity[range.clone()].copy_from_slice(&states.velocity);
        self.acceleration[range].copy_from_slice(&states.acceleration);
    }
}

/// returns the 7 joint block of an arm
pub fn arm_block(vector: &JointVector14, arm: Arm) -> [f64; N_ARM_JOINTS] {
    let mut block = [0.; N_ARM_JOINTS];
    block.copy_from_slice(&vector[arm.joint_offset()..arm.joint_offset() + N_ARM_JOINTS]);
    block
}

#[cfg(test)]
mod tests {
    use crate::motion::types::{arm_block, Arm, ArmJointStates, JointStates, N_JOINTS};

    #[test]
    fn arms_occupy_disjoint_blocks() {
        let mut states = JointStates::default();
        let left = ArmJointStates {
            position: [1.; 7],
            velocity: [2.; 7],
            acceleration: [3.; 7],
        };
        let right = ArmJointStates {
            position: [4.; 7],
            velocity: [5.; 7],
            acceleration: [6.; 7],
        };
        states.set_arm(Arm::Right, &right);
        states.set_arm(Arm::Left, &left);
        assert_eq!(arm_block(&states.position, Arm::Left), [1.; 7]);
        assert_eq!(arm_block(&states.position, Arm::Right), [4.; 7]);
        assert_eq!(arm_block(&states.velocity, Arm::Right), [5.; 7]);
        assert_eq!(arm_block(&states.acceleration, Arm::Left), [3.; 7]);
        assert_eq!(states.position.len(), N_JOINTS);
    }

    #[test]
    fn right_arm_uses_next_port() {
        assert_eq!(Arm::Left.port(6510), 6510);
        assert_eq!(Arm::Right.port(6510), 6511);
    }
}
