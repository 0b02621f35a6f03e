// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the messages of the management interface.
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::motion::types::Arm;

/// Encoded size of [`ManagementCommandHeader`].
pub const HEADER_SIZE: usize = 10;
/// Encoded size of [`Status`].
pub const STATUS_SIZE: usize = 2;

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum ManagementCommand {
    IsProgramRunning,
    GetOperatingMode,
    GetSessionParams,
    SetSessionParams,
    SignalStart,
    SignalStop,
}

#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum Status {
    Success,
    Fail,
    /// The controller is still processing an earlier instruction.
    Rejected,
}

/// Operating mode of the controller as selected on the flexpendant.
#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum OperatingMode {
    Init,
    AutoChange,
    ManualReducedSpeed,
    ManualFullSpeed,
    Auto,
    Undefined,
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            OperatingMode::Init => "INIT",
            OperatingMode::AutoChange => "AUTO_CH",
            OperatingMode::ManualReducedSpeed => "MANR",
            OperatingMode::ManualFullSpeed => "MANF",
            OperatingMode::Auto => "AUTO",
            OperatingMode::Undefined => "UNDEF",
        };
        write!(f, "{}", name)
    }
}

/// RAPID task which runs the motion program of an arm.
#[derive(Serialize_repr, Deserialize_repr, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u16)]
pub enum ArmTask {
    RobotLeft,
    RobotRight,
}

impl From<Arm> for ArmTask {
    fn from(arm: Arm) -> Self {
        match arm {
            Arm::Left => ArmTask::RobotLeft,
            Arm::Right => ArmTask::RobotRight,
        }
    }
}

impl fmt::Display for ArmTask {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ArmTask::RobotLeft => write!(f, "T_ROB_L"),
            ArmTask::RobotRight => write!(f, "T_ROB_R"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ManagementCommandHeader {
    pub command: ManagementCommand,
    pub command_id: u32,
    /// total size of the message including this header
    pub size: u32,
}

impl ManagementCommandHeader {
    pub fn new(command: ManagementCommand, command_id: u32, size: u32) -> Self {
        ManagementCommandHeader {
            command,
            command_id,
            size,
        }
    }
}

/// Session parameter record of one arm as stored in its RAPID task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct SessionParamsRecord {
    pub comm_timeout: f64,
    pub tool_name: String,
    pub wobj_name: String,
    pub cond_min_max: f64,
    pub lp_filter: f64,
    pub max_speed_deviation: f64,
    pub cond_time: f64,
    pub ramp_in_time: f64,
    pub pos_corr_gain: f64,
}

impl fmt::Display for SessionParamsRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{},\"{}\",\"{}\",{},{},{},{},{},{}]",
            self.comm_timeout,
            self.tool_name,
            self.wobj_name,
            self.cond_min_max,
            self.lp_filter,
            self.max_speed_deviation,
            self.cond_time,
            self.ramp_in_time,
            self.pos_corr_gain
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SetSessionParamsRequest {
    pub task: ArmTask,
    pub record: SessionParamsRecord,
}

#[cfg(test)]
mod tests {
    use crate::management::types::{ArmTask, SessionParamsRecord};
    use crate::motion::types::Arm;

    #[test]
    fn record_prints_as_value_string() {
        let record = SessionParamsRecord {
            comm_timeout: 30.,
            tool_name: "tool0".to_string(),
            wobj_name: "wobj0".to_string(),
            cond_min_max: 0.5,
            lp_filter: 0.,
            max_speed_deviation: 400.,
            cond_time: 10.,
            ramp_in_time: 0.1,
            pos_corr_gain: 0.,
        };
        assert_eq!(
            record.to_string(),
            "[30,\"tool0\",\"wobj0\",0.5,0,400,10,0.1,0]"
        );
    }

    #[test]
    fn arms_map_to_their_tasks() {
        assert_eq!(ArmTask::from(Arm::Left).to_string(), "T_ROB_L");
        assert_eq!(ArmTask::from(Arm::Right).to_string(), "T_ROB_R");
    }
}
