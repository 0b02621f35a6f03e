// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the conversion between the native joint layout of an arm and the application order.
//!
//! The controller numbers the joints of an arm as six main axes plus one external axis, all in
//! degrees. The application uses seven joints in radians, where the external axis sits between
//! the wrist and the elbow:
//!
//! | application joint | 0 | 1 | 2 | 3 | 4 | 5 | 6 |
//! |---|---|---|---|---|---|---|---|
//! | native slot | main 0 | main 1 | main 3 | main 4 | main 5 | external | main 2 |
use crate::motion::types::{ArmJointStates, JointSpace, JointValues, N_ARM_JOINTS};

/// A slot of the native joint layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NativeSlot {
    Main(usize),
    External,
}

/// Native slot of every application joint, indexed by the application joint.
pub static AXIS_MAP: [NativeSlot; N_ARM_JOINTS] = [
    NativeSlot::Main(0),
    NativeSlot::Main(1),
    NativeSlot::Main(3),
    NativeSlot::Main(4),
    NativeSlot::Main(5),
    NativeSlot::External,
    NativeSlot::Main(2),
];

impl NativeSlot {
    fn get(&self, values: &JointValues) -> f64 {
        match *self {
            NativeSlot::Main(index) => values.main[index],
            NativeSlot::External => values.external,
        }
    }
    fn set(&self, values: &mut JointValues, value: f64) {
        match *self {
            NativeSlot::Main(index) => values.main[index] = value,
            NativeSlot::External => values.external = value,
        }
    }
}

/// Converts native joint values \[deg\] into application order \[rad\].
pub fn native_to_app(values: &JointValues) -> [f64; N_ARM_JOINTS] {
    let mut out = [0.; N_ARM_JOINTS];
    for (joint, slot) in AXIS_MAP.iter().enumerate() {
        out[joint] = slot.get(values).to_radians();
    }
    out
}

/// Converts joint values in application order \[rad\] into the native layout \[deg\].
pub fn app_to_native(block: &[f64; N_ARM_JOINTS]) -> JointValues {
    let mut out = JointValues::default();
    for (joint, slot) in AXIS_MAP.iter().enumerate() {
        slot.set(&mut out, block[joint].to_degrees());
    }
    out
}

/// Converts position, speed and acceleration of a feedback frame into application order and units.
pub fn joint_space_to_app(joints: &JointSpace) -> ArmJointStates {
    ArmJointStates {
        position: native_to_app(&joints.position),
        velocity: native_to_app(&joints.speed),
        acceleration: native_to_app(&joints.acceleration),
    }
}
