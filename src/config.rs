// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the driver configuration and its TOML loader.
//!
//! Every value has a default, so an empty file yields a usable configuration:
//! ```toml
//! [session]
//! comm_timeout = 30.0
//! tool_name = "tool0"
//! wobj_name = "wobj0"
//!
//! [management]
//! delay_time = 1.0
//! max_signal_retries = 5
//!
//! [motion]
//! base_port = 6510
//! axes = "seven"
//!
//! [filter]
//! exponential_smoothing_alpha = 0.2
//! ```
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::exception::{YumiException, YumiResult};
use crate::management::types::SessionParamsRecord;
use crate::motion::types::Axes;

/// Smallest I/O pool which leaves one worker for sending next to the receive jobs of both arms.
pub const MIN_IO_THREADS: usize = 3;

/// Control parameters which are pushed to the parameter record of each arm during the handshake.
///
/// The values are never changed after the driver has been constructed.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Communication timeout \[s\]. Also used as feedback timeout of the motion channels.
    pub comm_timeout: f64,
    /// Name of the tool frame.
    pub tool_name: String,
    /// Name of the work object frame.
    pub wobj_name: String,
    /// Condition window \[deg\].
    pub cond_min_max: f64,
    /// Low-pass filter bandwidth of the controller \[Hz\].
    pub lp_filter: f64,
    /// Maximum admitted joint speed change \[deg/s\].
    pub max_speed_deviation: f64,
    /// Condition time \[s\].
    pub cond_time: f64,
    /// Ramp-in time \[s\].
    pub ramp_in_time: f64,
    /// Position correction gain.
    pub pos_corr_gain: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            comm_timeout: 30.0,
            tool_name: "tool0".to_string(),
            wobj_name: "wobj0".to_string(),
            cond_min_max: 0.5,
            lp_filter: 0.0,
            max_speed_deviation: 400.0,
            cond_time: 10.0,
            ramp_in_time: 0.1,
            pos_corr_gain: 0.0,
        }
    }
}

impl SessionConfig {
    /// feedback timeout of the motion channels
    pub fn communication_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.comm_timeout)
    }

    /// Overwrites the fields of a parameter record read from the controller with this
    /// configuration.
    pub fn apply_to(&self, record: &mut SessionParamsRecord) {
        record.comm_timeout = self.comm_timeout;
        record.tool_name = self.tool_name.clone();
        record.wobj_name = self.wobj_name.clone();
        record.cond_min_max = self.cond_min_max;
        record.lp_filter = self.lp_filter;
        record.max_speed_deviation = self.max_speed_deviation;
        record.cond_time = self.cond_time;
        record.ramp_in_time = self.ramp_in_time;
        record.pos_corr_gain = self.pos_corr_gain;
    }
}

/// Settings of the management connection and of the start/stop signalling.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ManagementConfig {
    /// Settling delay after each handshake step \[s\].
    pub delay_time: f64,
    /// Maximum number of attempts for the start and stop signals.
    pub max_signal_retries: u32,
    /// Maximum time to wait for a response of the controller \[s\].
    pub response_timeout: f64,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        ManagementConfig {
            delay_time: 1.0,
            max_signal_retries: 5,
            response_timeout: 5.0,
        }
    }
}

impl ManagementConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_time)
    }
    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.response_timeout)
    }
}

/// Settings of the two cyclic motion channels.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MotionConfig {
    /// UDP port of the left arm. The right arm uses `base_port + 1`.
    pub base_port: u16,
    /// Number of worker threads shared by both channels. The receive job of each arm occupies
    /// one worker for the whole session, so at least [`MIN_IO_THREADS`] are needed.
    pub io_threads: usize,
    /// Number of axes per arm which are exchanged with the controller.
    pub axes: Axes,
    /// Send speed values in the command frames.
    pub use_speed: bool,
    /// Log every received and sent frame at trace level.
    pub use_logging: bool,
}

impl Default for MotionConfig {
    fn default() -> Self {
        MotionConfig {
            base_port: 6510,
            io_threads: 4,
            axes: Axes::Seven,
            use_speed: true,
            use_logging: true,
        }
    }
}

/// Settings of the velocity estimation of the hardware adapter.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FilterConfig {
    /// Weight of the newest raw velocity sample in the exponential smoothing.
    pub exponential_smoothing_alpha: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            exponential_smoothing_alpha: 0.2,
        }
    }
}

/// Complete driver configuration.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct DriverConfig {
    pub session: SessionConfig,
    pub management: ManagementConfig,
    pub motion: MotionConfig,
    pub filter: FilterConfig,
}

impl DriverConfig {
    /// Loads and validates a configuration file.
    /// # Errors
    /// * [`ConfigException`](`crate::exception::YumiException::ConfigException`) if the file
    /// can not be read, parsed or contains invalid values.
    pub fn load(path: &Path) -> YumiResult<DriverConfig> {
        let content =
            std::fs::read_to_string(path).map_err(|e| YumiException::ConfigException {
                message: format!("failed to read {}: {}", path.display(), e),
            })?;
        DriverConfig::from_toml_str(&content)
    }

    /// Parses and validates a configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> YumiResult<DriverConfig> {
        let config: DriverConfig =
            toml::from_str(content).map_err(|e| YumiException::ConfigException {
                message: format!("config parse error: {}", e),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the bounds of all parameters.
    pub fn validate(&self) -> YumiResult<()> {
        let invalid = |message: &str| {
            Err(YumiException::ConfigException {
                message: format!("config validation: {}", message),
            })
        };
        if !(self.session.comm_timeout.is_finite() && self.session.comm_timeout > 0.) {
            return invalid("session.comm_timeout must be positive");
        }
        if self.session.tool_name.is_empty() || self.session.wobj_name.is_empty() {
            return invalid("session.tool_name and session.wobj_name must not be empty");
        }
        if !(self.management.delay_time.is_finite() && self.management.delay_time >= 0.) {
            return invalid("management.delay_time must not be negative");
        }
        if self.management.max_signal_retries == 0 {
            return invalid("management.max_signal_retries must be at least 1");
        }
        if !(self.management.response_timeout.is_finite() && self.management.response_timeout > 0.)
        {
            return invalid("management.response_timeout must be positive");
        }
        if self.motion.base_port == u16::MAX {
            return invalid("motion.base_port leaves no port for the right arm");
        }
        if self.motion.io_threads < MIN_IO_THREADS {
            return invalid("motion.io_threads must be at least 3");
        }
        let alpha = self.filter.exponential_smoothing_alpha;
        if !(alpha > 0. && alpha <= 1.) {
            return invalid("filter.exponential_smoothing_alpha must be in (0, 1]");
        }
        Ok(())
    }
}
