// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Controller-level errors and their host-link response codes.

use core::fmt;

use crate::config::ConfigError;
use crate::drivers::stepper::FaultKind;
use crate::motors::AxisId;

/// Hamlib `RIG_EINVAL`: invalid parameter or angle out of range.
pub const RPRT_EINVAL: i32 = -1;
/// Hamlib `RIG_ECONF`: invalid configuration.
pub const RPRT_ECONF: i32 = -2;
/// Hamlib `RIG_EIO`: I/O error on a motor driver.
pub const RPRT_EIO: i32 = -6;
/// Hamlib `RIG_EPROTO`: malformed request.
pub const RPRT_EPROTO: i32 = -8;

#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Requested angle outside the axis limits. Nothing moved.
    OutOfRange { axis: AxisId, angle: f32 },
    /// Host line could not be parsed.
    Malformed,
    /// Axis driver reported a fault, or its UART link failed. Latched until reset.
    DriverFault { axis: AxisId, fault: FaultKind },
    /// Startup configuration rejected.
    Configuration(ConfigError),
}

impl Error {
    /// Code sent back as `RPRT <code>`.
    pub fn code(&self) -> i32 {
        match self {
            Error::OutOfRange { .. } => RPRT_EINVAL,
            Error::Malformed => RPRT_EPROTO,
            Error::DriverFault { .. } => RPRT_EIO,
            Error::Configuration(_) => RPRT_ECONF,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Configuration(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfRange { axis, angle } => {
                write!(f, "{} angle {} out of range", axis, angle)
            }
            Error::Malformed => f.write_str("malformed command"),
            Error::DriverFault { axis, fault } => write!(f, "{} driver fault: {}", axis, fault),
            Error::Configuration(e) => write!(f, "configuration error: {}", e),
        }
    }
}
