// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Host-link messages and responses.
//!
//! The host speaks a line-oriented subset of the Hamlib `rotctld` protocol. Every request line
//! becomes one [`ProtocolMessage`]; every message is answered by exactly one [`Response`] line.

use core::fmt;

use crate::config::MAX_LINE_LEN;
use crate::error::{Error, RPRT_EPROTO};

/// Raw bytes of one host line, terminator excluded.
pub type Line = heapless::Vec<u8, MAX_LINE_LEN>;

/// Identification string sent in reply to `GetInfo`.
pub const INFO: &str = concat!("SatTracker rotator ", env!("CARGO_PKG_VERSION"));

/// One parsed host request.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolMessage {
    /// Move to azimuth/elevation, in degrees.
    SetPosition { azimuth: f32, elevation: f32 },
    GetPosition,
    Stop,
    /// Clear latched driver faults.
    Reset,
    GetInfo,
    /// Line that is not a valid request, or was too long.
    Malformed { raw: Line },
}

impl ProtocolMessage {
    /// Malformed message holding (up to `MAX_LINE_LEN` bytes of) `line`.
    pub fn malformed(line: &[u8]) -> Self {
        let raw = Line::from_slice(&line[..line.len().min(MAX_LINE_LEN)]).unwrap_or_default();
        ProtocolMessage::Malformed { raw }
    }
}

/// One response line.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    Position { azimuth: f32, elevation: f32 },
    /// `RPRT 0`
    Ok,
    /// `RPRT <code>`, negative Hamlib error code.
    Error(i32),
    Info(&'static str),
}

impl Response {
    pub const MALFORMED: Response = Response::Error(RPRT_EPROTO);
}

impl From<Result<(), Error>> for Response {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => Response::Ok,
            Err(e) => Response::Error(e.code()),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Position { azimuth, elevation } => {
                writeln!(f, "{:.2} {:.2}", azimuth, elevation)
            }
            Response::Ok => f.write_str("RPRT 0\n"),
            Response::Error(code) => writeln!(f, "RPRT {}", code),
            Response::Info(info) => writeln!(f, "{}", info),
        }
    }
}
