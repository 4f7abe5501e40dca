// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Host-link protocol: line framing, request parsing and response formatting.

pub mod messages;
pub mod parser;

pub use messages::{ProtocolMessage, Response};
pub use parser::ProtocolEngine;
