// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Control Algorithms
//!
//! Motion planning and the top-level rotator state machine.
//!
//! ## Modules
//!
//! - [`profile`] - Trapezoidal step-interval profiles.
//! - [`rotator`] - Two-axis controller driven by host messages and a microsecond tick.

pub mod profile;
pub mod rotator;

pub use profile::{MotionProfiler, MotionSegment};
pub use rotator::{AxisState, RotatorController};
