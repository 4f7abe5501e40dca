// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Device-Specific Drivers
//!
//! This module contains device-specific drivers that sit above the raw `hw/` layer and below the
//! application logic. Everything here is generic over small hardware traits, so it builds and
//! tests on the host.
//!
//! ## Existing drivers
//!
//! - [`tmc2208`] – Trinamic TMC2208 stepper driver over single-wire UART
//! - [`stepper`] – STEP/DIR/EN stepper axis with position counter, fault latching and idle handling

pub mod stepper;
pub mod tmc2208;

pub use stepper::{AxisDriver, AxisEvent, Direction, FaultKind, StepCounter, StepperIo};
pub use tmc2208::{DriverUart, Tmc2208};
