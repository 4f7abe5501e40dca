// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Axis Abstractions
//!
//! This module contains axis-level models that sit between the protocol's angles and the step
//! counts the drivers work in.
//!
//! ## Modules
//!
//! - [`axis`] - Degrees/microsteps conversion and range limits for one axis.

pub mod axis;

pub use axis::{AxisId, AxisModel};
