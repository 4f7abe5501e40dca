// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # MCU-Level Wrappers
//!
//! Thin layers over `stm32f7xx-hal` that implement the crate's hardware traits for the
//! STM32F777 board. Only built for the target.

pub mod clock;
pub mod pins;
pub mod usart;

pub use clock::MicrosClock;
pub use pins::{BoardPins, OutPin};
pub use usart::{HostLink, MotorUart};
