// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # SatTracker Firmware
//!
//! This crate contains the firmware for the SatTracker azimuth/elevation antenna rotator, written
//! in Rust, targeting an STM32F777 MCU driving two steppers through TMC2208 drivers. A tracking
//! host (Hamlib `rotctl`/`rotctld` or anything speaking the same line protocol) sends pointing
//! requests over a serial link.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`config`] | Deployment configuration and validation |
//! | [`motors`] | Angle/step unit model of each axis |
//! | [`drivers`] | TMC2208 UART driver, STEP/DIR/EN axis driver |
//! | [`control`] | Trapezoidal profiles and the two-axis rotator controller |
//! | [`protocol`] | Host-link line framing, request parsing, responses |
//! | `hw` | MCU-level wrappers around USART, GPIO and timers (target only) |
//!
//! Everything outside `hw` is hardware-independent and unit-tested on the host.
//!
//! ## Getting Started
//!
//! Build docs:
//!
//! ```bash
//! cargo doc --no-deps --open
//! ```
//!
//! Run the unit tests on the host:
//!
//! ```bash
//! cargo test --lib
//! ```
//!
//! Flash the board (with RTT logging):
//!
//! ```bash
//! cargo run --release --target thumbv7em-none-eabihf --features defmt
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

// Must come first so the logging macros are visible to every module below.
#[macro_use]
mod fmt;

pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod motors;
pub mod protocol;
pub mod time;

#[cfg(target_os = "none")]
pub mod hw;

#[cfg(test)]
mod testing;

pub use error::Error;
