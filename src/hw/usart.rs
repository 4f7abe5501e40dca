// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! USART abstraction layer.
//!
//! - `HostLink` carries the line protocol to the tracking host. Reads never block; writes block
//!   per byte, which is short at the host baud rate.
//! - `MotorUart` is the byte pipe under a TMC2208 driver.
//!
//! To talk to the rotator from a host machine, point `rotctl` at the serial port, or use
//! ```text
//! $ screen /dev/ttyUSB0 19200
//! ```

use core::fmt;
use nb::block;

use stm32f7xx_hal::{
    prelude::*,
    serial::{self, Instance, Pins, Rx, Serial, Tx},
};

use crate::drivers::tmc2208::DriverUart;

pub struct HostLink<U: Instance> {
    tx: Tx<U>,
    rx: Rx<U>,
}

impl<U: Instance> HostLink<U> {
    pub fn new<PINS: Pins<U>>(serial: Serial<U, PINS>) -> Self {
        let (tx, rx) = serial.split();
        Self { tx, rx }
    }

    /// Next received byte, if one is waiting. Receive errors drop the byte.
    #[inline]
    pub fn poll_byte(&mut self) -> Option<u8> {
        self.rx.read().ok()
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_byte(b);
        }
    }

    /// Block until the hardware TX FIFO/drain is flushed.
    #[inline]
    pub fn flush(&mut self) {
        let _ = block!(self.tx.flush());
    }
}

// Implement `core::fmt::Write` so responses can be formatted straight onto the link.
impl<U: Instance> fmt::Write for HostLink<U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        HostLink::write_str(self, s);
        Ok(())
    }
}

/// Error type for `MotorUart`.
#[derive(Debug)]
pub enum MotorUartError {
    Rx(serial::Error),
    Tx,
}

/// Serial port wired to one TMC2208 PDN_UART pin.
pub struct MotorUart<U: Instance> {
    tx: Tx<U>,
    rx: Rx<U>,
}

impl<U: Instance> MotorUart<U> {
    pub fn new<PINS: Pins<U>>(serial: Serial<U, PINS>) -> Self {
        let (tx, rx) = serial.split();
        Self { tx, rx }
    }
}

impl<U: Instance> DriverUart for MotorUart<U> {
    type Error = MotorUartError;

    fn write_byte(&mut self, byte: u8) -> nb::Result<(), MotorUartError> {
        self.tx.write(byte).map_err(|e| match e {
            nb::Error::WouldBlock => nb::Error::WouldBlock,
            nb::Error::Other(_) => nb::Error::Other(MotorUartError::Tx),
        })
    }

    fn read_byte(&mut self) -> nb::Result<u8, MotorUartError> {
        self.rx.read().map_err(|e| match e {
            nb::Error::WouldBlock => nb::Error::WouldBlock,
            nb::Error::Other(e) => nb::Error::Other(MotorUartError::Rx(e)),
        })
    }

    // The single-wire echo overruns the data register while a datagram is sent.
    fn is_overrun(error: &MotorUartError) -> bool {
        matches!(error, MotorUartError::Rx(serial::Error::Overrun))
    }
}
