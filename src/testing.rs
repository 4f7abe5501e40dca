// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Host-side stand-ins for the board hardware, used by the unit tests.

use std::collections::VecDeque;
use std::vec::Vec;

use crate::drivers::stepper::{Direction, StepperIo};
use crate::drivers::tmc2208::{crc8, reg, DriverUart, MASTER_ADDR, SYNC};

/// One recorded STEP/DIR/EN operation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IoEvent {
    Dir(Direction),
    Step,
    Enable(bool),
}

/// `StepperIo` that records everything it is asked to do.
#[derive(Default)]
pub struct MockIo {
    pub events: Vec<IoEvent>,
    pub enabled: bool,
}

impl MockIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> usize {
        self.events.iter().filter(|e| **e == IoEvent::Step).count()
    }

    /// Direction in force for every recorded step, in order.
    pub fn step_directions(&self) -> Vec<Direction> {
        let mut dir = None;
        let mut out = Vec::new();
        for e in &self.events {
            match e {
                IoEvent::Dir(d) => dir = Some(*d),
                IoEvent::Step => out.push(dir.expect("step before any DIR")),
                IoEvent::Enable(_) => {}
            }
        }
        out
    }
}

impl StepperIo for MockIo {
    fn set_direction(&mut self, dir: Direction) {
        self.events.push(IoEvent::Dir(dir));
    }

    fn step(&mut self) {
        assert!(self.enabled, "STEP pulse on a disabled axis");
        self.events.push(IoEvent::Step);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.events.push(IoEvent::Enable(enabled));
    }
}

/// Receive error reported by [`MockTmc`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MockUartError {
    Overrun,
}

/// Register-file emulation of a TMC2208 on the far end of a single-wire UART.
///
/// The receiver is a single data register like the MCU's. One byte arrives per byte written and
/// per poll of an empty register; a byte arriving while the register is full is lost and flags
/// an overrun.
pub struct MockTmc {
    regs: [u32; 128],
    ifcnt: u8,
    /// Bytes still travelling towards the receiver.
    wire: VecDeque<u8>,
    rdr: Option<u8>,
    overrun: bool,
    pending: Vec<u8>,
    sent: Vec<u8>,
    /// Reflect every transmitted byte back on RX, as the single-wire wiring does.
    pub echo: bool,
    /// Never answer read requests.
    pub silent: bool,
    /// Flip the CRC of every reply.
    pub corrupt_crc: bool,
    /// Accept write datagrams on the wire but do not apply them (or count them).
    pub ignore_writes: bool,
}

impl MockTmc {
    pub fn new() -> Self {
        Self {
            regs: [0; 128],
            ifcnt: 0,
            wire: VecDeque::new(),
            rdr: None,
            overrun: false,
            pending: Vec::new(),
            sent: Vec::new(),
            echo: true,
            silent: false,
            corrupt_crc: false,
            ignore_writes: false,
        }
    }

    pub fn reg(&self, addr: u8) -> u32 {
        self.regs[addr as usize & 0x7F]
    }

    pub fn set_reg(&mut self, addr: u8, value: u32) {
        self.regs[addr as usize & 0x7F] = value;
    }

    /// Every byte the driver has transmitted.
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// The receiver has lost bytes and not reported it yet.
    pub fn overrun_pending(&self) -> bool {
        self.overrun
    }

    fn deliver(&mut self) {
        if let Some(byte) = self.wire.pop_front() {
            if self.rdr.is_some() {
                self.overrun = true;
            } else {
                self.rdr = Some(byte);
            }
        }
    }

    fn datagram(&mut self) {
        let frame = core::mem::take(&mut self.pending);
        if crc8(&frame[..frame.len() - 1]) != frame[frame.len() - 1] {
            return;
        }

        let addr = frame[2] & 0x7F;
        if frame.len() == 8 {
            if self.ignore_writes {
                return;
            }
            let value = u32::from_be_bytes([frame[3], frame[4], frame[5], frame[6]]);
            if addr == reg::GSTAT {
                // write one to clear
                self.regs[addr as usize] &= !value;
            } else {
                self.regs[addr as usize] = value;
            }
            self.ifcnt = self.ifcnt.wrapping_add(1);
            return;
        }

        if self.silent {
            return;
        }
        let value = if addr == reg::IFCNT {
            self.ifcnt as u32
        } else {
            self.regs[addr as usize]
        };
        let d = value.to_be_bytes();
        let mut reply = [SYNC, MASTER_ADDR, addr, d[0], d[1], d[2], d[3], 0];
        reply[7] = crc8(&reply[..7]);
        if self.corrupt_crc {
            reply[7] ^= 0xFF;
        }
        self.wire.extend(reply);
    }
}

impl DriverUart for MockTmc {
    type Error = MockUartError;

    fn write_byte(&mut self, byte: u8) -> nb::Result<(), MockUartError> {
        self.sent.push(byte);
        if self.echo {
            self.wire.push_back(byte);
        }
        self.deliver();

        if self.pending.is_empty() && byte != SYNC {
            return Ok(());
        }
        self.pending.push(byte);

        if self.pending.len() >= 3 {
            let need = if self.pending[2] & 0x80 != 0 { 8 } else { 4 };
            if self.pending.len() == need {
                self.datagram();
            }
        }
        Ok(())
    }

    fn read_byte(&mut self) -> nb::Result<u8, MockUartError> {
        if self.overrun {
            self.overrun = false;
            return Err(nb::Error::Other(MockUartError::Overrun));
        }
        if self.rdr.is_none() {
            self.deliver();
        }
        self.rdr.take().ok_or(nb::Error::WouldBlock)
    }

    fn is_overrun(error: &MockUartError) -> bool {
        *error == MockUartError::Overrun
    }
}
