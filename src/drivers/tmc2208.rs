// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! TMC2208 single-wire UART stepper driver.
//!
//! This module handles datagram framing, CRC and register access for the TMC2208, plus encoding
//! of the configuration registers the rotator uses. STEP/DIR/EN are discrete pins and live in
//! [`crate::drivers::stepper`].
//!
//! Datagrams are 8 bytes for a write and 4 bytes for a read request:
//!
//! ```text
//! write: 0x05 | slave | addr|0x80 | d31..d24 | d23..d16 | d15..d8 | d7..d0 | crc
//! read:  0x05 | slave | addr      | crc
//! reply: 0x05 | 0xFF  | addr      | d31..d24 | d23..d16 | d15..d8 | d7..d0 | crc
//! ```
//!
//! With the usual single-wire wiring every transmitted byte is echoed back on RX. Nothing reads
//! the echo while a datagram goes out, so the receiver usually overruns. Replies are located by
//! their `0x05 0xFF` header, and echo bytes and overruns ahead of it are skipped.

use core::f32::consts::SQRT_2;

use crate::config::{ChopperTiming, DriverConfig, R_SENSE_INTERNAL, VFS_HIGH, VFS_LOW};

// Register addresses
pub mod reg {
    pub const GCONF: u8 = 0x00;
    pub const GSTAT: u8 = 0x01;
    pub const IFCNT: u8 = 0x02;
    pub const IHOLD_IRUN: u8 = 0x10;
    pub const TPOWERDOWN: u8 = 0x11;
    pub const CHOPCONF: u8 = 0x6C;
    pub const DRV_STATUS: u8 = 0x6F;
}

/// Sync nibble (plus reserved bits) starting every datagram.
pub const SYNC: u8 = 0x05;

/// Address the driver uses for its replies.
pub const MASTER_ADDR: u8 = 0xFF;

const WRITE_FLAG: u8 = 0x80;

/// Receiver polls per byte before a read is declared timed out.
const READ_SPIN_LIMIT: u32 = 100_000;

/// Bytes scanned for a reply header before giving up. Covers the echoed request.
const REPLY_SCAN_LIMIT: usize = 16;

/// Most bytes or errors `clear_rx` takes off a receiver that keeps producing them.
const CLEAR_RX_LIMIT: usize = 32;

/// TPOWERDOWN unit: 2^18 clocks of the 12 MHz internal oscillator, in microseconds.
const TPOWERDOWN_UNIT_US: u32 = 21_845;

/// IHOLDDELAY written alongside the currents.
const IHOLD_DELAY: u8 = 1;

/// CHOPCONF.TBL: 24 clocks.
const BLANK_TIME: u32 = 0b01;

/// Byte-wise access to the UART wired to one driver.
///
/// Implemented once per board for the MCU's serial peripheral.
pub trait DriverUart {
    type Error: core::fmt::Debug;

    fn write_byte(&mut self, byte: u8) -> nb::Result<(), Self::Error>;

    fn read_byte(&mut self) -> nb::Result<u8, Self::Error>;

    /// True if `error` only means received bytes were lost. The link itself is still usable.
    fn is_overrun(error: &Self::Error) -> bool {
        let _ = error;
        false
    }

    /// Drop whatever is sitting in the receiver, along with any pending receive error.
    fn clear_rx(&mut self) {
        for _ in 0..CLEAR_RX_LIMIT {
            if let Err(nb::Error::WouldBlock) = self.read_byte() {
                break;
            }
        }
    }
}

/// Error type for `Tmc2208` operations.
#[derive(Debug, PartialEq)]
pub enum Error<E> {
    /// Underlying UART error.
    Uart(E),
    /// No reply within the receive budget.
    Timeout,
    /// Reply CRC mismatch.
    Crc,
    /// Reply for a different register, or no reply header found.
    UnexpectedReply,
    /// Interface counter did not advance by the number of writes sent.
    NotAcknowledged,
}

/// CRC-8 (polynomial 0x07) over bytes shifted in LSB first, as defined for TMC22xx UART.
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in bytes {
        let mut b = byte;
        for _ in 0..8 {
            if ((crc >> 7) ^ (b & 0x01)) != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
            b >>= 1;
        }
    }
    crc
}

/// DRV_STATUS register.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrvStatus {
    raw: u32,
}

impl DrvStatus {
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    #[inline]
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Overtemperature pre-warning.
    #[inline]
    pub fn otpw(&self) -> bool {
        (self.raw & (1 << 0)) != 0
    }

    /// Overtemperature shutdown.
    #[inline]
    pub fn ot(&self) -> bool {
        (self.raw & (1 << 1)) != 0
    }

    /// Short to ground on phase A.
    #[inline]
    pub fn s2ga(&self) -> bool {
        (self.raw & (1 << 2)) != 0
    }

    /// Short to ground on phase B.
    #[inline]
    pub fn s2gb(&self) -> bool {
        (self.raw & (1 << 3)) != 0
    }

    /// Low-side short on phase A.
    #[inline]
    pub fn s2vsa(&self) -> bool {
        (self.raw & (1 << 4)) != 0
    }

    /// Low-side short on phase B.
    #[inline]
    pub fn s2vsb(&self) -> bool {
        (self.raw & (1 << 5)) != 0
    }

    /// Open load on phase A.
    #[inline]
    pub fn ola(&self) -> bool {
        (self.raw & (1 << 6)) != 0
    }

    /// Open load on phase B.
    #[inline]
    pub fn olb(&self) -> bool {
        (self.raw & (1 << 7)) != 0
    }

    /// Actual current scaling (0..=31).
    #[inline]
    pub fn cs_actual(&self) -> u8 {
        ((self.raw >> 16) & 0x1F) as u8
    }

    /// Driver is running in StealthChop.
    #[inline]
    pub fn stealth(&self) -> bool {
        (self.raw & (1 << 30)) != 0
    }

    /// Standstill detected.
    #[inline]
    pub fn stst(&self) -> bool {
        (self.raw & (1 << 31)) != 0
    }
}

/// Current scale values derived from an RMS current request.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CurrentSetting {
    pub irun: u8,
    pub ihold: u8,
    /// High-sensitivity (low full-scale voltage) sense range.
    pub vsense: bool,
}

impl CurrentSetting {
    /// Pick the current scale for `run_ma` mA RMS through an `r_sense` ohm shunt. The low
    /// full-scale range is used when it gives better resolution.
    pub fn from_rms(run_ma: u16, hold_multiplier: f32, r_sense: f32) -> Self {
        let scale = 32.0 * SQRT_2 * (run_ma as f32 / 1000.0) * (r_sense + R_SENSE_INTERNAL);

        let mut vsense = false;
        let mut cs = scale / VFS_HIGH - 1.0;
        if cs < 16.0 {
            vsense = true;
            cs = scale / VFS_LOW - 1.0;
        }

        let irun = cs.clamp(0.0, 31.0) as u8;
        let ihold = (irun as f32 * hold_multiplier).clamp(0.0, 31.0) as u8;

        Self {
            irun,
            ihold,
            vsense,
        }
    }

    /// RMS current (mA) the driver actually regulates to for `irun`.
    pub fn run_current_ma(&self, r_sense: f32) -> f32 {
        let vfs = if self.vsense { VFS_LOW } else { VFS_HIGH };
        (self.irun as f32 + 1.0) / 32.0 * vfs / (r_sense + R_SENSE_INTERNAL) / SQRT_2 * 1000.0
    }
}

/// MRES field value for a microstep factor (256 → 0 ... 1 → 8).
#[inline]
pub fn mres(microsteps: u16) -> u8 {
    8u8.saturating_sub(microsteps.trailing_zeros() as u8)
}

/// GCONF: UART-controlled current and microstep resolution, StealthChop unless disabled.
pub fn gconf(cfg: &DriverConfig) -> u32 {
    let mut value: u32 = 0;

    // en_spreadcycle
    if !cfg.stealthchop {
        value |= 1 << 2;
    }
    // shaft
    if cfg.invert_direction {
        value |= 1 << 3;
    }
    // pdn_disable: PDN_UART is used for UART only
    value |= 1 << 6;
    // mstep_reg_select: MRES comes from CHOPCONF
    value |= 1 << 7;
    // multistep_filt
    value |= 1 << 8;

    value
}

/// CHOPCONF with the given chopper timing, microstep resolution and sense range.
pub fn chopconf(timing: &ChopperTiming, microsteps: u16, vsense: bool) -> u32 {
    let mut value: u32 = 0;

    value |= (timing.toff as u32) & 0x0F;
    value |= ((timing.hstrt.saturating_sub(1) as u32) & 0x07) << 4;
    value |= (((timing.hend + 3) as u32) & 0x0F) << 7;
    value |= BLANK_TIME << 15;
    if vsense {
        value |= 1 << 17;
    }
    value |= ((mres(microsteps) as u32) & 0x0F) << 24;
    // intpol: interpolate to 256 microsteps
    value |= 1 << 28;

    value
}

/// IHOLD_IRUN register value.
#[inline]
pub fn ihold_irun(current: &CurrentSetting) -> u32 {
    (current.ihold as u32 & 0x1F)
        | ((current.irun as u32 & 0x1F) << 8)
        | ((IHOLD_DELAY as u32 & 0x0F) << 16)
}

/// TPOWERDOWN value for a standstill-to-hold delay, within the register's 2..=255 range.
#[inline]
pub fn tpowerdown(delay_us: u32) -> u8 {
    (delay_us / TPOWERDOWN_UNIT_US).clamp(2, 255) as u8
}

/// TMC2208 driver bound to one UART.
pub struct Tmc2208<U> {
    uart: U,
    slave_addr: u8,
}

impl<U: DriverUart> Tmc2208<U> {
    /// The TMC2208 has a fixed slave address of 0.
    pub fn new(uart: U) -> Self {
        Self {
            uart,
            slave_addr: 0,
        }
    }

    /// Release the UART.
    pub fn free(self) -> U {
        self.uart
    }

    #[inline]
    pub fn uart(&self) -> &U {
        &self.uart
    }

    #[inline]
    pub fn uart_mut(&mut self) -> &mut U {
        &mut self.uart
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error<U::Error>> {
        for &b in bytes {
            nb::block!(self.uart.write_byte(b)).map_err(Error::Uart)?;
        }
        Ok(())
    }

    fn recv(&mut self) -> Result<u8, Error<U::Error>> {
        for _ in 0..READ_SPIN_LIMIT {
            match self.uart.read_byte() {
                Ok(b) => return Ok(b),
                Err(nb::Error::WouldBlock) => core::hint::spin_loop(),
                Err(nb::Error::Other(e)) => return Err(Error::Uart(e)),
            }
        }
        Err(Error::Timeout)
    }

    /// Write a 32-bit register.
    pub fn write_reg(&mut self, addr: u8, value: u32) -> Result<(), Error<U::Error>> {
        let d = value.to_be_bytes();
        let mut frame = [
            SYNC,
            self.slave_addr,
            (addr & 0x7F) | WRITE_FLAG,
            d[0],
            d[1],
            d[2],
            d[3],
            0,
        ];
        frame[7] = crc8(&frame[..7]);
        self.send(&frame)
    }

    /// Read a 32-bit register.
    pub fn read_reg(&mut self, addr: u8) -> Result<u32, Error<U::Error>> {
        let addr = addr & 0x7F;

        self.uart.clear_rx();

        let mut request = [SYNC, self.slave_addr, addr, 0];
        request[3] = crc8(&request[..3]);
        self.send(&request)?;

        // Skip the echo until the reply header shows up.
        let mut prev = 0u8;
        let mut scanned = 0;
        loop {
            let b = match self.recv() {
                Ok(b) => Some(b),
                Err(Error::Uart(e)) if U::is_overrun(&e) => None,
                Err(e) => return Err(e),
            };
            if prev == SYNC && b == Some(MASTER_ADDR) {
                break;
            }
            scanned += 1;
            if scanned > REPLY_SCAN_LIMIT {
                return Err(Error::UnexpectedReply);
            }
            // A lost byte breaks any header in progress.
            prev = b.unwrap_or(0);
        }

        let mut reply = [SYNC, MASTER_ADDR, 0, 0, 0, 0, 0, 0];
        for slot in reply[2..].iter_mut() {
            *slot = self.recv()?;
        }

        if crc8(&reply[..7]) != reply[7] {
            return Err(Error::Crc);
        }
        if reply[2] != addr {
            return Err(Error::UnexpectedReply);
        }

        Ok(u32::from_be_bytes([reply[3], reply[4], reply[5], reply[6]]))
    }

    /// Interface transmission counter, incremented by the chip on every accepted write.
    pub fn read_ifcnt(&mut self) -> Result<u8, Error<U::Error>> {
        Ok((self.read_reg(reg::IFCNT)? & 0xFF) as u8)
    }

    pub fn read_drv_status(&mut self) -> Result<DrvStatus, Error<U::Error>> {
        Ok(DrvStatus {
            raw: self.read_reg(reg::DRV_STATUS)?,
        })
    }

    /// Program the driver for operation and verify every write was accepted.
    ///
    /// - GCONF: UART current control, register microstep resolution, chopper mode, direction
    /// - IHOLD_IRUN: run and hold current
    /// - TPOWERDOWN: standstill delay before dropping to hold current
    /// - CHOPCONF: chopper timing, sense range, microsteps
    pub fn configure(
        &mut self,
        cfg: &DriverConfig,
        microsteps: u16,
        r_sense: f32,
        hold_delay_us: u32,
    ) -> Result<CurrentSetting, Error<U::Error>> {
        let current = CurrentSetting::from_rms(cfg.run_current_ma, cfg.hold_multiplier, r_sense);

        let before = self.read_ifcnt()?;

        let writes: [(u8, u32); 5] = [
            // write-one-to-clear: reset, drv_err, uv_cp
            (reg::GSTAT, 0b111),
            (reg::GCONF, gconf(cfg)),
            (reg::IHOLD_IRUN, ihold_irun(&current)),
            (reg::TPOWERDOWN, tpowerdown(hold_delay_us) as u32),
            (reg::CHOPCONF, chopconf(&cfg.chopper, microsteps, current.vsense)),
        ];
        for (addr, value) in writes {
            self.write_reg(addr, value)?;
        }

        let after = self.read_ifcnt()?;
        if after.wrapping_sub(before) as usize != writes.len() {
            return Err(Error::NotAcknowledged);
        }

        Ok(current)
    }
}
