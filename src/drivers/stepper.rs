// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! STEP/DIR/EN stepper axis with a TMC2208 on its UART.
//!
//! [`AxisDriver`] executes one [`MotionSegment`] at a time without blocking: every call to
//! [`AxisDriver::poll`] emits at most one STEP pulse, when the next one is due on the microsecond
//! timer. The absolute microstep position lives in a [`StepCounter`] that other code can read at
//! any time.
//!
//! Driver faults (DRV_STATUS over-temperature or shorts, or a dead UART link) are latched: the
//! axis is disabled and refuses new moves until [`AxisDriver::clear_fault`] re-initializes the
//! chip.

use core::fmt;
use core::sync::atomic::{AtomicI32, Ordering};

use embedded_hal::digital::OutputPin;

use crate::config::{AxisConfig, DriverConfig, IdlePolicy};
use crate::control::profile::MotionSegment;
use crate::drivers::tmc2208::{self, CurrentSetting, DriverUart, DrvStatus, Tmc2208};
use crate::time::{elapsed, is_due};

/// Rotation sense of the motor shaft. Forward counts steps up.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    /// Step counter increment for one pulse.
    #[inline]
    pub fn sign(self) -> i32 {
        match self {
            Direction::Forward => 1,
            Direction::Reverse => -1,
        }
    }
}

/// Discrete STEP/DIR/EN outputs of one axis.
pub trait StepperIo {
    fn set_direction(&mut self, dir: Direction);

    /// Emit one complete STEP pulse.
    fn step(&mut self);

    fn set_enabled(&mut self, enabled: bool);
}

/// [`StepperIo`] over three GPIO outputs. EN is active low, as on TMC2208 carrier boards.
pub struct PinStepper<S, D, E> {
    step: S,
    dir: D,
    en: E,
    /// Busy-wait iterations the STEP line is held high.
    pulse_spin: u32,
}

impl<S: OutputPin, D: OutputPin, E: OutputPin> PinStepper<S, D, E> {
    /// Create the outputs with the axis disabled and STEP low.
    pub fn new(mut step: S, dir: D, mut en: E, pulse_spin: u32) -> Self {
        step.set_low().ok();
        en.set_high().ok();
        Self {
            step,
            dir,
            en,
            pulse_spin,
        }
    }

    pub fn free(self) -> (S, D, E) {
        (self.step, self.dir, self.en)
    }
}

impl<S: OutputPin, D: OutputPin, E: OutputPin> StepperIo for PinStepper<S, D, E> {
    fn set_direction(&mut self, dir: Direction) {
        match dir {
            Direction::Forward => self.dir.set_low().ok(),
            Direction::Reverse => self.dir.set_high().ok(),
        };
    }

    fn step(&mut self) {
        self.step.set_high().ok();
        for _ in 0..self.pulse_spin {
            core::hint::spin_loop();
        }
        self.step.set_low().ok();
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.en.set_low().ok();
        } else {
            self.en.set_high().ok();
        }
    }
}

/// Absolute microstep position of one axis.
///
/// Written only by the owning [`AxisDriver`]; any number of readers may take snapshots.
#[derive(Debug)]
pub struct StepCounter(AtomicI32);

impl StepCounter {
    pub const fn new(steps: i32) -> Self {
        Self(AtomicI32::new(steps))
    }

    /// Last completed step.
    #[inline]
    pub fn get(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    // Single writer, so load + store cannot lose an update.
    #[inline]
    fn advance(&self, delta: i32) {
        let steps = self.0.load(Ordering::Relaxed);
        self.0.store(steps.wrapping_add(delta), Ordering::Release);
    }
}

/// Why the driver UART link failed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    Uart,
    Timeout,
    Crc,
    UnexpectedReply,
    NotAcknowledged,
}

impl<E> From<tmc2208::Error<E>> for LinkError {
    fn from(e: tmc2208::Error<E>) -> Self {
        match e {
            tmc2208::Error::Uart(_) => LinkError::Uart,
            tmc2208::Error::Timeout => LinkError::Timeout,
            tmc2208::Error::Crc => LinkError::Crc,
            tmc2208::Error::UnexpectedReply => LinkError::UnexpectedReply,
            tmc2208::Error::NotAcknowledged => LinkError::NotAcknowledged,
        }
    }
}

/// Latched axis fault.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    OverTemperature,
    ShortToGround,
    ShortToSupply,
    Link(LinkError),
}

impl FaultKind {
    /// Fault reported in a DRV_STATUS readout, if any.
    pub fn from_status(status: &DrvStatus) -> Option<FaultKind> {
        if status.ot() {
            Some(FaultKind::OverTemperature)
        } else if status.s2ga() || status.s2gb() {
            Some(FaultKind::ShortToGround)
        } else if status.s2vsa() || status.s2vsb() {
            Some(FaultKind::ShortToSupply)
        } else {
            None
        }
    }
}

impl<E> From<tmc2208::Error<E>> for FaultKind {
    fn from(e: tmc2208::Error<E>) -> Self {
        FaultKind::Link(e.into())
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultKind::OverTemperature => f.write_str("over-temperature"),
            FaultKind::ShortToGround => f.write_str("short to ground"),
            FaultKind::ShortToSupply => f.write_str("short to supply"),
            FaultKind::Link(e) => write!(f, "UART link {:?}", e),
        }
    }
}

/// Everything [`AxisDriver::initialize`] needs to program the chip.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DriverSetup {
    pub driver: DriverConfig,
    pub microsteps: u16,
    pub r_sense_ohm: f32,
    pub idle_timeout_us: u32,
    pub idle_policy: IdlePolicy,
}

impl DriverSetup {
    pub fn from_axis(cfg: &AxisConfig, r_sense_ohm: f32) -> Self {
        Self {
            driver: cfg.driver,
            microsteps: cfg.microsteps,
            r_sense_ohm,
            idle_timeout_us: cfg.idle_timeout_us,
            idle_policy: cfg.idle_policy,
        }
    }
}

/// Result of one [`AxisDriver::poll`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisEvent {
    /// Nothing was due.
    None,
    /// One step pulse was emitted; more follow.
    Stepped,
    /// The last step of the segment was emitted.
    Completed,
    /// The axis has been idle for the configured timeout.
    IdleTimeout,
}

/// One stepper axis: STEP/DIR/EN outputs, its TMC2208 and its position counter.
pub struct AxisDriver<'a, IO, U> {
    io: IO,
    tmc: Tmc2208<U>,
    position: &'a StepCounter,
    setup: Option<DriverSetup>,
    segment: Option<MotionSegment>,
    direction: Direction,
    next_due_us: u32,
    enabled: bool,
    idle_since_us: Option<u32>,
    fault: Option<FaultKind>,
}

impl<'a, IO: StepperIo, U: DriverUart> AxisDriver<'a, IO, U> {
    /// Wrap the axis hardware. The outputs are disabled until the first move.
    pub fn new(mut io: IO, uart: U, position: &'a StepCounter) -> Self {
        io.set_enabled(false);
        Self {
            io,
            tmc: Tmc2208::new(uart),
            position,
            setup: None,
            segment: None,
            direction: Direction::Forward,
            next_due_us: 0,
            enabled: false,
            idle_since_us: None,
            fault: None,
        }
    }

    /// Program the driver chip and clear any latched fault.
    ///
    /// The standstill-to-hold delay is the axis idle timeout. On failure the axis is left
    /// faulted.
    pub fn initialize(&mut self, setup: DriverSetup) -> Result<CurrentSetting, FaultKind> {
        self.setup = Some(setup);
        self.fault = None;

        match self.tmc.configure(
            &setup.driver,
            setup.microsteps,
            setup.r_sense_ohm,
            setup.idle_timeout_us,
        ) {
            Ok(current) => {
                debug!(
                    "tmc2208 configured: irun {} ihold {} vsense {}",
                    current.irun,
                    current.ihold,
                    current.vsense
                );
                Ok(current)
            }
            Err(e) => {
                let fault = FaultKind::from(e);
                self.latch_fault(fault);
                Err(fault)
            }
        }
    }

    pub fn enable(&mut self) {
        if !self.enabled {
            self.io.set_enabled(true);
            self.enabled = true;
        }
    }

    pub fn disable(&mut self) {
        if self.enabled {
            self.io.set_enabled(false);
            self.enabled = false;
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start executing `segment`, replacing any segment in flight.
    ///
    /// The first pulse is due one interval after `now_us`. Empty segments complete immediately.
    pub fn execute(&mut self, mut segment: MotionSegment, now_us: u32) -> Result<(), FaultKind> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }

        self.segment = None;
        let first = match segment.next() {
            Some(interval) => interval,
            None => return Ok(()),
        };

        self.direction = segment.direction();
        self.io.set_direction(self.direction);
        self.enable();
        self.next_due_us = now_us.wrapping_add(first);
        self.idle_since_us = None;
        self.segment = Some(segment);
        Ok(())
    }

    /// Advance the axis to `now_us`.
    pub fn poll(&mut self, now_us: u32) -> AxisEvent {
        if self.segment.is_none() {
            return self.poll_idle(now_us);
        }
        if !is_due(now_us, self.next_due_us) {
            return AxisEvent::None;
        }

        self.io.step();
        self.position.advance(self.direction.sign());

        let next = self.segment.as_mut().and_then(|s| s.next());
        match next {
            Some(interval) => {
                // A late poll never produces a burst: the next pulse is at least one interval out.
                let planned = self.next_due_us.wrapping_add(interval);
                self.next_due_us = if is_due(now_us, planned) {
                    now_us.wrapping_add(interval)
                } else {
                    planned
                };
                AxisEvent::Stepped
            }
            None => {
                self.segment = None;
                self.idle_since_us = Some(now_us);
                AxisEvent::Completed
            }
        }
    }

    fn poll_idle(&mut self, now_us: u32) -> AxisEvent {
        let (Some(since), Some(setup)) = (self.idle_since_us, self.setup) else {
            return AxisEvent::None;
        };
        if elapsed(now_us, since) < setup.idle_timeout_us {
            return AxisEvent::None;
        }

        self.idle_since_us = None;
        if setup.idle_policy == IdlePolicy::Disable {
            self.disable();
        }
        AxisEvent::IdleTimeout
    }

    /// Stop emitting pulses. The position stays at the last completed step.
    ///
    /// Returns true if a segment was in flight.
    pub fn abort(&mut self, now_us: u32) -> bool {
        if self.segment.take().is_some() {
            self.idle_since_us = Some(now_us);
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn is_moving(&self) -> bool {
        self.segment.is_some()
    }

    /// Absolute microstep position.
    #[inline]
    pub fn position(&self) -> i32 {
        self.position.get()
    }

    /// Read DRV_STATUS and latch any fault it, or the link, reports.
    pub fn check_status(&mut self) -> Result<DrvStatus, FaultKind> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }

        let status = match self.tmc.read_drv_status() {
            Ok(status) => status,
            Err(e) => {
                let fault = FaultKind::from(e);
                self.latch_fault(fault);
                return Err(fault);
            }
        };
        if status.otpw() {
            warn!("tmc2208 over-temperature pre-warning");
        }
        if let Some(fault) = FaultKind::from_status(&status) {
            self.latch_fault(fault);
            return Err(fault);
        }
        Ok(status)
    }

    /// Abort, disable and remember `fault` until cleared.
    pub fn latch_fault(&mut self, fault: FaultKind) {
        self.segment = None;
        self.idle_since_us = None;
        self.disable();
        self.fault = Some(fault);
    }

    #[inline]
    pub fn fault(&self) -> Option<FaultKind> {
        self.fault
    }

    /// Re-initialize the chip with the last setup, which also clears GSTAT.
    pub fn clear_fault(&mut self) -> Result<(), FaultKind> {
        self.fault = None;
        match self.setup {
            Some(setup) => self.initialize(setup).map(|_| ()),
            None => Ok(()),
        }
    }

    #[inline]
    pub fn io(&self) -> &IO {
        &self.io
    }

    #[inline]
    pub fn tmc(&self) -> &Tmc2208<U> {
        &self.tmc
    }

    #[inline]
    pub fn tmc_mut(&mut self) -> &mut Tmc2208<U> {
        &mut self.tmc
    }
}
