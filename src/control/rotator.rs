// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Two-axis rotator controller.
//!
//! Owns the azimuth and elevation axes (unit model, profiler and driver each) and turns host
//! messages into motion. Each axis runs its own state machine:
//!
//! ```text
//! Idle -> Profiling -> Moving -> Idle
//!   \________\___________\_____-> Fault (until Reset)
//! ```
//!
//! Typical usage pattern:
//!
//! ```ignore
//! controller.initialize(clock.now_us())?;
//!
//! loop {
//!     let now = clock.now_us();
//!     if let Some(msg) = host.poll_byte().and_then(|b| engine.push(b, now)) {
//!         write!(host, "{}", controller.handle(msg, now))?;
//!     }
//!     controller.tick(now);
//! }
//! ```

use crate::config::{ConfigError, RotatorConfig};
use crate::control::profile::MotionProfiler;
use crate::drivers::stepper::{AxisDriver, AxisEvent, DriverSetup, FaultKind, StepperIo};
use crate::drivers::tmc2208::DriverUart;
use crate::error::{Error, RPRT_EPROTO};
use crate::motors::{AxisId, AxisModel};
use crate::protocol::messages::{ProtocolMessage, Response, INFO};
use crate::time::is_due;

/// Lifecycle state of one axis.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AxisState {
    Idle,
    /// Planning a move. Only observable from inside a command.
    Profiling,
    Moving,
    Fault(FaultKind),
}

/// One axis with everything needed to move it.
struct Axis<'a, IO, U> {
    model: AxisModel,
    profiler: MotionProfiler,
    driver: AxisDriver<'a, IO, U>,
    setup: DriverSetup,
    state: AxisState,
    target: Option<i32>,
}

impl<'a, IO: StepperIo, U: DriverUart> Axis<'a, IO, U> {
    fn new(
        id: AxisId,
        config: &RotatorConfig,
        driver: AxisDriver<'a, IO, U>,
    ) -> Result<Self, ConfigError> {
        let cfg = config.axis(id);
        let profiler = MotionProfiler::from_config(cfg).map_err(|e| ConfigError::Axis(id, e))?;
        Ok(Self {
            model: AxisModel::from_config(id, cfg, config.degrees_per_step),
            profiler,
            driver,
            setup: DriverSetup::from_axis(cfg, config.r_sense_ohm),
            state: AxisState::Idle,
            target: None,
        })
    }

    fn fault_error(&self, fault: FaultKind) -> Error {
        Error::DriverFault {
            axis: self.model.id(),
            fault,
        }
    }

    fn enter_fault(&mut self, fault: FaultKind) -> Error {
        if self.state != AxisState::Fault(fault) {
            error!("{} axis fault: {}", self.model.id(), fault);
        }
        self.state = AxisState::Fault(fault);
        self.target = None;
        self.fault_error(fault)
    }

    fn initialize(&mut self) -> Result<(), Error> {
        match self.driver.initialize(self.setup) {
            Ok(current) => {
                info!(
                    "{} driver ready, {} mA run current",
                    self.model.id(),
                    current.run_current_ma(self.setup.r_sense_ohm)
                );
                self.state = AxisState::Idle;
                Ok(())
            }
            Err(fault) => Err(self.enter_fault(fault)),
        }
    }

    /// Plan and start a move to `target` from wherever the axis is now.
    fn move_to(&mut self, target: i32, now_us: u32) -> Result<(), Error> {
        if let Some(fault) = self.driver.fault() {
            return Err(self.enter_fault(fault));
        }

        if self.driver.abort(now_us) {
            debug!("{} retarget at step {}", self.model.id(), self.driver.position());
        }
        self.state = AxisState::Profiling;
        let start = self.driver.position();
        let segment = self.profiler.profile(start, target);
        debug!(
            "{} move {} -> {} ({} steps, peak {} steps/s)",
            self.model.id(),
            start,
            target,
            segment.distance(),
            segment.peak_speed()
        );

        if let Err(fault) = self.driver.execute(segment, now_us) {
            return Err(self.enter_fault(fault));
        }
        self.target = Some(target);
        self.state = if self.driver.is_moving() {
            AxisState::Moving
        } else {
            AxisState::Idle
        };
        Ok(())
    }

    fn stop(&mut self, now_us: u32) {
        if self.driver.abort(now_us) {
            info!(
                "{} stopped at {}",
                self.model.id(),
                self.model.steps_to_degrees(self.driver.position())
            );
        }
        self.target = None;
        if !matches!(self.state, AxisState::Fault(_)) {
            self.state = AxisState::Idle;
        }
    }

    fn reset(&mut self, now_us: u32) -> Result<(), Error> {
        self.stop(now_us);
        if self.driver.fault().is_none() && !matches!(self.state, AxisState::Fault(_)) {
            return Ok(());
        }
        match self.driver.clear_fault() {
            Ok(()) => {
                info!("{} fault cleared", self.model.id());
                self.state = AxisState::Idle;
                Ok(())
            }
            Err(fault) => Err(self.enter_fault(fault)),
        }
    }

    fn tick(&mut self, now_us: u32) {
        match self.driver.poll(now_us) {
            AxisEvent::Completed => {
                debug!("{} reached step {}", self.model.id(), self.driver.position());
                self.state = AxisState::Idle;
                self.target = None;
            }
            AxisEvent::IdleTimeout => {
                trace!("{} idle", self.model.id());
            }
            AxisEvent::None | AxisEvent::Stepped => {}
        }
    }

    fn check_status(&mut self) {
        if matches!(self.state, AxisState::Fault(_)) {
            return;
        }
        if let Err(fault) = self.driver.check_status() {
            self.enter_fault(fault);
        }
    }

    #[inline]
    fn degrees(&self) -> f32 {
        self.model.steps_to_degrees(self.driver.position())
    }
}

/// Azimuth/elevation rotator controller.
///
/// The two axes may use different hardware types (e.g. different UART peripherals).
pub struct RotatorController<'a, AzIo, AzU, ElIo, ElU> {
    azimuth: Axis<'a, AzIo, AzU>,
    elevation: Axis<'a, ElIo, ElU>,
    status_poll_interval_us: u32,
    next_status_us: u32,
}

impl<'a, AzIo, AzU, ElIo, ElU> RotatorController<'a, AzIo, AzU, ElIo, ElU>
where
    AzIo: StepperIo,
    AzU: DriverUart,
    ElIo: StepperIo,
    ElU: DriverUart,
{
    /// Validate `config` and take ownership of both axis drivers.
    ///
    /// Nothing is sent to the drivers until [`initialize`](Self::initialize).
    pub fn new(
        config: RotatorConfig,
        azimuth: AxisDriver<'a, AzIo, AzU>,
        elevation: AxisDriver<'a, ElIo, ElU>,
    ) -> Result<Self, Error> {
        if let Err(e) = config.validate() {
            error!("invalid configuration: {}", e);
            return Err(e.into());
        }

        Ok(Self {
            azimuth: Axis::new(AxisId::Azimuth, &config, azimuth)?,
            elevation: Axis::new(AxisId::Elevation, &config, elevation)?,
            status_poll_interval_us: config.status_poll_interval_us,
            next_status_us: 0,
        })
    }

    /// Program both drivers. An axis that fails is left faulted; the other still comes up.
    pub fn initialize(&mut self, now_us: u32) -> Result<(), Error> {
        let az = self.azimuth.initialize();
        let el = self.elevation.initialize();
        self.next_status_us = now_us.wrapping_add(self.status_poll_interval_us);
        az.and(el)
    }

    /// Execute one host request and build its response.
    pub fn handle(&mut self, msg: ProtocolMessage, now_us: u32) -> Response {
        match msg {
            ProtocolMessage::SetPosition { azimuth, elevation } => {
                self.set_position(azimuth, elevation, now_us).into()
            }
            ProtocolMessage::GetPosition => {
                let (azimuth, elevation) = self.get_position();
                Response::Position { azimuth, elevation }
            }
            ProtocolMessage::Stop => {
                self.stop(now_us);
                Response::Ok
            }
            ProtocolMessage::Reset => self.reset(now_us).into(),
            ProtocolMessage::GetInfo => Response::Info(INFO),
            ProtocolMessage::Malformed { raw } => {
                warn!("malformed request ({} bytes)", raw.len());
                Response::Error(RPRT_EPROTO)
            }
        }
    }

    /// Move both axes to the given angles (degrees).
    ///
    /// Both angles are checked before either axis moves. A faulted axis does not stop the other
    /// one from moving, but its fault is reported.
    pub fn set_position(&mut self, azimuth: f32, elevation: f32, now_us: u32) -> Result<(), Error> {
        let az_target = self.azimuth.model.degrees_to_steps(azimuth);
        let el_target = self.elevation.model.degrees_to_steps(elevation);
        let (az_target, el_target) = match (az_target, el_target) {
            (Ok(az), Ok(el)) => (az, el),
            (Err(e), _) | (_, Err(e)) => {
                warn!("rejected position {} {}", azimuth, elevation);
                return Err(e);
            }
        };

        info!("set position {} {}", azimuth, elevation);
        let az = self.azimuth.move_to(az_target, now_us);
        let el = self.elevation.move_to(el_target, now_us);
        az.and(el)
    }

    /// Abort both axes at their current positions.
    pub fn stop(&mut self, now_us: u32) {
        self.azimuth.stop(now_us);
        self.elevation.stop(now_us);
    }

    /// Live azimuth and elevation in degrees.
    pub fn get_position(&self) -> (f32, f32) {
        (self.azimuth.degrees(), self.elevation.degrees())
    }

    /// Stop both axes and re-initialize any faulted driver.
    pub fn reset(&mut self, now_us: u32) -> Result<(), Error> {
        let az = self.azimuth.reset(now_us);
        let el = self.elevation.reset(now_us);
        az.and(el)
    }

    /// Advance both axes by at most one step each and poll driver status when due.
    pub fn tick(&mut self, now_us: u32) {
        self.azimuth.tick(now_us);
        self.elevation.tick(now_us);

        // A status read blocks for a few ms, which would stall pulses, so it waits for standstill.
        if !self.is_moving() && is_due(now_us, self.next_status_us) {
            self.azimuth.check_status();
            self.elevation.check_status();
            self.next_status_us = now_us.wrapping_add(self.status_poll_interval_us);
        }
    }

    pub fn state(&self, id: AxisId) -> AxisState {
        match id {
            AxisId::Azimuth => self.azimuth.state,
            AxisId::Elevation => self.elevation.state,
        }
    }

    /// Step the current move is heading to, if any.
    pub fn target(&self, id: AxisId) -> Option<i32> {
        match id {
            AxisId::Azimuth => self.azimuth.target,
            AxisId::Elevation => self.elevation.target,
        }
    }

    /// True while either axis is moving.
    pub fn is_moving(&self) -> bool {
        self.azimuth.driver.is_moving() || self.elevation.driver.is_moving()
    }

    pub fn model(&self, id: AxisId) -> &AxisModel {
        match id {
            AxisId::Azimuth => &self.azimuth.model,
            AxisId::Elevation => &self.elevation.model,
        }
    }

    pub fn azimuth_driver(&self) -> &AxisDriver<'a, AzIo, AzU> {
        &self.azimuth.driver
    }

    pub fn azimuth_driver_mut(&mut self) -> &mut AxisDriver<'a, AzIo, AzU> {
        &mut self.azimuth.driver
    }

    pub fn elevation_driver(&self) -> &AxisDriver<'a, ElIo, ElU> {
        &self.elevation.driver
    }

    pub fn elevation_driver_mut(&mut self) -> &mut AxisDriver<'a, ElIo, ElU> {
        &mut self.elevation.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AxisConfigError;
    use crate::drivers::stepper::{LinkError, StepCounter};
    use crate::drivers::tmc2208::reg;
    use crate::error::{RPRT_EINVAL, RPRT_EIO};
    use crate::testing::{MockIo, MockTmc};
    use approx::assert_abs_diff_eq;

    type Controller<'a> = RotatorController<'a, MockIo, MockTmc, MockIo, MockTmc>;

    /// Polling period used by the tests, longer than any step interval.
    const TICK: u32 = 30_000;

    fn controller<'a>(az: &'a StepCounter, el: &'a StepCounter) -> Controller<'a> {
        let mut ctl = RotatorController::new(
            RotatorConfig::default(),
            AxisDriver::new(MockIo::new(), MockTmc::new(), az),
            AxisDriver::new(MockIo::new(), MockTmc::new(), el),
        )
        .unwrap();
        ctl.initialize(0).unwrap();
        ctl
    }

    fn tick_n(ctl: &mut Controller<'_>, now: &mut u32, n: usize) {
        for _ in 0..n {
            *now += TICK;
            ctl.tick(*now);
        }
    }

    fn run_until_idle(ctl: &mut Controller<'_>, now: &mut u32) {
        let mut guard = 0;
        while ctl.is_moving() {
            *now += TICK;
            ctl.tick(*now);
            guard += 1;
            assert!(guard < 100_000, "move never finished");
        }
    }

    fn set(az: f32, el: f32) -> ProtocolMessage {
        ProtocolMessage::SetPosition {
            azimuth: az,
            elevation: el,
        }
    }

    #[test]
    fn moves_both_axes_to_target() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;

        assert_eq!(ctl.handle(set(36.0, 9.0), now), Response::Ok);
        assert_eq!(ctl.state(AxisId::Azimuth), AxisState::Moving);
        assert_eq!(ctl.target(AxisId::Azimuth), Some(800));
        // 9 / 1.8 · 4 · 20
        assert_eq!(ctl.target(AxisId::Elevation), Some(400));

        run_until_idle(&mut ctl, &mut now);
        assert_eq!(az.get(), 800);
        assert_eq!(el.get(), 400);
        assert_eq!(ctl.state(AxisId::Azimuth), AxisState::Idle);
        assert_eq!(ctl.state(AxisId::Elevation), AxisState::Idle);

        match ctl.handle(ProtocolMessage::GetPosition, now) {
            Response::Position { azimuth, elevation } => {
                assert_abs_diff_eq!(azimuth, 36.0, epsilon = 1e-3);
                assert_abs_diff_eq!(elevation, 9.0, epsilon = 1e-3);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn both_axes_step_concurrently() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;
        ctl.handle(set(36.0, 9.0), now);

        tick_n(&mut ctl, &mut now, 50);
        assert_eq!(az.get(), 50);
        assert_eq!(el.get(), 50);
    }

    #[test]
    fn out_of_range_request_moves_nothing() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;

        assert_eq!(ctl.handle(set(400.0, 45.0), now), Response::Error(RPRT_EINVAL));
        assert_eq!(
            ctl.set_position(400.0, 45.0, now),
            Err(Error::OutOfRange {
                axis: AxisId::Azimuth,
                angle: 400.0
            })
        );
        assert_eq!(ctl.handle(set(10.0, 91.0), now), Response::Error(RPRT_EINVAL));

        tick_n(&mut ctl, &mut now, 100);
        assert!(!ctl.is_moving());
        assert_eq!(ctl.azimuth_driver().io().steps(), 0);
        assert_eq!(ctl.elevation_driver().io().steps(), 0);
        assert_eq!(ctl.state(AxisId::Elevation), AxisState::Idle);
    }

    #[test]
    fn limits_are_reachable() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;
        assert_eq!(ctl.handle(set(360.0, 90.0), now), Response::Ok);
        run_until_idle(&mut ctl, &mut now);
        assert_eq!(az.get(), 8_000);
        assert_eq!(el.get(), 4_000);
    }

    #[test]
    fn stop_mid_move_holds_reached_position() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;
        ctl.handle(set(180.0, 45.0), now);
        tick_n(&mut ctl, &mut now, 120);

        assert_eq!(ctl.handle(ProtocolMessage::Stop, now), Response::Ok);
        let stopped = az.get();
        assert_eq!(stopped, 120);
        assert_eq!(ctl.state(AxisId::Azimuth), AxisState::Idle);
        assert_eq!(ctl.target(AxisId::Azimuth), None);

        tick_n(&mut ctl, &mut now, 100);
        assert_eq!(az.get(), stopped);
        assert_eq!(ctl.azimuth_driver().io().steps(), 120);
        let (deg, _) = ctl.get_position();
        assert_abs_diff_eq!(deg, 120.0 * 0.045, epsilon = 1e-3);
    }

    #[test]
    fn retarget_replaces_move_in_flight() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;
        ctl.handle(set(90.0, 0.0), now);
        tick_n(&mut ctl, &mut now, 200);
        assert_eq!(az.get(), 200);

        // Last write wins: head back to 4.5° (100 steps) without finishing the first move.
        assert_eq!(ctl.handle(set(4.5, 0.0), now), Response::Ok);
        assert_eq!(ctl.target(AxisId::Azimuth), Some(100));
        run_until_idle(&mut ctl, &mut now);

        assert_eq!(az.get(), 100);
        assert_eq!(ctl.azimuth_driver().io().steps(), 300);
    }

    #[test]
    fn position_is_live_during_motion() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;
        ctl.handle(set(36.0, 0.0), now);
        tick_n(&mut ctl, &mut now, 400);

        match ctl.handle(ProtocolMessage::GetPosition, now) {
            Response::Position { azimuth, .. } => {
                assert_abs_diff_eq!(azimuth, 18.0, epsilon = 1e-3);
            }
            other => panic!("{:?}", other),
        }
        assert!(ctl.is_moving());
    }

    #[test]
    fn malformed_request_does_not_disturb_motion() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;
        ctl.handle(set(36.0, 0.0), now);
        tick_n(&mut ctl, &mut now, 10);

        let reply = ctl.handle(ProtocolMessage::malformed(b"move 1 2"), now);
        assert_eq!(reply, Response::Error(RPRT_EPROTO));
        assert_eq!(ctl.state(AxisId::Azimuth), AxisState::Moving);
        run_until_idle(&mut ctl, &mut now);
        assert_eq!(az.get(), 800);
    }

    #[test]
    fn driver_fault_is_latched_until_reset() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let mut now = 0;
        ctl.handle(set(36.0, 9.0), now);
        tick_n(&mut ctl, &mut now, 5);

        ctl.azimuth_driver_mut()
            .tmc_mut()
            .uart_mut()
            .set_reg(reg::DRV_STATUS, 1 << 1);
        // Picked up by the first status poll after the move, 250 ms at most.
        run_until_idle(&mut ctl, &mut now);
        tick_n(&mut ctl, &mut now, 10);
        assert_eq!(
            ctl.state(AxisId::Azimuth),
            AxisState::Fault(FaultKind::OverTemperature)
        );
        assert!(!ctl.azimuth_driver().is_enabled());
        assert_eq!(az.get(), 800);

        // The healthy axis keeps going, the faulted one is reported on every move.
        assert_eq!(ctl.handle(set(10.0, 18.0), now), Response::Error(RPRT_EIO));
        run_until_idle(&mut ctl, &mut now);
        assert_eq!(el.get(), 800);
        assert_eq!(az.get(), 800);

        ctl.azimuth_driver_mut()
            .tmc_mut()
            .uart_mut()
            .set_reg(reg::DRV_STATUS, 0);
        assert_eq!(ctl.handle(ProtocolMessage::Reset, now), Response::Ok);
        assert_eq!(ctl.state(AxisId::Azimuth), AxisState::Idle);

        assert_eq!(ctl.handle(set(10.0, 9.0), now), Response::Ok);
        run_until_idle(&mut ctl, &mut now);
        // 10 / 1.8 · 4 · 10 = 222.2
        assert_eq!(az.get(), 222);
    }

    #[test]
    fn status_is_not_read_while_moving() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let sent = |ctl: &Controller<'_>| {
            (
                ctl.azimuth_driver().tmc().uart().sent().len(),
                ctl.elevation_driver().tmc().uart().sent().len(),
            )
        };

        let mut now = 0;
        let before = sent(&ctl);
        ctl.handle(set(36.0, 9.0), now);
        let mut ticks = 0;
        while ctl.is_moving() {
            assert_eq!(sent(&ctl), before, "UART traffic during motion");
            now += TICK;
            ctl.tick(now);
            ticks += 1;
        }
        // Long enough that several status polls fell due on the way.
        assert!(ticks as u32 * TICK > 1_000_000);

        tick_n(&mut ctl, &mut now, 10);
        let after = sent(&ctl);
        assert!(after.0 > before.0 && after.1 > before.1);
    }

    #[test]
    fn reset_reports_dead_link() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        let uart = ctl.elevation_driver_mut().tmc_mut().uart_mut();
        uart.silent = true;
        uart.echo = false;

        let mut now = 0;
        tick_n(&mut ctl, &mut now, 10);
        let fault = FaultKind::Link(LinkError::Timeout);
        assert_eq!(ctl.state(AxisId::Elevation), AxisState::Fault(fault));

        assert_eq!(
            ctl.reset(now),
            Err(Error::DriverFault {
                axis: AxisId::Elevation,
                fault,
            })
        );
        assert_eq!(ctl.state(AxisId::Azimuth), AxisState::Idle);
    }

    #[test]
    fn reset_with_no_fault_is_ok() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        assert_eq!(ctl.handle(ProtocolMessage::Reset, 0), Response::Ok);
    }

    #[test]
    fn get_info_identifies_controller() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut ctl = controller(&az, &el);
        assert_eq!(ctl.handle(ProtocolMessage::GetInfo, 0), Response::Info(INFO));
    }

    #[test]
    fn rejects_invalid_configuration() {
        let (az, el) = (StepCounter::new(0), StepCounter::new(0));
        let mut config = RotatorConfig::default();
        config.elevation.gear_ratio = 0.0;

        let result = RotatorController::new(
            config,
            AxisDriver::new(MockIo::new(), MockTmc::new(), &az),
            AxisDriver::new(MockIo::new(), MockTmc::new(), &el),
        );
        assert_eq!(
            result.err(),
            Some(Error::Configuration(ConfigError::Axis(
                AxisId::Elevation,
                AxisConfigError::GearRatio
            )))
        );
    }
}
