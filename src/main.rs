// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! SatTracker firmware entry point.
//!
//! Single cooperative loop: drain the host link into the line engine, answer each complete
//! request, expire stale partial lines, then give both axes their tick.

#![cfg_attr(target_os = "none", no_main)]
#![cfg_attr(target_os = "none", no_std)]

#[cfg(target_os = "none")]
mod firmware {
    use core::fmt::Write;

    use cortex_m_rt::entry;
    use panic_halt as _;

    #[cfg(feature = "defmt")]
    use defmt_rtt as _;

    use hal::{
        pac,
        prelude::*,
        serial::{Config, Serial},
    };
    use stm32f7xx_hal as hal;

    use sattracker::config::RotatorConfig;
    use sattracker::control::RotatorController;
    use sattracker::drivers::stepper::{AxisDriver, PinStepper, StepCounter};
    use sattracker::hw::{BoardPins, HostLink, MicrosClock, MotorUart};
    use sattracker::protocol::{ProtocolEngine, ProtocolMessage};

    /// Spin iterations STEP is held high. TMC2208 needs 100 ns.
    const STEP_PULSE_SPIN: u32 = 8;

    static AZIMUTH_STEPS: StepCounter = StepCounter::new(0);
    static ELEVATION_STEPS: StepCounter = StepCounter::new(0);

    #[entry]
    fn main() -> ! {
        // Peripherals
        let dp = pac::Peripherals::take().unwrap();

        // Clocks
        let rcc = dp.RCC.constrain();
        let clocks = rcc.cfgr.freeze();

        let config = RotatorConfig::default();
        let pins = BoardPins::new(dp.GPIOA, dp.GPIOD, dp.GPIOE);

        // USART1 (host)
        let host_cfg = Config {
            baud_rate: config.host_baud.bps(),
            ..Default::default()
        };
        let serial = Serial::new(dp.USART1, (pins.usart1.tx, pins.usart1.rx), &clocks, host_cfg);
        let mut host = HostLink::new(serial);

        // USART2/USART3 (drivers)
        let motor_cfg = || Config {
            baud_rate: config.motor_baud.bps(),
            ..Default::default()
        };
        let az_uart = MotorUart::new(Serial::new(
            dp.USART2,
            (pins.usart2.tx, pins.usart2.rx),
            &clocks,
            motor_cfg(),
        ));
        let el_uart = MotorUart::new(Serial::new(
            dp.USART3,
            (pins.usart3.tx, pins.usart3.rx),
            &clocks,
            motor_cfg(),
        ));

        let clock = MicrosClock::tim2(dp.TIM2, &clocks);

        let az_io = PinStepper::new(
            pins.azimuth.step,
            pins.azimuth.dir,
            pins.azimuth.en,
            STEP_PULSE_SPIN,
        );
        let el_io = PinStepper::new(
            pins.elevation.step,
            pins.elevation.dir,
            pins.elevation.en,
            STEP_PULSE_SPIN,
        );

        let azimuth = AxisDriver::new(az_io, az_uart, &AZIMUTH_STEPS);
        let elevation = AxisDriver::new(el_io, el_uart, &ELEVATION_STEPS);

        let mut controller = match RotatorController::new(config, azimuth, elevation) {
            Ok(controller) => controller,
            Err(e) => {
                let _ = writeln!(host, "{}", e);
                loop {
                    cortex_m::asm::wfi();
                }
            }
        };

        // A driver that fails here stays faulted and is reported on every move until reset.
        let _ = controller.initialize(clock.now_us());

        let mut engine = ProtocolEngine::new(config.line_timeout_us);

        loop {
            let now = clock.now_us();

            while let Some(byte) = host.poll_byte() {
                if let Some(msg) = engine.push(byte, now) {
                    respond(&mut controller, &mut host, msg, now);
                }
            }
            if let Some(msg) = engine.poll_timeout(now) {
                respond(&mut controller, &mut host, msg, now);
            }

            controller.tick(now);
        }
    }

    fn respond<AzIo, AzU, ElIo, ElU, U>(
        controller: &mut RotatorController<'_, AzIo, AzU, ElIo, ElU>,
        host: &mut HostLink<U>,
        msg: ProtocolMessage,
        now: u32,
    ) where
        AzIo: sattracker::drivers::StepperIo,
        AzU: sattracker::drivers::DriverUart,
        ElIo: sattracker::drivers::StepperIo,
        ElU: sattracker::drivers::DriverUart,
        U: hal::serial::Instance,
    {
        let response = controller.handle(msg, now);
        let _ = write!(host, "{}", response);
    }
}

#[cfg(not(target_os = "none"))]
fn main() {}
