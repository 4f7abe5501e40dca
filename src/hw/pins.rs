// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pin definitions for the STM32F777 SatTracker board.

use core::convert::Infallible;

use embedded_hal::digital::{ErrorType, OutputPin};
use stm32f7xx_hal::{
    gpio::{self, gpioa, gpiod, gpioe, Alternate, Output, PushPull},
    pac,
    prelude::*,
};

/// All board pins. Construct this once at startup using:
///
/// ```ignore
/// let pins = BoardPins::new(dp.GPIOA, dp.GPIOD, dp.GPIOE);
/// ```
pub struct BoardPins {
    /// Host link (rotctld client).
    pub usart1: Usart1Pins,
    /// Azimuth TMC2208 PDN_UART.
    pub usart2: Usart2Pins,
    /// Elevation TMC2208 PDN_UART.
    pub usart3: Usart3Pins,
    pub azimuth: AzimuthPins,
    pub elevation: ElevationPins,
}

pub struct Usart1Pins {
    pub tx: gpioa::PA9<Alternate<7>>,
    pub rx: gpioa::PA10<Alternate<7>>,
}

/// TX joins the single-wire bus through 1 kΩ; RX sits directly on it.
pub struct Usart2Pins {
    pub tx: gpiod::PD5<Alternate<7>>,
    pub rx: gpiod::PD6<Alternate<7>>,
}

pub struct Usart3Pins {
    pub tx: gpiod::PD8<Alternate<7>>,
    pub rx: gpiod::PD9<Alternate<7>>,
}

/// Azimuth STEP/DIR/EN
pub struct AzimuthPins {
    pub step: OutPin<'E', 9>,
    pub dir: OutPin<'E', 10>,
    pub en: OutPin<'E', 11>,
}

/// Elevation STEP/DIR/EN
pub struct ElevationPins {
    pub step: OutPin<'E', 12>,
    pub dir: OutPin<'E', 13>,
    pub en: OutPin<'E', 14>,
}

/// Push-pull output exposed through the `embedded-hal` 1.0 `OutputPin` trait.
pub struct OutPin<const P: char, const N: u8>(gpio::Pin<P, N, Output<PushPull>>);

impl<const P: char, const N: u8> OutPin<P, N> {
    pub fn new(pin: gpio::Pin<P, N, Output<PushPull>>) -> Self {
        Self(pin)
    }

    pub fn free(self) -> gpio::Pin<P, N, Output<PushPull>> {
        self.0
    }
}

impl<const P: char, const N: u8> ErrorType for OutPin<P, N> {
    type Error = Infallible;
}

impl<const P: char, const N: u8> OutputPin for OutPin<P, N> {
    #[inline]
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set_low();
        Ok(())
    }

    #[inline]
    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set_high();
        Ok(())
    }
}

impl BoardPins {
    /// Create all named pins from raw GPIO peripherals.
    pub fn new(gpioa: pac::GPIOA, gpiod: pac::GPIOD, gpioe: pac::GPIOE) -> Self {
        let gpioa = gpioa.split();
        let gpiod = gpiod.split();
        let gpioe = gpioe.split();

        Self {
            usart1: Usart1Pins {
                tx: gpioa.pa9.into_alternate::<7>(),
                rx: gpioa.pa10.into_alternate::<7>(),
            },

            usart2: Usart2Pins {
                tx: gpiod.pd5.into_alternate::<7>(),
                rx: gpiod.pd6.into_alternate::<7>(),
            },

            usart3: Usart3Pins {
                tx: gpiod.pd8.into_alternate::<7>(),
                rx: gpiod.pd9.into_alternate::<7>(),
            },

            azimuth: AzimuthPins {
                step: OutPin::new(gpioe.pe9.into_push_pull_output()),
                dir: OutPin::new(gpioe.pe10.into_push_pull_output()),
                en: OutPin::new(gpioe.pe11.into_push_pull_output()),
            },

            elevation: ElevationPins {
                step: OutPin::new(gpioe.pe12.into_push_pull_output()),
                dir: OutPin::new(gpioe.pe13.into_push_pull_output()),
                en: OutPin::new(gpioe.pe14.into_push_pull_output()),
            },
        }
    }
}
