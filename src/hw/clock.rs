// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Free-running microsecond timebase on TIM2.
//!
//! TIM2 is 32 bits wide, so with a 1 MHz tick the counter wraps every ~71.6 minutes. Consumers
//! compare instants with [`crate::time::is_due`], which handles the wrap.

use stm32f7xx_hal::{pac, rcc::Clocks};

pub struct MicrosClock {
    tim: pac::TIM2,
}

impl MicrosClock {
    /// Configure TIM2 to count microseconds over the full 32-bit range.
    #[allow(unused_unsafe)]
    pub fn tim2(tim2: pac::TIM2, clocks: &Clocks) -> Self {
        // SAFETY: single read-modify-write of the TIM2 enable bit, done once during init before
        // anything else touches RCC.
        unsafe {
            (*pac::RCC::ptr()).apb1enr.modify(|_, w| w.tim2en().set_bit());
        }

        let tim = tim2;

        // Disable counter while configuring
        tim.cr1.modify(|_, w| w.cen().clear_bit());

        // 1 MHz tick
        let psc = (clocks.timclk1().raw() / 1_000_000).saturating_sub(1) as u16;
        tim.psc.write(|w| unsafe { w.psc().bits(psc) });

        // Auto-reload: max 32-bit
        tim.arr.write(|w| w.bits(0xFFFF_FFFF));

        // Load the prescaler now rather than at the first overflow
        tim.egr.write(|w| w.ug().set_bit());

        // Reset the counter
        tim.cnt.write(|w| w.bits(0));

        // Enable the counter
        tim.cr1.modify(|_, w| w.cen().set_bit());

        Self { tim }
    }

    /// Microseconds since `tim2()`, modulo 2^32.
    #[inline]
    pub fn now_us(&self) -> u32 {
        self.tim.cnt.read().cnt().bits()
    }

    /// Consume the wrapper and return the underlying timer peripheral.
    #[inline]
    pub fn free(self) -> pac::TIM2 {
        self.tim
    }
}
