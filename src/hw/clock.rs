// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Millisecond clock driven by the SysTick exception.

use core::sync::atomic::{AtomicU32, Ordering};

use cortex_m::peripheral::{syst::SystClkSource, SYST};
use stm32f7xx_hal::rcc::Clocks;

use crate::services::Clock;

static MILLIS: AtomicU32 = AtomicU32::new(0);

pub struct SysTickClock {
    _syst: SYST,
}

impl SysTickClock {
    /// Configure SysTick for a 1 kHz interrupt and start counting.
    pub fn start(mut syst: SYST, clocks: &Clocks) -> Self {
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(clocks.sysclk().raw() / 1_000 - 1);
        syst.clear_current();
        syst.enable_counter();
        syst.enable_interrupt();
        Self { _syst: syst }
    }

    /// Advance the clock by one millisecond. Call from the SysTick handler only.
    #[inline]
    pub fn tick() {
        MILLIS.fetch_add(1, Ordering::Relaxed);
    }

    /// Current time without a clock handle, for interrupt handlers.
    #[inline]
    pub fn now() -> u32 {
        MILLIS.load(Ordering::Relaxed)
    }
}

impl Clock for SysTickClock {
    #[inline]
    fn now_ms(&self) -> u32 {
        Self::now()
    }
}
