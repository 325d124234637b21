// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Services the core consumes from the board: a millisecond clock and the IR transmit primitive.

use crate::error::Error;

/// Emitter mask selecting all six IR directions.
pub const ALL_DIRS: u8 = 0x3F;

/// Monotonic millisecond clock. Wraps at `u32::MAX`.
pub trait Clock {
    fn now_ms(&self) -> u32;
}

/// Non-blocking IR transmit.
pub trait Transmitter {
    /// Start sending `payload` on the emitters selected by `dir_mask`.
    ///
    /// `nb::Error::WouldBlock` means the channel is busy; the caller retries later.
    fn transmit(&mut self, dir_mask: u8, payload: &[u8]) -> nb::Result<(), Error>;
}

/// True once the wrapping clock `now` has reached `deadline`.
#[inline]
pub fn time_reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) < u32::MAX / 2
}
