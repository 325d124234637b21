// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Duplicate suppression for inbound messages.
//!
//! A message is often heard several times: once per IR channel that picked it up, and again for
//! every retransmission. Two queued messages are the same logical message iff their checksums
//! match and their arrival times differ by less than the dedup window. Two distinct messages that
//! collide on checksum within the window are coalesced as well; that trade-off is accepted.

use crate::protocol::IrMessage;

use super::MessageQueue;

/// True if `later` is another copy of `first`.
#[inline]
pub fn is_same_message(first: &IrMessage, later: &IrMessage, window: u32) -> bool {
    first.crc == later.crc && arrival_gap(first.arrival_time, later.arrival_time) < window
}

/// Absolute difference of two wrapping clock readings.
#[inline]
fn arrival_gap(a: u32, b: u32) -> u32 {
    a.wrapping_sub(b).min(b.wrapping_sub(a))
}

impl MessageQueue {
    /// Drain all messages, delivering each logical message exactly once.
    ///
    /// Before a message is handed to `visitor`, every later queued copy is released and counted
    /// into the delivered message's `attempts`.
    pub fn drain_deduped<F: FnMut(IrMessage)>(&self, window: u32, visitor: F) -> usize {
        self.drain_purging(
            |head, other| {
                let dup = is_same_message(head, other, window);
                if dup {
                    head.attempts = head.attempts.saturating_add(1);
                }
                dup
            },
            visitor,
        )
    }
}
