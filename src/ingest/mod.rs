// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Ingest Pipeline
//!
//! Interrupt-to-main-loop hand-off for everything the IR layer receives.
//!
//! ## Modules
//!
//! - [`queue`] - Generic interrupt-safe bounded FIFO with byte accounting.
//! - [`dedup`] - Same-logical-message detection for the message queue.
//!
//! The firmware owns one [`MeasurementQueue`] and one [`MessageQueue`], both `static`. Interrupt
//! handlers call `enqueue`; the main loop drains each queue to exhaustion once per iteration. No
//! ordering holds across the two queues.

pub mod dedup;
pub mod queue;

use core::mem::size_of;

pub use dedup::is_same_message;
pub use queue::{IngestQueue, QueueItem, QueueStats};

use crate::config::{MAX_MSG_LEN, MEAS_QUEUE_SLOTS, MSG_QUEUE_SLOTS};
use crate::error::{Error, Result};
use crate::protocol::{IrMessage, Measurement};

/// Queue of sensed range/bearing/heading readings.
pub type MeasurementQueue = IngestQueue<Measurement, MEAS_QUEUE_SLOTS>;

/// Queue of received messages.
pub type MessageQueue = IngestQueue<IrMessage, MSG_QUEUE_SLOTS>;

impl QueueItem for Measurement {
    fn footprint(&self) -> usize {
        size_of::<Measurement>()
    }
}

impl QueueItem for IrMessage {
    /// Envelope plus the bytes actually used by the payload.
    fn footprint(&self) -> usize {
        size_of::<IrMessage>() - MAX_MSG_LEN + self.len()
    }

    fn validate(&self) -> Result<()> {
        if self.is_empty() {
            Err(Error::EmptyMessage)
        } else {
            Ok(())
        }
    }
}
