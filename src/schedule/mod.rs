// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Scheduling
//!
//! - [`slot`] - Time-division slot assignment and the per-frame broadcast state machine.
//! - [`retry`] - Bounded retransmission of outbound payloads with exponential backoff.

pub mod retry;
pub mod slot;

pub use retry::{RetryManager, RetryRecord, RetryReport};
pub use slot::{slot_for, SlotEvent, SlotScheduler, SlotState};
