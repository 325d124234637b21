// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Time-division broadcast slots.
//!
//! Time is cut into frames of `slots_per_frame` slots. Each robot owns the slot
//! `id % (slots_per_frame - 1)` and broadcasts its pose once per frame when that slot opens.
//!
//! ```text
//!            frame n                                 frame n+1
//! |-----|-----|-----|-- .. --|-----|          |-----|-----|-- ..
//!   0     1     2     slot     37               0     1
//!               ^ Idle -> Armed (SlotOpen), Armed -> Idle on complete()
//! ```

use crate::config::DropletConfig;
use crate::ident::DropletId;

/// Slot owned by `id`. Pure; always in `0..slots_per_frame - 1`.
#[inline]
pub fn slot_for(id: DropletId, slots_per_frame: u16) -> u16 {
    id % (slots_per_frame.max(2) - 1)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Between this robot's slots.
    Idle,
    /// Slot open for the current frame, broadcast pending.
    Armed,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SlotEvent {
    /// A new frame began.
    FrameStart { frame: u32 },
    /// This robot's slot is open. Broadcast, then call [`SlotScheduler::complete`].
    SlotOpen { frame: u32 },
    /// Whole frames went by between polls; the schedule must be resynchronized.
    Desync { missed_frames: u32 },
}

pub struct SlotScheduler {
    slot: u16,
    slot_length_ms: u32,
    slots_per_frame: u16,
    frame_start: u32,
    frame_count: u32,
    state: SlotState,
    /// Slot already used in the current frame.
    fired: bool,
}

impl SlotScheduler {
    /// Create a scheduler for `id` whose first frame starts at `now`.
    pub fn new(id: DropletId, cfg: &DropletConfig, now: u32) -> Self {
        let slots_per_frame = cfg.slots_per_frame.max(2);
        Self {
            slot: slot_for(id, slots_per_frame),
            slot_length_ms: cfg.slot_length_ms.max(1),
            slots_per_frame,
            frame_start: now,
            frame_count: 0,
            state: SlotState::Idle,
            fired: false,
        }
    }

    #[inline]
    pub fn slot(&self) -> u16 {
        self.slot
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Frames completed since start.
    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    #[inline]
    pub fn frame_start(&self) -> u32 {
        self.frame_start
    }

    #[inline]
    pub fn frame_length_ms(&self) -> u32 {
        self.slot_length_ms * self.slots_per_frame as u32
    }

    /// Offset of this robot's slot from the frame start.
    #[inline]
    pub fn slot_offset_ms(&self) -> u32 {
        self.slot as u32 * self.slot_length_ms
    }

    /// Advance to `now`. Call repeatedly until it returns `None`.
    pub fn poll(&mut self, now: u32) -> Option<SlotEvent> {
        let frame_len = self.frame_length_ms();
        let elapsed = now.wrapping_sub(self.frame_start);

        if elapsed >= frame_len {
            let frames = elapsed / frame_len;
            if frames > 1 {
                return Some(SlotEvent::Desync {
                    missed_frames: frames - 1,
                });
            }
            self.frame_start = self.frame_start.wrapping_add(frame_len);
            self.frame_count = self.frame_count.wrapping_add(1);
            self.state = SlotState::Idle;
            self.fired = false;
            return Some(SlotEvent::FrameStart {
                frame: self.frame_count,
            });
        }

        if self.state == SlotState::Idle && !self.fired && elapsed >= self.slot_offset_ms() {
            self.state = SlotState::Armed;
            return Some(SlotEvent::SlotOpen {
                frame: self.frame_count,
            });
        }

        None
    }

    /// Release the slot after broadcasting (or skipping) in it.
    pub fn complete(&mut self) {
        if self.state == SlotState::Armed {
            self.state = SlotState::Idle;
            self.fired = true;
        }
    }

    /// Restart the frame grid at `now` after a desync.
    pub fn resync(&mut self, now: u32) {
        self.frame_start = now;
        self.frame_count = self.frame_count.wrapping_add(1);
        self.state = SlotState::Idle;
        self.fired = false;
    }
}
