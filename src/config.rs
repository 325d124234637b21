// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Compile-time defaults and the runtime configuration bundle.
//!
//! All durations are in milliseconds of the monotonic clock, all distances in millimeters and all
//! angles in degrees.

/// Length of one broadcast slot.
pub const SLOT_LENGTH_MS: u32 = 397;

/// Slots in one frame. Identities map onto `0..SLOTS_PER_FRAME - 1`.
pub const SLOTS_PER_FRAME: u16 = 38;

/// Length of one full frame.
pub const FRAME_LENGTH_MS: u32 = SLOT_LENGTH_MS * SLOTS_PER_FRAME as u32;

/// Range/bearing measurement window.
pub const RNB_DUR_MS: u32 = 220;

/// Transmission window for one measurement message.
pub const BOT_MEAS_MSG_DUR_MS: u32 = 72;

/// One range/bearing window followed by two measurement-message windows.
pub const LOCALIZATION_DUR_MS: u32 = RNB_DUR_MS + BOT_MEAS_MSG_DUR_MS * 2;

/// Maximum arrival-time difference for two equal-checksum messages to count as one.
pub const DEDUP_WINDOW: u32 = 30;

/// Largest message payload carried by the IR envelope.
pub const MAX_MSG_LEN: usize = 32;

/// Slot count of the measurement queue.
pub const MEAS_QUEUE_SLOTS: usize = 16;

/// Slot count of the message queue.
pub const MSG_QUEUE_SLOTS: usize = 12;

/// Byte ceiling of the measurement queue.
pub const MEAS_QUEUE_CEILING: usize = 192;

/// Byte ceiling of the message queue.
pub const MSG_QUEUE_CEILING: usize = 512;

/// Outbound records held by the retry manager.
pub const RETRY_SLOTS: usize = 4;

/// Neighbor reference estimates remembered by the estimator.
pub const NEIGHBOR_SLOTS: usize = 16;

/// Runtime configuration, defaulting to the constants above.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropletConfig {
    pub slot_length_ms: u32,
    pub slots_per_frame: u16,

    /// Dedup window, in clock ticks.
    pub dedup_window: u32,

    /// Transmission attempts before an outbound record is dropped.
    pub max_attempts: u8,
    /// First backoff delay; doubles per failed attempt.
    pub base_delay_ms: u32,
    /// Upper bound of the backoff delay.
    pub max_delay_ms: u32,

    /// Constant part of the range standard deviation (mm).
    pub range_sigma_mm: f32,
    /// Range standard deviation growth per millimeter of range.
    pub range_sigma_per_mm: f32,
    /// Bearing standard deviation (deg).
    pub bearing_sigma_deg: f32,
    /// Heading standard deviation (deg).
    pub heading_sigma_deg: f32,

    /// Frames without a broadcast after which a neighbor reference is forgotten.
    pub neighbor_stale_frames: u8,
}

impl Default for DropletConfig {
    fn default() -> Self {
        Self {
            slot_length_ms: SLOT_LENGTH_MS,
            slots_per_frame: SLOTS_PER_FRAME,
            dedup_window: DEDUP_WINDOW,
            max_attempts: 3,
            base_delay_ms: SLOT_LENGTH_MS,
            max_delay_ms: FRAME_LENGTH_MS,
            range_sigma_mm: 5.0,
            range_sigma_per_mm: 0.1,
            bearing_sigma_deg: 10.0,
            heading_sigma_deg: 15.0,
            neighbor_stale_frames: 3,
        }
    }
}

impl DropletConfig {
    /// Frame length derived from slot length and slot count.
    #[inline]
    pub fn frame_length_ms(&self) -> u32 {
        self.slot_length_ms * self.slots_per_frame as u32
    }

    /// Set slot timing.
    pub fn with_slots(mut self, slot_length_ms: u32, slots_per_frame: u16) -> Self {
        self.slot_length_ms = slot_length_ms;
        self.slots_per_frame = slots_per_frame;
        self
    }

    /// Set retry attempts and backoff bounds.
    pub fn with_retry(mut self, max_attempts: u8, base_delay_ms: u32, max_delay_ms: u32) -> Self {
        self.max_attempts = max_attempts;
        self.base_delay_ms = base_delay_ms;
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Set sensor noise model.
    pub fn with_sensor_noise(
        mut self,
        range_sigma_mm: f32,
        range_sigma_per_mm: f32,
        bearing_sigma_deg: f32,
        heading_sigma_deg: f32,
    ) -> Self {
        self.range_sigma_mm = range_sigma_mm;
        self.range_sigma_per_mm = range_sigma_per_mm;
        self.bearing_sigma_deg = bearing_sigma_deg;
        self.heading_sigma_deg = heading_sigma_deg;
        self
    }
}
