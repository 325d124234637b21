// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Error types shared by every layer of the Droplet firmware.

use core::fmt;

/// Result type for Droplet operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for Droplet operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Admitting the item would exceed the queue's slot count or byte ceiling.
    QueueFull,

    /// Message with a zero-length payload.
    EmptyMessage,

    /// Message payload longer than the envelope allows.
    MessageTooLong,

    /// Bearing or heading outside the accepted angular range.
    AngleOutOfRange,

    /// Wire payload has the wrong size for its type.
    InvalidLength,

    /// Wire payload carries an unexpected message flag.
    WrongFlag(u8),

    /// Position estimate contains the undefined sentinel.
    UndefinedPosition,

    /// Retry manager has no room for another outbound record.
    RetryBacklogFull,

    /// Main loop fell behind the slot schedule.
    SchedulerDesync,

    /// IR link refused the frame.
    ChannelBusy,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::QueueFull => write!(f, "Queue full"),
            Error::EmptyMessage => write!(f, "Message length 0"),
            Error::MessageTooLong => write!(f, "Message too long"),
            Error::AngleOutOfRange => write!(f, "Angle out of range"),
            Error::InvalidLength => write!(f, "Invalid payload length"),
            Error::WrongFlag(flag) => write!(f, "Unexpected message flag 0x{:02X}", flag),
            Error::UndefinedPosition => write!(f, "Position undefined"),
            Error::RetryBacklogFull => write!(f, "Retry backlog full"),
            Error::SchedulerDesync => write!(f, "Scheduler desynchronized"),
            Error::ChannelBusy => write!(f, "Channel busy"),
        }
    }
}
