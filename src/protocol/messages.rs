// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Inbound item types and the neighbor broadcast wire layout.

use heapless::Vec;

use crate::config::MAX_MSG_LEN;
use crate::error::{Error, Result};
use crate::ident::DropletId;
use crate::localization::{BotPos, PosCovar, PositionEstimate};

/// Flag byte of a neighbor position broadcast.
pub const BOT_MEAS_MSG_FLAG: u8 = b'X';

/// One locally sensed range/bearing/heading reading of a neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Measurement {
    /// Sensed neighbor.
    pub id: DropletId,
    /// Range (mm).
    pub range: u16,
    /// Bearing of the neighbor in this robot's frame (deg).
    pub bearing: i16,
    /// Neighbor heading relative to this robot's heading (deg).
    pub heading: i16,
}

impl Measurement {
    pub const fn new(id: DropletId, range: u16, bearing: i16, heading: i16) -> Self {
        Self {
            id,
            range,
            bearing,
            heading,
        }
    }
}

/// Message as delivered by the IR layer: payload plus envelope fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrMessage {
    payload: Vec<u8, MAX_MSG_LEN>,
    /// Sending robot.
    pub sender: DropletId,
    /// Clock value at reception.
    pub arrival_time: u32,
    /// Checksum computed by the IR layer.
    pub crc: u16,
    /// Channels on which this message was heard so far.
    pub attempts: u8,
}

impl IrMessage {
    /// Copy `payload` into a new message. Empty payloads are allowed here and rejected at queue
    /// admission.
    pub fn new(sender: DropletId, arrival_time: u32, crc: u16, payload: &[u8]) -> Result<Self> {
        let payload = Vec::from_slice(payload).map_err(|_| Error::MessageTooLong)?;
        Ok(Self {
            payload,
            sender,
            arrival_time,
            crc,
            attempts: 1,
        })
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Message family flag, carried in the last payload byte.
    #[inline]
    pub fn flag(&self) -> Option<u8> {
        self.payload.last().copied()
    }
}

/// Position broadcast sent once per frame by every robot.
///
/// Wire layout, little-endian, no padding:
///
/// | Offset | Size | Field |
/// | ------ | ---- | ----- |
/// | 0 | 6 | `x`, `y`, `o` as `i16` |
/// | 6 | 12 | covariance words `xx, xy, xo, yy, yo, oo` |
/// | 18 | 1 | flag (`'X'`) |
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborBroadcast {
    pub pos: BotPos,
    pub covar: PosCovar,
    pub flag: u8,
}

impl NeighborBroadcast {
    pub const WIRE_LEN: usize = 19;

    pub fn new(estimate: &PositionEstimate) -> Self {
        Self {
            pos: estimate.pos,
            covar: estimate.covar,
            flag: BOT_MEAS_MSG_FLAG,
        }
    }

    #[inline]
    pub fn estimate(&self) -> PositionEstimate {
        PositionEstimate::new(self.pos, self.covar)
    }

    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let mut buf = [0u8; Self::WIRE_LEN];
        buf[0..2].copy_from_slice(&self.pos.x.to_le_bytes());
        buf[2..4].copy_from_slice(&self.pos.y.to_le_bytes());
        buf[4..6].copy_from_slice(&self.pos.o.to_le_bytes());
        for (i, word) in self.covar.to_dense().iter().enumerate() {
            let at = 6 + 2 * i;
            buf[at..at + 2].copy_from_slice(&word.to_le_bytes());
        }
        buf[18] = self.flag;
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::WIRE_LEN {
            return Err(Error::InvalidLength);
        }
        if buf[18] != BOT_MEAS_MSG_FLAG {
            return Err(Error::WrongFlag(buf[18]));
        }

        let word = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let pos = BotPos::new(word(0) as i16, word(2) as i16, word(4) as i16);
        let mut dense = [0u16; 6];
        for (i, w) in dense.iter_mut().enumerate() {
            *w = word(6 + 2 * i);
        }

        Ok(Self {
            pos,
            covar: PosCovar::from_dense(&dense),
            flag: buf[18],
        })
    }

    /// True if `msg` looks like a broadcast: right length and flag.
    #[inline]
    pub fn matches(msg: &IrMessage) -> bool {
        msg.len() == Self::WIRE_LEN && msg.flag() == Some(BOT_MEAS_MSG_FLAG)
    }
}
