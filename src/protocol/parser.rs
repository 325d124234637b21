// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Frame parser for the serial link to the IR transceiver.
//!
//! The transceiver forwards everything it hears as framed records:
//!
//! | Field | Size | Notes |
//! | ----- | ---- | ----- |
//! | start | 1 | [`START_BYTE`] |
//! | kind | 1 | [`KIND_RNB`] or [`KIND_MSG`] |
//! | len | 1 | body length |
//! | body | len | see below |
//! | checksum | 1 | wrapping sum of kind, len and body |
//!
//! A range/bearing body is `id: u16, range: u16, bearing: i16, heading: i16`. A message body is
//! `sender: u16, crc: u16` followed by the payload. All integers are little-endian.
//!
//! The parser is fed one byte at a time from the receive interrupt and never allocates. Outbound
//! transmit requests use the same framing with kind [`KIND_TX`] and a body of `dir_mask: u8`
//! followed by the payload; see [`encode_frame`].

use heapless::Vec;

use crate::config::MAX_MSG_LEN;
use crate::error::{Error, Result};
use crate::protocol::messages::{IrMessage, Measurement};

/// Sync byte for the protocol.
pub const START_BYTE: u8 = 0xA5;

/// Range/bearing/heading report.
pub const KIND_RNB: u8 = b'R';
/// Received message.
pub const KIND_MSG: u8 = b'M';
/// Transmit request, host to transceiver.
pub const KIND_TX: u8 = b'T';

const RNB_BODY_LEN: usize = 8;
const MSG_HEADER_LEN: usize = 4;
const MAX_BODY_LEN: usize = MSG_HEADER_LEN + MAX_MSG_LEN;

/// Largest complete frame: start, kind, len, body, checksum.
pub const MAX_FRAME_LEN: usize = MAX_BODY_LEN + 4;

/// Frame `body` as a record of `kind`.
pub fn encode_frame(kind: u8, body: &[u8]) -> Result<Vec<u8, MAX_FRAME_LEN>> {
    if body.len() > MAX_BODY_LEN {
        return Err(Error::MessageTooLong);
    }
    let len = body.len() as u8;
    let checksum = body
        .iter()
        .fold(kind.wrapping_add(len), |acc, &b| acc.wrapping_add(b));

    let mut out = Vec::new();
    // Capacity checked above
    let _ = out.extend_from_slice(&[START_BYTE, kind, len]);
    let _ = out.extend_from_slice(body);
    let _ = out.push(checksum);
    Ok(out)
}

/// Frame a transmit request for `payload` on the emitters in `dir_mask`.
pub fn encode_transmit(dir_mask: u8, payload: &[u8]) -> Result<Vec<u8, MAX_FRAME_LEN>> {
    if payload.is_empty() {
        return Err(Error::EmptyMessage);
    }
    if payload.len() > MAX_MSG_LEN {
        return Err(Error::MessageTooLong);
    }
    let mut body: Vec<u8, MAX_BODY_LEN> = Vec::new();
    let _ = body.push(dir_mask);
    let _ = body.extend_from_slice(payload);
    encode_frame(KIND_TX, &body)
}

/// One reassembled record.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Measurement(Measurement),
    Message(IrMessage),
}

enum State {
    WaitStart,
    WaitKind,
    WaitLen { kind: u8 },
    Body { kind: u8, len: usize },
    WaitChecksum { kind: u8, len: usize },
}

pub struct Parser {
    state: State,
    checksum: u8,
    body: [u8; MAX_BODY_LEN],
    filled: usize,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    pub const fn new() -> Self {
        Self {
            state: State::WaitStart,
            checksum: 0,
            body: [0; MAX_BODY_LEN],
            filled: 0,
        }
    }

    /// Process a single incoming byte received at `now`. Returns `Some(Inbound)` if a complete,
    /// valid record was received.
    pub fn push(&mut self, byte: u8, now: u32) -> Option<Inbound> {
        match self.state {
            State::WaitStart => {
                if byte == START_BYTE {
                    self.state = State::WaitKind;
                    self.checksum = 0;
                    self.filled = 0;
                }
            }
            State::WaitKind => {
                self.checksum = self.checksum.wrapping_add(byte);
                self.state = match byte {
                    KIND_RNB | KIND_MSG => State::WaitLen { kind: byte },
                    // Unknown record kind, resync
                    _ => State::WaitStart,
                };
            }
            State::WaitLen { kind } => {
                self.checksum = self.checksum.wrapping_add(byte);
                let len = byte as usize;
                let valid = match kind {
                    KIND_RNB => len == RNB_BODY_LEN,
                    _ => len >= MSG_HEADER_LEN && len <= MAX_BODY_LEN,
                };
                self.state = if valid {
                    State::Body { kind, len }
                } else {
                    State::WaitStart
                };
            }
            State::Body { kind, len } => {
                self.checksum = self.checksum.wrapping_add(byte);
                self.body[self.filled] = byte;
                self.filled += 1;
                if self.filled == len {
                    self.state = State::WaitChecksum { kind, len };
                }
            }
            State::WaitChecksum { kind, len } => {
                let valid = byte == self.checksum;
                self.state = State::WaitStart; // Reset for next record

                if valid {
                    return self.decode(kind, len, now);
                }
            }
        }
        None
    }

    fn decode(&self, kind: u8, len: usize, now: u32) -> Option<Inbound> {
        let body = &self.body[..len];
        let word = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);

        match kind {
            KIND_RNB => Some(Inbound::Measurement(Measurement::new(
                word(0),
                word(2),
                word(4) as i16,
                word(6) as i16,
            ))),
            KIND_MSG => IrMessage::new(word(0), now, word(2), &body[MSG_HEADER_LEN..])
                .ok()
                .map(Inbound::Message),
            _ => None,
        }
    }
}
