// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

pub mod messages;
pub mod parser;

pub use messages::{IrMessage, Measurement, NeighborBroadcast, BOT_MEAS_MSG_FLAG};
pub use parser::{encode_transmit, Inbound, Parser};
