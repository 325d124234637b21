// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

pub mod calib;
pub mod clock;
pub mod ir_link;
pub mod usart;

pub use calib::read_droplet_id;
pub use clock::SysTickClock;
pub use ir_link::{IrReceiver, IrTransmitter};
pub use usart::{SerialLogger, Usart};
