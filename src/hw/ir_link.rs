// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Serial link to the IR transceiver.
//!
//! The transceiver handles modulation and the six emitter/receiver pairs. Received records arrive
//! framed on RX and are reassembled by [`Parser`] inside the USART interrupt; outbound payloads
//! are framed with [`encode_transmit`] and written on TX.

use nb::block;
use stm32f7xx_hal::{
    prelude::*,
    serial::{Instance, Rx, Tx},
};

use crate::error::Error;
use crate::ingest::{MeasurementQueue, MessageQueue};
use crate::protocol::{encode_transmit, Inbound, Parser};
use crate::services::Transmitter;

/// Receive half: feeds the ingest queues from interrupt context.
pub struct IrReceiver<U: Instance> {
    rx: Rx<U>,
    parser: Parser,
}

impl<U: Instance> IrReceiver<U> {
    pub fn new(rx: Rx<U>) -> Self {
        Self {
            rx,
            parser: Parser::new(),
        }
    }

    /// Drain the receive register. Call from the USART interrupt.
    ///
    /// Queue rejections are recorded by the queues' counters.
    pub fn on_interrupt(&mut self, now: u32, meas: &MeasurementQueue, msgs: &MessageQueue) {
        while let Ok(byte) = self.rx.read() {
            match self.parser.push(byte, now) {
                Some(Inbound::Measurement(m)) => {
                    let _ = meas.enqueue(m);
                }
                Some(Inbound::Message(m)) => {
                    let _ = msgs.enqueue(m);
                }
                None => {}
            }
        }
    }
}

/// Transmit half.
pub struct IrTransmitter<U: Instance> {
    tx: Tx<U>,
}

impl<U: Instance> IrTransmitter<U> {
    pub fn new(tx: Tx<U>) -> Self {
        Self { tx }
    }
}

impl<U: Instance> Transmitter for IrTransmitter<U> {
    fn transmit(&mut self, dir_mask: u8, payload: &[u8]) -> nb::Result<(), Error> {
        let frame = encode_transmit(dir_mask, payload).map_err(nb::Error::Other)?;
        let Some((&first, rest)) = frame.split_first() else {
            return Ok(());
        };

        // Transmitter still shifting out the previous frame
        self.tx.write(first).map_err(|e| match e {
            nb::Error::WouldBlock => nb::Error::WouldBlock,
            nb::Error::Other(_) => nb::Error::Other(Error::ChannelBusy),
        })?;

        for &b in rest {
            block!(self.tx.write(b)).map_err(|_| nb::Error::Other(Error::ChannelBusy))?;
        }
        Ok(())
    }
}
