// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Debug USART and the `log` backend built on it.
//!
//! Every record is written as `[LEVEL] target: message` followed by CRLF.
//!
//! To access the terminal on the host machine, connect to the debug USB port and use
//! ```text
//! $ screen /dev/tty.usbmodem* 115200
//! ```
//!
//! To close the debug terminal, press `Ctrl+A` then `Ctrl+\` then `y`.

use core::cell::RefCell;
use core::fmt::{self, Write};

use critical_section::Mutex;
use log::{LevelFilter, Log, Metadata, Record};
use nb::block;
use stm32f7xx_hal::{
    prelude::*,
    serial::{Instance, Tx},
};

/// Blocking writer over the transmit half of a USART.
pub struct Usart<U: Instance> {
    tx: Tx<U>,
}

impl<U: Instance> Usart<U> {
    pub fn new(tx: Tx<U>) -> Self {
        Self { tx }
    }

    #[inline]
    pub fn write_byte(&mut self, b: u8) {
        let _ = block!(self.tx.write(b));
    }

    pub fn write_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            self.write_byte(b);
        }
    }

    /// Block until the hardware TX FIFO/drain is flushed.
    #[inline]
    pub fn flush(&mut self) {
        let _ = block!(self.tx.flush());
    }
}

impl<U: Instance> fmt::Write for Usart<U> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Usart::write_str(self, s);
        Ok(())
    }
}

/// `log` backend writing to a [`Usart`].
///
/// Meant to live in a `static`. Records are only emitted from main-loop context; a record issued
/// while another is being written is dropped.
pub struct SerialLogger<U: Instance> {
    port: Mutex<RefCell<Option<Usart<U>>>>,
    level: LevelFilter,
}

impl<U: Instance + Send + 'static> SerialLogger<U> {
    pub const fn new(level: LevelFilter) -> Self {
        Self {
            port: Mutex::new(RefCell::new(None)),
            level,
        }
    }

    /// Attach `usart` and install this logger. Call once during startup, before interrupts that
    /// could log are enabled.
    pub fn init(&'static self, usart: Usart<U>) {
        critical_section::with(|cs| {
            self.port.borrow_ref_mut(cs).replace(usart);
        });
        // SAFETY: single-core startup path, no other code touches the logger yet.
        unsafe {
            let _ = log::set_logger_racy(self);
            log::set_max_level_racy(self.level);
        }
    }
}

impl<U: Instance + Send> Log for SerialLogger<U> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Interrupts stay enabled while the bytes go out.
        let Some(mut port) = critical_section::with(|cs| self.port.borrow_ref_mut(cs).take()) else {
            return;
        };
        let _ = write!(
            port,
            "[{}] {}: {}\r\n",
            record.level(),
            record.target(),
            record.args()
        );
        critical_section::with(|cs| {
            self.port.borrow_ref_mut(cs).replace(port);
        });
    }

    fn flush(&self) {
        critical_section::with(|cs| {
            if let Some(port) = self.port.borrow_ref_mut(cs).as_mut() {
                port.flush();
            }
        });
    }
}
