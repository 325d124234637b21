// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Droplet Firmware
//!
//! This crate contains the firmware core for Droplet swarm robots, written in Rust. Everything
//! except `hw` is hardware-independent and runs on the host for testing; the board support and
//! the `droplet` binary build with the `firmware` feature, targeting an STM32F767 MCU.
//!
//! ## Crate Structure
//!
//! | Module | Purpose |
//! | ------ | -------- |
//! | [`config`] | Compile-time defaults and `DropletConfig` |
//! | [`services`] | Clock and transmit traits the core consumes |
//! | [`ident`] | Robot identity from factory calibration bytes, ordered id table |
//! | [`ingest`] | Interrupt-safe measurement and message queues, duplicate suppression |
//! | [`localization`] | Peer-relative pose estimation |
//! | [`schedule`] | Broadcast slot assignment and bounded retransmission |
//! | [`protocol`] | Wire formats: pose broadcast and transceiver framing |
//! | [`runtime`] | Main-loop glue and application hooks |
//! | `hw` | MCU-level wrappers: serial logger, tick clock, IR link (`firmware` only) |
//!
//! ## Getting Started
//!
//! Run the host tests:
//!
//! ```bash
//! cargo test
//! ```
//!
//! Flash the board:
//!
//! ```bash
//! cargo run --release --features firmware --target thumbv7em-none-eabihf
//! ```
//!
//! ## License
//!
//! Licensed under the **MIT License**.
//! See the `LICENSE` file in the repository root for full terms.
//!
//! © 2025–2026 Christopher Liu

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
#[cfg(feature = "firmware")]
pub mod hw;
pub mod ident;
pub mod ingest;
pub mod localization;
pub mod protocol;
pub mod runtime;
pub mod schedule;
pub mod services;

pub use error::{Error, Result};
pub use runtime::{App, Droplet};
