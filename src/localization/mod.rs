// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! # Localization
//!
//! Peer-relative pose estimation from range/bearing/heading readings.
//!
//! ## Modules
//!
//! - [`pose`] - Pose, covariance and estimate value types.
//! - [`estimator`] - Seed-then-fuse pose filter fed by neighbor broadcasts.
//! - [`angle`] - Degree wrapping and emitter sector lookup.
//! - [`matrix`] - 3×3 matrix helpers.
//! - [`color`] - Status-LED color of the estimate.

pub mod angle;
pub mod color;
pub mod estimator;
pub mod matrix;
pub mod pose;

pub use angle::dir_from_angle;
pub use color::{pos_color, Arena};
pub use estimator::{Estimator, FusionOutcome, NoiseModel};
pub use pose::{BotPos, PosCovar, PositionEstimate, UNDF};
