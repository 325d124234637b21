// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Angle helpers. Angles are whole degrees; the canonical range is `[-180, 180)`.

use crate::error::{Error, Result};

/// Largest raw bearing or heading magnitude accepted from the sensing layer.
pub const MAX_RAW_ANGLE: i16 = 360;

/// Wrap an angle in degrees into `[-180, 180)`.
#[inline]
pub fn wrap_deg(angle: i32) -> i16 {
    ((angle + 180).rem_euclid(360) - 180) as i16
}

/// Floating-point variant of [`wrap_deg`].
pub fn wrap_deg_f32(mut angle: f32) -> f32 {
    if !angle.is_finite() {
        return 0.0;
    }
    while angle >= 180.0 {
        angle -= 360.0;
    }
    while angle < -180.0 {
        angle += 360.0;
    }
    angle
}

/// Validate a raw sensor angle and normalize it.
pub fn check_angle(raw: i16) -> Result<i16> {
    if !(-MAX_RAW_ANGLE..=MAX_RAW_ANGLE).contains(&raw) {
        return Err(Error::AngleOutOfRange);
    }
    Ok(wrap_deg(raw as i32))
}

/// 60° emitter sector facing `angle`. Always non-negative, `0..=5` for angles in `-180..=180`.
#[inline]
pub fn dir_from_angle(angle: i16) -> u8 {
    let a = angle as i32;
    let shifted = a - if a > 0 { 360 } else { 0 };
    (shifted / 60).unsigned_abs() as u8
}

#[inline]
pub fn deg_to_rad(deg: f32) -> f32 {
    deg * (core::f32::consts::PI / 180.0)
}
