// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Status-LED color for the current estimate.
//!
//! Red follows `x` and green follows `y` across the arena; blue shows confidence, bright when the
//! position standard deviation is small. An undefined estimate is shown as off.

use micromath::F32Ext;

use super::pose::PositionEstimate;

/// Arena extent used to scale the color channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arena {
    pub width_mm: i16,
    pub height_mm: i16,
}

impl Default for Arena {
    fn default() -> Self {
        Self {
            width_mm: 1000,
            height_mm: 1000,
        }
    }
}

/// Position standard deviation (mm) at or above which blue is fully off.
const SIGMA_DARK_MM: f32 = 255.0;

pub fn pos_color(est: &PositionEstimate, arena: &Arena) -> (u8, u8, u8) {
    if !est.is_defined() {
        return (0, 0, 0);
    }

    let r = scale(est.pos.x, arena.width_mm);
    let g = scale(est.pos.y, arena.height_mm);

    let sigma = (est.covar.xx() + est.covar.yy()).max(0.0).sqrt();
    let b = (255.0 * (1.0 - sigma / SIGMA_DARK_MM)).clamp(0.0, 255.0) as u8;

    (r, g, b)
}

fn scale(v: i16, extent: i16) -> u8 {
    if extent <= 0 {
        return 0;
    }
    let frac = v as f32 / extent as f32;
    (255.0 * frac).clamp(0.0, 255.0) as u8
}
