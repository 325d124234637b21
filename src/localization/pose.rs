// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Pose and pose-uncertainty value types.

use core::fmt;

use micromath::F32Ext;

use super::angle::wrap_deg;
use super::matrix::{self, Mat3};

/// Sentinel marking an undefined coordinate.
pub const UNDF: i16 = i16::MIN;

/// Planar pose in millimeters (`x`, `y`) and degrees (`o`, in `[-180, 180)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BotPos {
    pub x: i16,
    pub y: i16,
    pub o: i16,
}

impl BotPos {
    pub const UNDEFINED: Self = Self {
        x: UNDF,
        y: UNDF,
        o: UNDF,
    };

    pub const fn new(x: i16, y: i16, o: i16) -> Self {
        Self { x, y, o }
    }

    /// True if none of the three fields is the sentinel.
    #[inline]
    pub fn is_defined(&self) -> bool {
        self.x != UNDF && self.y != UNDF && self.o != UNDF
    }

    /// Round and saturate a floating-point pose. The result is always defined.
    pub fn from_f32(x: f32, y: f32, o: f32) -> Self {
        Self {
            x: saturate(x),
            y: saturate(y),
            o: wrap_deg(o.round() as i32),
        }
    }

    #[inline]
    pub fn to_f32(&self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.o as f32]
    }
}

impl Default for BotPos {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

fn saturate(v: f32) -> i16 {
    if !v.is_finite() {
        return 0;
    }
    v.round().clamp((UNDF as f32) + 1.0, i16::MAX as f32) as i16
}

/// Symmetric 3×3 covariance over `(x, y, o)`, stored as its six independent entries.
///
/// Units are mm² for the position block, deg² for `oo` and mm·deg for the cross terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PosCovar {
    xx: f32,
    xy: f32,
    xo: f32,
    yy: f32,
    yo: f32,
    oo: f32,
}

impl PosCovar {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0);

    pub const fn new(xx: f32, xy: f32, xo: f32, yy: f32, yo: f32, oo: f32) -> Self {
        Self {
            xx,
            xy,
            xo,
            yy,
            yo,
            oo,
        }
    }

    pub const fn diagonal(xx: f32, yy: f32, oo: f32) -> Self {
        Self::new(xx, 0.0, 0.0, yy, 0.0, oo)
    }

    #[inline]
    pub fn xx(&self) -> f32 {
        self.xx
    }
    #[inline]
    pub fn xy(&self) -> f32 {
        self.xy
    }
    #[inline]
    pub fn xo(&self) -> f32 {
        self.xo
    }
    #[inline]
    pub fn yy(&self) -> f32 {
        self.yy
    }
    #[inline]
    pub fn yo(&self) -> f32 {
        self.yo
    }
    #[inline]
    pub fn oo(&self) -> f32 {
        self.oo
    }

    /// Diagonal entries `(xx, yy, oo)`.
    #[inline]
    pub fn variances(&self) -> [f32; 3] {
        [self.xx, self.yy, self.oo]
    }

    pub fn to_matrix(&self) -> Mat3 {
        [
            [self.xx, self.xy, self.xo],
            [self.xy, self.yy, self.yo],
            [self.xo, self.yo, self.oo],
        ]
    }

    /// Build from a full matrix, averaging the off-diagonal pairs and clamping variances at 0.
    pub fn from_matrix(m: &Mat3) -> Self {
        let s = matrix::symmetrize(m);
        Self {
            xx: s[0][0].max(0.0),
            xy: s[0][1],
            xo: s[0][2],
            yy: s[1][1].max(0.0),
            yo: s[1][2],
            oo: s[2][2].max(0.0),
        }
    }

    /// Sixteen-bit wire words: variances as saturating `u16`, cross terms as saturating `i16`
    /// reinterpreted as `u16`. Order is `xx, xy, xo, yy, yo, oo`.
    pub fn to_dense(&self) -> [u16; 6] {
        [
            dense_var(self.xx),
            dense_cross(self.xy),
            dense_cross(self.xo),
            dense_var(self.yy),
            dense_cross(self.yo),
            dense_var(self.oo),
        ]
    }

    pub fn from_dense(w: &[u16; 6]) -> Self {
        Self {
            xx: w[0] as f32,
            xy: w[1] as i16 as f32,
            xo: w[2] as i16 as f32,
            yy: w[3] as f32,
            yo: w[4] as i16 as f32,
            oo: w[5] as f32,
        }
    }
}

impl Default for PosCovar {
    fn default() -> Self {
        Self::ZERO
    }
}

fn dense_var(v: f32) -> u16 {
    if !v.is_finite() {
        return u16::MAX;
    }
    v.round().clamp(0.0, u16::MAX as f32) as u16
}

fn dense_cross(v: f32) -> u16 {
    if !v.is_finite() {
        return 0;
    }
    (v.round().clamp(i16::MIN as f32, i16::MAX as f32) as i16) as u16
}

impl fmt::Display for PosCovar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.1} {:.1} {:.1} | {:.1} {:.1} | {:.1}]",
            self.xx, self.xy, self.xo, self.yy, self.yo, self.oo
        )
    }
}

/// Pose together with its uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionEstimate {
    pub pos: BotPos,
    pub covar: PosCovar,
}

impl PositionEstimate {
    pub const UNDEFINED: Self = Self {
        pos: BotPos::UNDEFINED,
        covar: PosCovar::ZERO,
    };

    pub const fn new(pos: BotPos, covar: PosCovar) -> Self {
        Self { pos, covar }
    }

    #[inline]
    pub fn is_defined(&self) -> bool {
        self.pos.is_defined()
    }
}
