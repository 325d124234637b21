// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Fixed 3×3 matrix helpers for the pose filter.

pub type Mat3 = [[f32; 3]; 3];

pub const ZERO: Mat3 = [[0.0; 3]; 3];

pub const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Determinants below this are treated as singular.
const SINGULAR_EPS: f32 = 1e-9;

pub fn add(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[i][j] + b[i][j];
        }
    }
    out
}

pub fn sub(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[i][j] - b[i][j];
        }
    }
    out
}

pub fn mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

pub fn transpose(a: &Mat3) -> Mat3 {
    let mut out = ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out[i][j] = a[j][i];
        }
    }
    out
}

pub fn mul_vec(a: &Mat3, v: &[f32; 3]) -> [f32; 3] {
    [
        a[0][0] * v[0] + a[0][1] * v[1] + a[0][2] * v[2],
        a[1][0] * v[0] + a[1][1] * v[1] + a[1][2] * v[2],
        a[2][0] * v[0] + a[2][1] * v[1] + a[2][2] * v[2],
    ]
}

/// `J · A · Jᵀ`
pub fn sandwich(j: &Mat3, a: &Mat3) -> Mat3 {
    mul(&mul(j, a), &transpose(j))
}

/// Average of `a` and its transpose.
pub fn symmetrize(a: &Mat3) -> Mat3 {
    let mut out = *a;
    for i in 0..3 {
        for j in (i + 1)..3 {
            let m = 0.5 * (a[i][j] + a[j][i]);
            out[i][j] = m;
            out[j][i] = m;
        }
    }
    out
}

pub fn det(a: &Mat3) -> f32 {
    a[0][0] * (a[1][1] * a[2][2] - a[1][2] * a[2][1])
        - a[0][1] * (a[1][0] * a[2][2] - a[1][2] * a[2][0])
        + a[0][2] * (a[1][0] * a[2][1] - a[1][1] * a[2][0])
}

/// Inverse by adjugate. `None` if the matrix is singular.
pub fn inverse(a: &Mat3) -> Option<Mat3> {
    let d = det(a);
    if !(d.is_finite() && (d > SINGULAR_EPS || d < -SINGULAR_EPS)) {
        return None;
    }
    let inv_d = 1.0 / d;

    let mut out = ZERO;
    out[0][0] = (a[1][1] * a[2][2] - a[1][2] * a[2][1]) * inv_d;
    out[0][1] = (a[0][2] * a[2][1] - a[0][1] * a[2][2]) * inv_d;
    out[0][2] = (a[0][1] * a[1][2] - a[0][2] * a[1][1]) * inv_d;
    out[1][0] = (a[1][2] * a[2][0] - a[1][0] * a[2][2]) * inv_d;
    out[1][1] = (a[0][0] * a[2][2] - a[0][2] * a[2][0]) * inv_d;
    out[1][2] = (a[0][2] * a[1][0] - a[0][0] * a[1][2]) * inv_d;
    out[2][0] = (a[1][0] * a[2][1] - a[1][1] * a[2][0]) * inv_d;
    out[2][1] = (a[0][1] * a[2][0] - a[0][0] * a[2][1]) * inv_d;
    out[2][2] = (a[0][0] * a[1][1] - a[0][1] * a[1][0]) * inv_d;
    Some(out)
}
