// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Decentralized pose estimator.
//!
//! Each robot keeps its own pose estimate with a 3×3 covariance. Neighbors broadcast theirs once
//! per frame; whenever this robot senses a neighbor's range, bearing and heading, the neighbor's
//! last broadcast is projected through the reading to give a prediction of this robot's pose,
//! which is then fused into the current estimate.
//!
//! Fusion is the inverse-covariance-weighted average of the current estimate and the prediction:
//!
//! ```text
//! K  = P (P + R)⁻¹
//! s' = s + K (z - s)
//! P' = P - K P        = (P⁻¹ + R⁻¹)⁻¹
//! ```
//!
//! where `R` is the prediction covariance, obtained by propagating both the neighbor covariance and
//! the sensor noise through the projection. The first prediction received while the estimate is
//! still undefined seeds it directly (`s' = z`, `P' = R`).

use heapless::Vec;
use micromath::F32Ext;

use crate::config::{DropletConfig, NEIGHBOR_SLOTS};
use crate::error::{Error, Result};
use crate::ident::DropletId;
use crate::protocol::{Measurement, NeighborBroadcast};

use super::angle::{check_angle, deg_to_rad, wrap_deg, wrap_deg_f32};
use super::matrix::{self, Mat3};
use super::pose::{BotPos, PosCovar, PositionEstimate};

/// What a call did to the self-estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionOutcome {
    /// Estimate was undefined and has been initialized from the prediction.
    Seeded,
    /// Prediction blended into the estimate.
    Fused,
    /// Reading kept until the neighbor's broadcast arrives.
    Parked,
    /// Nothing changed.
    Ignored,
}

/// Sensor noise, as standard deviations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    pub range_sigma_mm: f32,
    pub range_sigma_per_mm: f32,
    pub bearing_sigma_deg: f32,
    pub heading_sigma_deg: f32,
}

impl NoiseModel {
    pub fn from_config(cfg: &DropletConfig) -> Self {
        Self {
            range_sigma_mm: cfg.range_sigma_mm,
            range_sigma_per_mm: cfg.range_sigma_per_mm,
            bearing_sigma_deg: cfg.bearing_sigma_deg,
            heading_sigma_deg: cfg.heading_sigma_deg,
        }
    }

    /// Diagonal covariance of `(range, bearing, heading)` for a reading at `range_mm`.
    fn covariance(&self, range_mm: f32) -> Mat3 {
        let sr = self.range_sigma_mm + self.range_sigma_per_mm * range_mm;
        let sb = self.bearing_sigma_deg;
        let sh = self.heading_sigma_deg;
        [
            [sr * sr, 0.0, 0.0],
            [0.0, sb * sb, 0.0],
            [0.0, 0.0, sh * sh],
        ]
    }
}

#[derive(Debug, Clone, Copy)]
struct Neighbor {
    id: DropletId,
    estimate: PositionEstimate,
    /// Frames since the last broadcast.
    age: u8,
}

pub struct Estimator {
    me: PositionEstimate,
    /// Anchors keep their configured pose and never fuse.
    anchored: bool,
    noise: NoiseModel,
    stale_frames: u8,
    neighbors: Vec<Neighbor, NEIGHBOR_SLOTS>,
    parked: Vec<Measurement, NEIGHBOR_SLOTS>,
}

impl Estimator {
    pub fn new(cfg: &DropletConfig) -> Self {
        Self {
            me: PositionEstimate::UNDEFINED,
            anchored: false,
            noise: NoiseModel::from_config(cfg),
            stale_frames: cfg.neighbor_stale_frames,
            neighbors: Vec::new(),
            parked: Vec::new(),
        }
    }

    /// Current self-estimate.
    #[inline]
    pub fn estimate(&self) -> &PositionEstimate {
        &self.me
    }

    /// Fix this robot's pose, e.g. for a robot placed at a known spot. Anchored robots broadcast
    /// their pose but ignore readings.
    pub fn anchor(&mut self, pos: BotPos, covar: PosCovar) -> Result<()> {
        if !pos.is_defined() {
            return Err(Error::UndefinedPosition);
        }
        self.me = PositionEstimate::new(pos, covar);
        self.anchored = true;
        Ok(())
    }

    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.anchored
    }

    /// Forget the self-estimate.
    pub fn reset(&mut self) {
        self.me = PositionEstimate::UNDEFINED;
        self.anchored = false;
    }

    /// Last reference estimate received from `id`.
    pub fn neighbor(&self, id: DropletId) -> Option<&PositionEstimate> {
        self.neighbors
            .iter()
            .find(|n| n.id == id)
            .map(|n| &n.estimate)
    }

    /// Number of neighbors with a remembered reference estimate.
    #[inline]
    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Fuse one sensed reading of neighbor `id`.
    ///
    /// `range` in mm, `bearing` and `heading` in degrees. Readings with an angle outside
    /// `-360..=360` are rejected. If no broadcast from `id` is known yet, the reading is parked
    /// until one arrives in the same frame.
    pub fn process_measurement(
        &mut self,
        id: DropletId,
        range: u16,
        bearing: i16,
        heading: i16,
    ) -> Result<FusionOutcome> {
        let bearing = check_angle(bearing)?;
        let heading = check_angle(heading)?;
        let meas = Measurement::new(id, range, bearing, heading);

        if self.anchored {
            return Ok(FusionOutcome::Ignored);
        }

        let reference = match self.neighbor(id) {
            Some(est) => *est,
            None => {
                self.park(meas);
                log::trace!(target: "droplet::pos_calc", "{:04X}: parked, no reference", id);
                return Ok(FusionOutcome::Parked);
            }
        };

        Ok(self.fuse(&reference, &meas))
    }

    /// Store the broadcast of `sender` as its reference estimate and fuse any reading parked for
    /// it. Broadcasts carrying an undefined pose are discarded and leave any stored reference and
    /// parked reading of `sender` untouched.
    pub fn handle_bot_meas_msg(
        &mut self,
        msg: &NeighborBroadcast,
        sender: DropletId,
    ) -> Result<FusionOutcome> {
        if !msg.pos.is_defined() {
            log::debug!(target: "droplet::pos_msg", "{:04X}: undefined broadcast", sender);
            return Err(Error::UndefinedPosition);
        }

        let estimate = msg.estimate();
        self.remember(sender, estimate);

        let parked = self
            .parked
            .iter()
            .position(|m| m.id == sender)
            .map(|i| self.parked.swap_remove(i));

        log::debug!(
            target: "droplet::pos_msg",
            "{:04X}: ({}, {}, {}) {}",
            sender,
            estimate.pos.x,
            estimate.pos.y,
            estimate.pos.o,
            estimate.covar
        );

        match parked {
            Some(meas) if !self.anchored => Ok(self.fuse(&estimate, &meas)),
            _ => Ok(FusionOutcome::Ignored),
        }
    }

    /// Called once per frame: ages neighbor references, forgets stale ones and drops parked
    /// readings whose broadcast never came.
    pub fn end_frame(&mut self) {
        self.end_frames(1);
    }

    /// Age neighbor references by `frames` at once, as after a stall of the main loop.
    pub fn end_frames(&mut self, frames: u32) {
        let frames = frames.min(u8::MAX as u32) as u8;
        for n in self.neighbors.iter_mut() {
            n.age = n.age.saturating_add(frames);
        }
        let stale = self.stale_frames;
        self.neighbors.retain(|n| n.age < stale);
        self.parked.clear();
    }

    fn remember(&mut self, id: DropletId, estimate: PositionEstimate) {
        if let Some(n) = self.neighbors.iter_mut().find(|n| n.id == id) {
            n.estimate = estimate;
            n.age = 0;
            return;
        }

        let entry = Neighbor {
            id,
            estimate,
            age: 0,
        };
        if let Err(entry) = self.neighbors.push(entry) {
            // Full: replace the oldest reference
            if let Some(oldest) = self.neighbors.iter_mut().max_by_key(|n| n.age) {
                *oldest = entry;
            }
        }
    }

    fn park(&mut self, meas: Measurement) {
        if let Some(slot) = self.parked.iter_mut().find(|m| m.id == meas.id) {
            *slot = meas;
            return;
        }
        if self.parked.is_full() {
            self.parked.remove(0);
        }
        let _ = self.parked.push(meas);
    }

    fn fuse(&mut self, reference: &PositionEstimate, meas: &Measurement) -> FusionOutcome {
        let (z, r) = predict(reference, meas, &self.noise);

        if !self.me.is_defined() {
            self.me = PositionEstimate::new(BotPos::from_f32(z[0], z[1], z[2]), PosCovar::from_matrix(&r));
            log::debug!(
                target: "droplet::my_pos",
                "seeded from {:04X}: ({}, {}, {})",
                meas.id,
                self.me.pos.x,
                self.me.pos.y,
                self.me.pos.o
            );
            return FusionOutcome::Seeded;
        }

        let s = self.me.pos.to_f32();
        let p = self.me.covar.to_matrix();

        let s_inv = match matrix::inverse(&matrix::add(&p, &r)) {
            Some(inv) => inv,
            None => {
                log::warn!(target: "droplet::pos_calc", "{:04X}: singular innovation covariance", meas.id);
                return FusionOutcome::Ignored;
            }
        };
        let k = matrix::mul(&p, &s_inv);

        let innovation = [z[0] - s[0], z[1] - s[1], wrap_deg_f32(z[2] - s[2])];
        let ds = matrix::mul_vec(&k, &innovation);
        let p_new = matrix::sub(&p, &matrix::mul(&k, &p));

        log::trace!(
            target: "droplet::pos_calc",
            "{:04X}: z=({:.1}, {:.1}, {:.1}) dz=({:.1}, {:.1}, {:.1})",
            meas.id,
            z[0],
            z[1],
            z[2],
            ds[0],
            ds[1],
            ds[2]
        );

        self.me = PositionEstimate::new(
            BotPos::from_f32(s[0] + ds[0], s[1] + ds[1], s[2] + ds[2]),
            PosCovar::from_matrix(&p_new),
        );
        log::debug!(
            target: "droplet::my_pos",
            "({}, {}, {})",
            self.me.pos.x,
            self.me.pos.y,
            self.me.pos.o
        );
        log::trace!(target: "droplet::covar", "{}", self.me.covar);
        FusionOutcome::Fused
    }
}

/// Project a neighbor's pose through a reading of it.
///
/// Returns this robot's predicted `(x, y, o)` and the covariance of that prediction.
pub fn predict(reference: &PositionEstimate, meas: &Measurement, noise: &NoiseModel) -> ([f32; 3], Mat3) {
    let [xn, yn, _] = reference.pos.to_f32();
    let r = meas.range as f32;

    let o = wrap_deg(reference.pos.o as i32 - meas.heading as i32) as f32;
    let theta = deg_to_rad(o + meas.bearing as f32);
    let (sin, cos) = (theta.sin(), theta.cos());

    let z = [xn - r * cos, yn - r * sin, o];

    // Partial derivatives per degree of angle
    let k = deg_to_rad(1.0);
    let j_ref: Mat3 = [
        [1.0, 0.0, r * sin * k],
        [0.0, 1.0, -r * cos * k],
        [0.0, 0.0, 1.0],
    ];
    let j_meas: Mat3 = [
        [-cos, r * sin * k, -r * sin * k],
        [-sin, -r * cos * k, r * cos * k],
        [0.0, 0.0, -1.0],
    ];

    let r_cov = matrix::add(
        &matrix::sandwich(&j_ref, &reference.covar.to_matrix()),
        &matrix::sandwich(&j_meas, &noise.covariance(r)),
    );
    (z, r_cov)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimator() -> Estimator {
        Estimator::new(&DropletConfig::default())
    }

    fn broadcast(x: i16, y: i16, o: i16, covar: PosCovar) -> NeighborBroadcast {
        NeighborBroadcast::new(&PositionEstimate::new(BotPos::new(x, y, o), covar))
    }

    #[test]
    fn test_seed_equals_geometric_prediction() {
        let mut est = estimator();
        est.handle_bot_meas_msg(&broadcast(100, 200, 90, PosCovar::ZERO), 0x0120)
            .unwrap();

        let out = est.process_measurement(0x0120, 50, 0, 90).unwrap();
        assert_eq!(out, FusionOutcome::Seeded);
        assert_eq!(est.estimate().pos, BotPos::new(50, 200, 0));

        // Neighbor covariance is zero, so only sensor noise remains
        let noise = NoiseModel::from_config(&DropletConfig::default());
        let sr = noise.range_sigma_mm + noise.range_sigma_per_mm * 50.0;
        let c = est.estimate().covar;
        assert!((c.xx() - sr * sr).abs() < 1e-3);
        assert!((c.oo() - noise.heading_sigma_deg * noise.heading_sigma_deg).abs() < 1e-3);
        assert!(c.xy().abs() < 1e-3);
    }

    #[test]
    fn test_prediction_geometry() {
        let noise = NoiseModel::from_config(&DropletConfig::default());
        let reference = PositionEstimate::new(BotPos::new(0, 0, 0), PosCovar::ZERO);

        // Neighbor straight ahead at 100 mm, facing the same way: we sit 100 mm behind it
        let (z, _) = predict(&reference, &Measurement::new(1, 100, 0, 0), &noise);
        assert!((z[0] + 100.0).abs() < 1e-3);
        assert!(z[1].abs() < 1e-3);
        assert!(z[2].abs() < 1e-3);

        // Neighbor to our left, facing opposite: we face -180, neighbor bears +90 from us
        let (z, _) = predict(&reference, &Measurement::new(1, 100, 90, -180), &noise);
        assert!((z[2] - (-180.0)).abs() < 1e-3);
        assert!(z[0].abs() < 1e-2);
        assert!((z[1] - 100.0).abs() < 1e-2);
    }

    #[test]
    fn test_repeated_measurements_do_not_increase_variance() {
        let mut est = estimator();
        est.handle_bot_meas_msg(
            &broadcast(0, 0, 0, PosCovar::diagonal(4.0, 4.0, 1.0)),
            7,
        )
        .unwrap();

        est.process_measurement(7, 100, 30, 10).unwrap();
        let mut prev = est.estimate().covar.variances();

        for _ in 0..10 {
            assert_eq!(
                est.process_measurement(7, 100, 30, 10).unwrap(),
                FusionOutcome::Fused
            );
            let now = est.estimate().covar.variances();
            for i in 0..3 {
                assert!(now[i] <= prev[i] + 1e-3, "entry {} grew: {} -> {}", i, prev[i], now[i]);
            }
            prev = now;
        }
    }

    #[test]
    fn test_tighter_neighbor_pulls_harder() {
        let cfg = DropletConfig::default();

        let run = |neighbor_var: f32| {
            let mut est = Estimator::new(&cfg);
            est.handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), 1)
                .unwrap();
            est.process_measurement(1, 100, 0, 0).unwrap(); // seed at (-100, 0, 0)

            est.handle_bot_meas_msg(
                &broadcast(
                    100,
                    0,
                    0,
                    PosCovar::diagonal(neighbor_var, neighbor_var, 1.0),
                ),
                2,
            )
            .unwrap();
            // Neighbor 2 says we are at (0, 0)
            est.process_measurement(2, 100, 0, 0).unwrap();
            est.estimate().pos.x
        };

        let tight = run(1.0);
        let loose = run(10_000.0);
        assert!(tight > loose, "tight {} loose {}", tight, loose);
        assert!(tight < 0 && loose < 0);
    }

    #[test]
    fn test_undefined_neighbor_is_noop() {
        let mut est = estimator();
        let undefined = NeighborBroadcast::new(&PositionEstimate::UNDEFINED);
        assert_eq!(
            est.handle_bot_meas_msg(&undefined, 3),
            Err(Error::UndefinedPosition)
        );
        assert!(est.neighbor(3).is_none());

        // No reference: the reading waits and expires with the frame
        assert_eq!(
            est.process_measurement(3, 50, 0, 0),
            Ok(FusionOutcome::Parked)
        );
        est.end_frame();
        assert!(!est.estimate().is_defined());
    }

    #[test]
    fn test_undefined_broadcast_keeps_previous_reference() {
        let mut est = estimator();
        est.handle_bot_meas_msg(&broadcast(100, 200, 90, PosCovar::ZERO), 7)
            .unwrap();
        let undefined = NeighborBroadcast::new(&PositionEstimate::UNDEFINED);
        assert_eq!(
            est.handle_bot_meas_msg(&undefined, 7),
            Err(Error::UndefinedPosition)
        );
        assert_eq!(est.neighbor(7).unwrap().pos, BotPos::new(100, 200, 90));

        assert_eq!(
            est.process_measurement(7, 50, 0, 90),
            Ok(FusionOutcome::Seeded)
        );
        assert_eq!(est.estimate().pos, BotPos::new(50, 200, 0));
    }

    #[test]
    fn test_undefined_broadcast_keeps_parked_reading() {
        let mut est = estimator();
        est.process_measurement(7, 50, 0, 90).unwrap();
        let undefined = NeighborBroadcast::new(&PositionEstimate::UNDEFINED);
        assert!(est.handle_bot_meas_msg(&undefined, 7).is_err());

        let out = est
            .handle_bot_meas_msg(&broadcast(100, 200, 90, PosCovar::ZERO), 7)
            .unwrap();
        assert_eq!(out, FusionOutcome::Seeded);
    }

    #[test]
    fn test_out_of_range_angle_rejected() {
        let mut est = estimator();
        assert_eq!(
            est.process_measurement(3, 50, 400, 0),
            Err(Error::AngleOutOfRange)
        );
        assert_eq!(
            est.process_measurement(3, 50, 0, -361),
            Err(Error::AngleOutOfRange)
        );
    }

    #[test]
    fn test_parked_reading_fused_when_broadcast_arrives() {
        let mut est = estimator();
        assert_eq!(
            est.process_measurement(0x0120, 50, 0, 90),
            Ok(FusionOutcome::Parked)
        );
        assert!(!est.estimate().is_defined());

        let out = est
            .handle_bot_meas_msg(&broadcast(100, 200, 90, PosCovar::ZERO), 0x0120)
            .unwrap();
        assert_eq!(out, FusionOutcome::Seeded);
        assert_eq!(est.estimate().pos, BotPos::new(50, 200, 0));
    }

    #[test]
    fn test_parked_reading_expires_at_frame_end() {
        let mut est = estimator();
        est.process_measurement(9, 50, 0, 0).unwrap();
        est.end_frame();

        let out = est
            .handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), 9)
            .unwrap();
        assert_eq!(out, FusionOutcome::Ignored);
        assert!(!est.estimate().is_defined());
    }

    #[test]
    fn test_stale_neighbors_forgotten() {
        let mut est = estimator();
        est.handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), 4)
            .unwrap();
        assert!(est.neighbor(4).is_some());

        for _ in 0..DropletConfig::default().neighbor_stale_frames {
            est.end_frame();
        }
        assert!(est.neighbor(4).is_none());
        assert_eq!(est.neighbor_count(), 0);
    }

    #[test]
    fn test_long_stall_ages_neighbors_at_once() {
        let mut est = estimator();
        est.handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), 4)
            .unwrap();
        est.end_frames(1);
        assert!(est.neighbor(4).is_some());

        est.end_frames(40);
        assert_eq!(est.neighbor_count(), 0);

        // Saturates instead of wrapping
        est.handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), 5)
            .unwrap();
        est.end_frames(u32::MAX);
        assert!(est.neighbor(5).is_none());
    }

    #[test]
    fn test_neighbor_table_replaces_oldest_when_full() {
        let mut est = estimator();
        est.handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), 0)
            .unwrap();
        est.end_frame();
        for id in 1..NEIGHBOR_SLOTS as u16 {
            est.handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), id)
                .unwrap();
        }
        est.handle_bot_meas_msg(&broadcast(0, 0, 0, PosCovar::ZERO), 999)
            .unwrap();

        assert_eq!(est.neighbor_count(), NEIGHBOR_SLOTS);
        assert!(est.neighbor(0).is_none());
        assert!(est.neighbor(999).is_some());
    }

    #[test]
    fn test_anchor_ignores_readings() {
        let mut est = estimator();
        est.anchor(BotPos::new(0, 0, 0), PosCovar::ZERO).unwrap();
        est.handle_bot_meas_msg(&broadcast(500, 500, 0, PosCovar::ZERO), 1)
            .unwrap();
        assert_eq!(
            est.process_measurement(1, 50, 0, 0),
            Ok(FusionOutcome::Ignored)
        );
        assert_eq!(est.estimate().pos, BotPos::new(0, 0, 0));

        assert_eq!(
            est.anchor(BotPos::UNDEFINED, PosCovar::ZERO),
            Err(Error::UndefinedPosition)
        );
    }
}
