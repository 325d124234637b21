// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Bounded retransmission with exponential backoff.
//!
//! Each outbound payload becomes a [`RetryRecord`]. On every broadcast opportunity the manager
//! tries the records that are due. A record leaves the backlog when the transmitter accepts it or
//! when it has used all of its attempts.

use heapless::Vec;

use crate::config::{DropletConfig, MAX_MSG_LEN};
use crate::error::{Error, Result};
use crate::ident::DropletId;
use crate::localization::angle::{dir_from_angle, wrap_deg};
use crate::protocol::Measurement;
use crate::services::{time_reached, Transmitter, ALL_DIRS};

/// One outbound payload and its retry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryRecord {
    payload: Vec<u8, MAX_MSG_LEN>,
    /// Addressee, or `None` for a broadcast.
    pub target: Option<DropletId>,
    /// Expected range to the addressee in mm, 0 if unknown.
    pub range: u16,
    /// Emitters to fire.
    pub dir_mask: u8,
    attempts: u8,
    next_retry_ms: u32,
}

impl RetryRecord {
    /// Broadcast `payload` on all emitters.
    pub fn broadcast(payload: &[u8]) -> Result<Self> {
        Ok(Self {
            payload: Vec::from_slice(payload).map_err(|_| Error::MessageTooLong)?,
            target: None,
            range: 0,
            dir_mask: ALL_DIRS,
            attempts: 0,
            next_retry_ms: 0,
        })
    }

    /// Address `payload` to `target` at `range` mm through the emitters in `dir_mask`.
    pub fn targeted(payload: &[u8], target: DropletId, range: u16, dir_mask: u8) -> Result<Self> {
        let mut rec = Self::broadcast(payload)?;
        rec.target = Some(target);
        rec.range = range;
        rec.dir_mask = dir_mask;
        Ok(rec)
    }

    /// Address `payload` to the neighbor seen in `meas`, firing only the emitter that faces it.
    pub fn toward(payload: &[u8], meas: &Measurement) -> Result<Self> {
        let dir = dir_from_angle(wrap_deg(meas.bearing as i32));
        Self::targeted(payload, meas.id, meas.range, 1 << dir)
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Attempts made so far.
    #[inline]
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    #[inline]
    pub fn next_retry_ms(&self) -> u32 {
        self.next_retry_ms
    }
}

/// Outcome counts of one [`RetryManager::on_opportunity`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    pub sent: usize,
    pub deferred: usize,
    pub abandoned: usize,
}

pub struct RetryManager<const N: usize> {
    records: Vec<RetryRecord, N>,
    max_attempts: u8,
    base_delay_ms: u32,
    max_delay_ms: u32,
}

impl<const N: usize> RetryManager<N> {
    pub fn new(cfg: &DropletConfig) -> Self {
        Self {
            records: Vec::new(),
            max_attempts: cfg.max_attempts.max(1),
            base_delay_ms: cfg.base_delay_ms,
            max_delay_ms: cfg.max_delay_ms,
        }
    }

    /// Backoff after the `attempts`-th failed attempt.
    #[inline]
    pub fn backoff_ms(&self, attempts: u8) -> u32 {
        backoff(self.base_delay_ms, self.max_delay_ms, attempts)
    }

    /// Add a record, due immediately.
    pub fn submit(&mut self, mut record: RetryRecord, now: u32) -> Result<()> {
        record.attempts = 0;
        record.next_retry_ms = now;
        self.records
            .push(record)
            .map_err(|_| Error::RetryBacklogFull)
    }

    /// Submit a broadcast that supersedes any pending broadcast with the same flag byte.
    /// Returns how many pending records were replaced.
    pub fn submit_latest(&mut self, record: RetryRecord, now: u32) -> Result<usize> {
        let before = self.records.len();
        if record.target.is_none() {
            let flag = record.payload.last().copied();
            self.records
                .retain(|r| r.target.is_some() || r.payload.last().copied() != flag);
        }
        let replaced = before - self.records.len();
        self.submit(record, now)?;
        Ok(replaced)
    }

    /// Try every due record once, in submission order.
    pub fn on_opportunity<T: Transmitter>(&mut self, now: u32, tx: &mut T) -> RetryReport {
        let mut report = RetryReport::default();
        let (max_attempts, base, cap) = (self.max_attempts, self.base_delay_ms, self.max_delay_ms);
        let mut i = 0;

        while i < self.records.len() {
            let rec = &mut self.records[i];
            if !time_reached(now, rec.next_retry_ms) || rec.attempts >= max_attempts {
                i += 1;
                continue;
            }

            rec.attempts += 1;
            match tx.transmit(rec.dir_mask, &rec.payload) {
                Ok(()) => {
                    self.records.remove(i);
                    report.sent += 1;
                }
                Err(err) => {
                    if let nb::Error::Other(e) = err {
                        log::debug!(target: "droplet::schedule", "transmit failed: {}", e);
                    }
                    if rec.attempts >= max_attempts {
                        log::debug!(
                            target: "droplet::schedule",
                            "dropping outbound record after {} attempts",
                            rec.attempts
                        );
                        self.records.remove(i);
                        report.abandoned += 1;
                    } else {
                        rec.next_retry_ms = now.wrapping_add(backoff(base, cap, rec.attempts));
                        report.deferred += 1;
                        i += 1;
                    }
                }
            }
        }

        report
    }

    /// Drop every pending record, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let n = self.records.len();
        self.records.clear();
        n
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RetryRecord> {
        self.records.iter()
    }
}

/// Delay before the next try once `attempts` tries have failed: `base * 2^(attempts - 1)`,
/// capped at `cap`. The first retry waits `base`, so the gap after try `k` is never shorter than
/// `base * 2^(k - 1)`.
fn backoff(base: u32, cap: u32, attempts: u8) -> u32 {
    let shift = attempts.saturating_sub(1).min(31) as u32;
    base.checked_mul(1 << shift).unwrap_or(u32::MAX).min(cap)
}
