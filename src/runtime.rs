// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Main-loop glue.
//!
//! [`Droplet`] owns the localization and scheduling state and borrows the two ingest queues the
//! interrupt handlers fill. One call to [`Droplet::step`] is one main-loop iteration:
//!
//! 1. drain the measurement queue into the estimator and the application,
//! 2. drain the message queue with duplicate suppression, feeding pose broadcasts to the
//!    estimator and every message to the application,
//! 3. advance the slot schedule, broadcasting the pose and retrying outbound records when this
//!    robot's slot opens.

use crate::config::{DropletConfig, RETRY_SLOTS};
use crate::error::Error;
use crate::ident::DropletId;
use crate::ingest::{MeasurementQueue, MessageQueue, QueueStats};
use crate::localization::{pos_color, Arena, Estimator, PositionEstimate};
use crate::protocol::{IrMessage, Measurement, NeighborBroadcast};
use crate::schedule::{RetryManager, RetryRecord, SlotEvent, SlotScheduler};
use crate::services::Transmitter;

/// Application hooks. Both default to doing nothing.
pub trait App {
    /// Called for every accepted measurement, after the estimator has seen it.
    fn handle_meas(&mut self, _meas: &Measurement) {}

    /// Called once per logical message, after duplicates are folded in.
    fn handle_msg(&mut self, _msg: &IrMessage) {}
}

impl App for () {}

/// Work done by one [`Droplet::step`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    pub measurements: usize,
    pub messages: usize,
    pub broadcasts: usize,
    pub desync: bool,
}

pub struct Droplet<'q> {
    id: DropletId,
    config: DropletConfig,
    meas_queue: &'q MeasurementQueue,
    msg_queue: &'q MessageQueue,
    estimator: Estimator,
    scheduler: SlotScheduler,
    retry: RetryManager<RETRY_SLOTS>,
    meas_seen: QueueStats,
    msg_seen: QueueStats,
}

impl<'q> Droplet<'q> {
    pub fn new(
        id: DropletId,
        config: DropletConfig,
        meas_queue: &'q MeasurementQueue,
        msg_queue: &'q MessageQueue,
        now: u32,
    ) -> Self {
        log::info!(
            target: "droplet::schedule",
            "{:04X}: slot {} of {}",
            id,
            crate::schedule::slot_for(id, config.slots_per_frame),
            config.slots_per_frame
        );
        Self {
            id,
            config,
            meas_queue,
            msg_queue,
            estimator: Estimator::new(&config),
            scheduler: SlotScheduler::new(id, &config, now),
            retry: RetryManager::new(&config),
            meas_seen: QueueStats::default(),
            msg_seen: QueueStats::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> DropletId {
        self.id
    }

    #[inline]
    pub fn config(&self) -> &DropletConfig {
        &self.config
    }

    #[inline]
    pub fn estimate(&self) -> &PositionEstimate {
        self.estimator.estimate()
    }

    #[inline]
    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    #[inline]
    pub fn estimator_mut(&mut self) -> &mut Estimator {
        &mut self.estimator
    }

    #[inline]
    pub fn scheduler(&self) -> &SlotScheduler {
        &self.scheduler
    }

    #[inline]
    pub fn retry(&self) -> &RetryManager<RETRY_SLOTS> {
        &self.retry
    }

    /// Status-LED color of the current estimate.
    pub fn status_color(&self, arena: &Arena) -> (u8, u8, u8) {
        pos_color(self.estimator.estimate(), arena)
    }

    /// Queue an application payload for transmission in this robot's next slots.
    pub fn send(&mut self, record: RetryRecord, now: u32) -> crate::Result<()> {
        self.retry.submit(record, now)
    }

    /// One main-loop iteration.
    pub fn step<A: App, T: Transmitter>(&mut self, now: u32, app: &mut A, tx: &mut T) -> StepReport {
        let mut report = StepReport {
            measurements: self.check_measurements(app),
            messages: self.check_messages(app),
            ..StepReport::default()
        };
        self.report_queue_health();
        self.run_schedule(now, tx, &mut report);
        report
    }

    /// Drain every queued measurement. Returns how many were taken.
    pub fn check_measurements<A: App>(&mut self, app: &mut A) -> usize {
        let queue = self.meas_queue;
        let estimator = &mut self.estimator;

        queue.drain_all(|meas| {
            match estimator.process_measurement(meas.id, meas.range, meas.bearing, meas.heading) {
                Ok(_) => app.handle_meas(&meas),
                Err(e) => {
                    log::debug!(target: "droplet::ingest", "{:04X}: measurement discarded: {}", meas.id, e);
                }
            }
        })
    }

    /// Drain every queued message, folding duplicates. Returns how many logical messages were
    /// delivered.
    pub fn check_messages<A: App>(&mut self, app: &mut A) -> usize {
        let queue = self.msg_queue;
        let estimator = &mut self.estimator;

        queue.drain_deduped(self.config.dedup_window, |msg| {
            if NeighborBroadcast::matches(&msg) {
                let fused = NeighborBroadcast::decode(msg.payload())
                    .and_then(|b| estimator.handle_bot_meas_msg(&b, msg.sender));
                if let Err(e) = fused {
                    log::debug!(target: "droplet::pos_msg", "{:04X}: {}", msg.sender, e);
                }
            }
            app.handle_msg(&msg);
        })
    }

    fn report_queue_health(&mut self) {
        let meas = self.meas_queue.stats();
        let msg = self.msg_queue.stats();

        if meas.dropped != self.meas_seen.dropped {
            log::warn!(
                target: "droplet::ingest",
                "measurement queue full, {} dropped",
                meas.dropped.wrapping_sub(self.meas_seen.dropped)
            );
        }
        if msg.dropped != self.msg_seen.dropped {
            log::warn!(
                target: "droplet::ingest",
                "message queue full, {} dropped",
                msg.dropped.wrapping_sub(self.msg_seen.dropped)
            );
        }
        if msg.malformed != self.msg_seen.malformed {
            log::warn!(
                target: "droplet::ingest",
                "{} malformed messages rejected",
                msg.malformed.wrapping_sub(self.msg_seen.malformed)
            );
        }

        self.meas_seen = meas;
        self.msg_seen = msg;
    }

    fn run_schedule<T: Transmitter>(&mut self, now: u32, tx: &mut T, report: &mut StepReport) {
        while let Some(event) = self.scheduler.poll(now) {
            match event {
                SlotEvent::FrameStart { frame } => {
                    log::trace!(target: "droplet::schedule", "frame {}", frame);
                    self.estimator.end_frame();
                }
                SlotEvent::SlotOpen { frame } => {
                    self.queue_broadcast(now);
                    let sent = self.retry.on_opportunity(now, tx);
                    log::trace!(
                        target: "droplet::schedule",
                        "slot {} frame {}: {} sent, {} deferred, {} abandoned",
                        self.scheduler.slot(),
                        frame,
                        sent.sent,
                        sent.deferred,
                        sent.abandoned
                    );
                    report.broadcasts += sent.sent;
                    self.scheduler.complete();
                }
                SlotEvent::Desync { missed_frames } => {
                    self.recover(now, missed_frames);
                    report.desync = true;
                }
            }
        }
    }

    /// Queue this robot's pose broadcast, if it has a pose to share. A pose still pending from an
    /// earlier slot is replaced by the current one.
    fn queue_broadcast(&mut self, now: u32) {
        let estimate = *self.estimator.estimate();
        if !estimate.is_defined() {
            return;
        }
        let payload = NeighborBroadcast::new(&estimate).encode();
        match RetryRecord::broadcast(&payload).and_then(|rec| self.retry.submit_latest(rec, now)) {
            Ok(0) => {}
            Ok(n) => log::trace!(target: "droplet::schedule", "{} stale pose broadcasts replaced", n),
            Err(e) => log::warn!(target: "droplet::schedule", "pose broadcast not queued: {}", e),
        }
    }

    /// The loop fell behind by whole frames. Dump and drop the retry backlog, restart the frame
    /// grid at `now` and age neighbor references by every frame that passed.
    fn recover(&mut self, now: u32, missed_frames: u32) {
        log::error!(
            target: "droplet::schedule",
            "{}: {} frames missed, {} outbound records pending",
            Error::SchedulerDesync,
            missed_frames,
            self.retry.len()
        );
        for rec in self.retry.iter() {
            log::error!(
                target: "droplet::schedule",
                "  {:?} dirs {:02X} attempts {} next {} len {}",
                rec.target,
                rec.dir_mask,
                rec.attempts(),
                rec.next_retry_ms(),
                rec.payload().len()
            );
        }
        self.retry.clear();
        self.scheduler.resync(now);
        self.estimator.end_frames(missed_frames.saturating_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MEAS_QUEUE_CEILING, MSG_QUEUE_CEILING};
    use crate::localization::{BotPos, PosCovar};

    #[derive(Default)]
    struct Recorder {
        meas: usize,
        msgs: std::vec::Vec<IrMessage>,
    }

    impl App for Recorder {
        fn handle_meas(&mut self, _meas: &Measurement) {
            self.meas += 1;
        }

        fn handle_msg(&mut self, msg: &IrMessage) {
            self.msgs.push(msg.clone());
        }
    }

    #[derive(Default)]
    struct SinkTx {
        busy: bool,
        sent: std::vec::Vec<std::vec::Vec<u8>>,
    }

    impl Transmitter for SinkTx {
        fn transmit(&mut self, _dir_mask: u8, payload: &[u8]) -> nb::Result<(), Error> {
            if self.busy {
                return Err(nb::Error::WouldBlock);
            }
            self.sent.push(payload.to_vec());
            Ok(())
        }
    }

    fn cfg() -> DropletConfig {
        DropletConfig::default().with_slots(10, 5)
    }

    #[test]
    fn test_duplicate_messages_delivered_once() {
        let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
        let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
        let mut bot = Droplet::new(3, cfg(), &meas_q, &msg_q, 0);

        msg_q.enqueue(IrMessage::new(7, 100, 0xAAAA, b"hi").unwrap()).unwrap();
        msg_q.enqueue(IrMessage::new(8, 105, 0xAAAA, b"hi").unwrap()).unwrap();
        msg_q.enqueue(IrMessage::new(7, 200, 0xAAAA, b"hi").unwrap()).unwrap();

        let mut app = Recorder::default();
        let report = bot.step(1, &mut app, &mut SinkTx::default());

        assert_eq!(report.messages, 2);
        assert_eq!(app.msgs.len(), 2);
        assert_eq!(app.msgs[0].attempts, 2);
        assert_eq!(app.msgs[1].arrival_time, 200);
        assert!(msg_q.is_empty());
    }

    #[test]
    fn test_rejected_measurement_not_forwarded() {
        let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
        let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
        let mut bot = Droplet::new(3, cfg(), &meas_q, &msg_q, 0);

        meas_q.enqueue(Measurement::new(9, 50, 400, 0)).unwrap();
        meas_q.enqueue(Measurement::new(9, 50, 0, 0)).unwrap();

        let mut app = Recorder::default();
        let report = bot.step(1, &mut app, &mut SinkTx::default());
        assert_eq!(report.measurements, 2);
        assert_eq!(app.meas, 1);
    }

    #[test]
    fn test_broadcast_in_own_slot_only_when_defined() {
        let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
        let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
        // id 2 -> slot 2, offset 20 ms in a 50 ms frame
        let mut bot = Droplet::new(2, cfg(), &meas_q, &msg_q, 0);
        let mut tx = SinkTx::default();

        bot.step(25, &mut (), &mut tx);
        assert!(tx.sent.is_empty());

        bot.estimator_mut()
            .anchor(BotPos::new(100, 200, 90), PosCovar::ZERO)
            .unwrap();
        bot.step(30, &mut (), &mut tx);
        assert!(tx.sent.is_empty());

        bot.step(70, &mut (), &mut tx);
        assert_eq!(tx.sent.len(), 1);
        let b = NeighborBroadcast::decode(&tx.sent[0]).unwrap();
        assert_eq!(b.pos, BotPos::new(100, 200, 90));
    }

    #[test]
    fn test_desync_flushes_backlog() {
        let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
        let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
        let mut bot = Droplet::new(2, cfg(), &meas_q, &msg_q, 0);

        bot.send(RetryRecord::broadcast(b"late").unwrap(), 0).unwrap();
        assert_eq!(bot.retry().len(), 1);

        let report = bot.step(500, &mut (), &mut SinkTx::default());
        assert!(report.desync);
        assert!(bot.retry().is_empty());
        assert_eq!(bot.scheduler().frame_start(), 500);
    }

    #[test]
    fn test_busy_channel_sends_only_latest_pose() {
        let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
        let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
        // id 2 -> slot 2, offset 20 ms in a 50 ms frame
        let mut bot = Droplet::new(2, cfg(), &meas_q, &msg_q, 0);
        let mut tx = SinkTx {
            busy: true,
            ..SinkTx::default()
        };

        for frame in 0..4u32 {
            bot.estimator_mut()
                .anchor(BotPos::new(10 * frame as i16, 0, 0), PosCovar::ZERO)
                .unwrap();
            bot.step(frame * 50 + 20, &mut (), &mut tx);
            assert_eq!(bot.retry().len(), 1);
        }

        tx.busy = false;
        let report = bot.step(4 * 50 + 20, &mut (), &mut tx);
        assert_eq!(report.broadcasts, 1);
        assert_eq!(tx.sent.len(), 1);
        let b = NeighborBroadcast::decode(&tx.sent[0]).unwrap();
        assert_eq!(b.pos, BotPos::new(30, 0, 0));
        assert!(bot.retry().is_empty());
    }

    #[test]
    fn test_desync_ages_neighbors_by_missed_frames() {
        let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
        let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
        let mut bot = Droplet::new(2, cfg(), &meas_q, &msg_q, 0);

        let payload = NeighborBroadcast::new(&PositionEstimate::new(
            BotPos::new(100, 200, 90),
            PosCovar::ZERO,
        ))
        .encode();
        msg_q.enqueue(IrMessage::new(7, 1, 0xBEEF, &payload).unwrap()).unwrap();
        bot.step(1, &mut (), &mut SinkTx::default());
        assert!(bot.estimator().neighbor(7).is_some());

        // Ten frames of silence, well past the stale limit
        let report = bot.step(500, &mut (), &mut SinkTx::default());
        assert!(report.desync);
        assert!(bot.estimator().neighbor(7).is_none());
    }

    #[test]
    fn test_status_color_follows_estimate() {
        let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
        let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
        let mut bot = Droplet::new(2, cfg(), &meas_q, &msg_q, 0);
        let arena = Arena::default();
        assert_eq!(bot.status_color(&arena), (0, 0, 0));

        bot.estimator_mut()
            .anchor(BotPos::new(1000, 0, 0), PosCovar::ZERO)
            .unwrap();
        assert_eq!(bot.status_color(&arena), (255, 0, 255));
    }
}
