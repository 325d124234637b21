// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

//! Whole main-loop pipeline on the host: ingest queues, dedup, estimator, slot scheduler, retry
//! and transmitter.

use droplet::config::{DropletConfig, MEAS_QUEUE_CEILING, MSG_QUEUE_CEILING, SLOT_LENGTH_MS};
use droplet::ident::{crc16, ordinal};
use droplet::ingest::{MeasurementQueue, MessageQueue};
use droplet::localization::{BotPos, PosCovar, PositionEstimate};
use droplet::protocol::{IrMessage, Measurement, NeighborBroadcast};
use droplet::schedule::{slot_for, RetryRecord};
use droplet::services::{Clock, Transmitter};
use droplet::{App, Droplet, Error};

const NEIGHBOR: u16 = 0x0120;
const ME: u16 = 0x0029;

struct FakeClock {
    now: u32,
}

impl Clock for FakeClock {
    fn now_ms(&self) -> u32 {
        self.now
    }
}

#[derive(Default)]
struct FakeTx {
    busy: bool,
    sent: Vec<Vec<u8>>,
    refused: Vec<Vec<u8>>,
}

impl Transmitter for FakeTx {
    fn transmit(&mut self, _dir_mask: u8, payload: &[u8]) -> nb::Result<(), Error> {
        if self.busy {
            self.refused.push(payload.to_vec());
            Err(nb::Error::WouldBlock)
        } else {
            self.sent.push(payload.to_vec());
            Ok(())
        }
    }
}

#[derive(Default)]
struct Recorder {
    meas: Vec<Measurement>,
    msgs: Vec<IrMessage>,
}

impl App for Recorder {
    fn handle_meas(&mut self, meas: &Measurement) {
        self.meas.push(*meas);
    }

    fn handle_msg(&mut self, msg: &IrMessage) {
        self.msgs.push(msg.clone());
    }
}

fn neighbor_broadcast(at: u32) -> IrMessage {
    let payload = NeighborBroadcast::new(&PositionEstimate::new(
        BotPos::new(100, 200, 90),
        PosCovar::ZERO,
    ))
    .encode();
    IrMessage::new(NEIGHBOR, at, crc16(&payload), &payload).unwrap()
}

#[test]
fn test_localizes_from_neighbor_and_broadcasts_in_slot() {
    assert_eq!(ordinal(NEIGHBOR), Some(2));

    let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
    let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
    let mut clock = FakeClock { now: 0 };
    let mut bot = Droplet::new(ME, DropletConfig::default(), &meas_q, &msg_q, clock.now_ms());
    let mut app = Recorder::default();
    let mut tx = FakeTx::default();

    // Reading arrives before the broadcast it refers to; the broadcast is heard on three channels.
    clock.now = 1000;
    meas_q.enqueue(Measurement::new(NEIGHBOR, 50, 0, 90)).unwrap();
    msg_q.enqueue(neighbor_broadcast(1000)).unwrap();
    msg_q.enqueue(neighbor_broadcast(1008)).unwrap();
    msg_q.enqueue(neighbor_broadcast(1017)).unwrap();

    let report = bot.step(clock.now_ms(), &mut app, &mut tx);
    assert_eq!(report.measurements, 1);
    assert_eq!(report.messages, 1);
    assert!(meas_q.is_empty());
    assert!(msg_q.is_empty());

    assert_eq!(app.meas.len(), 1);
    assert_eq!(app.msgs.len(), 1);
    assert_eq!(app.msgs[0].attempts, 3);

    let est = *bot.estimate();
    assert!(est.is_defined());
    assert_eq!(est.pos, BotPos::new(50, 200, 0));

    // Zero neighbor covariance: only the sensor noise remains.
    let cfg = DropletConfig::default();
    let sr = cfg.range_sigma_mm + cfg.range_sigma_per_mm * 50.0;
    assert!((est.covar.xx() - sr * sr).abs() < 1.0);
    assert!((est.covar.oo() - cfg.heading_sigma_deg * cfg.heading_sigma_deg).abs() < 1.0);

    // Nothing goes out before our slot.
    let slot = slot_for(ME, DropletConfig::default().slots_per_frame);
    let slot_at = slot as u32 * SLOT_LENGTH_MS;
    assert!(slot_at > clock.now);
    assert!(tx.sent.is_empty());

    clock.now = slot_at;
    let report = bot.step(clock.now_ms(), &mut app, &mut tx);
    assert_eq!(report.broadcasts, 1);
    assert_eq!(tx.sent.len(), 1);

    let ours = NeighborBroadcast::decode(&tx.sent[0]).unwrap();
    assert_eq!(ours.pos, BotPos::new(50, 200, 0));

    // Same slot, same frame: no second broadcast.
    clock.now += 1;
    bot.step(clock.now_ms(), &mut app, &mut tx);
    assert_eq!(tx.sent.len(), 1);
}

#[test]
fn test_undefined_neighbor_is_ignored() {
    let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
    let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
    let mut bot = Droplet::new(ME, DropletConfig::default(), &meas_q, &msg_q, 0);
    let mut app = Recorder::default();

    let payload = NeighborBroadcast::new(&PositionEstimate::UNDEFINED).encode();
    msg_q
        .enqueue(IrMessage::new(NEIGHBOR, 10, crc16(&payload), &payload).unwrap())
        .unwrap();
    bot.step(10, &mut app, &mut FakeTx::default());

    meas_q.enqueue(Measurement::new(NEIGHBOR, 50, 0, 90)).unwrap();
    bot.step(20, &mut app, &mut FakeTx::default());

    assert!(!bot.estimate().is_defined());
    // Still forwarded to the application
    assert_eq!(app.msgs.len(), 1);
    assert_eq!(app.meas.len(), 1);
}

#[test]
fn test_busy_channel_retries_are_bounded() {
    let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
    let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
    let cfg = DropletConfig::default();
    let mut bot = Droplet::new(ME, cfg, &meas_q, &msg_q, 0);
    let mut tx = FakeTx {
        busy: true,
        ..FakeTx::default()
    };

    bot.send(RetryRecord::targeted(b"ping", NEIGHBOR, 50, 0b000001).unwrap(), 0)
        .unwrap();

    let mut now = 0;
    while now < cfg.frame_length_ms() * 8 {
        bot.step(now, &mut (), &mut tx);
        now += 100;
    }

    let pings = tx.refused.iter().filter(|p| p.as_slice() == b"ping").count();
    assert_eq!(pings, cfg.max_attempts as usize);
    assert!(bot.retry().is_empty());
    assert!(tx.sent.is_empty());
}

#[test]
fn test_queue_pressure_is_counted_not_fatal() {
    let meas_q = MeasurementQueue::new(MEAS_QUEUE_CEILING);
    let msg_q = MessageQueue::new(MSG_QUEUE_CEILING);
    let mut bot = Droplet::new(ME, DropletConfig::default(), &meas_q, &msg_q, 0);
    let mut app = Recorder::default();

    let mut accepted = 0;
    for i in 0..64 {
        if meas_q.enqueue(Measurement::new(NEIGHBOR, 50, (i % 90) as i16, 0)).is_ok() {
            accepted += 1;
        }
    }
    assert!(accepted < 64);
    assert_eq!(meas_q.dropped() as usize, 64 - accepted);

    let report = bot.step(1, &mut app, &mut FakeTx::default());
    assert_eq!(report.measurements, accepted);
    assert!(meas_q.is_empty());
}
