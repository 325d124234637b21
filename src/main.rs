// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

#![no_main]
#![no_std]

use core::cell::RefCell;

use cortex_m_rt::{entry, exception};
use critical_section::Mutex;
use log::LevelFilter;
use panic_halt as _;

use hal::{
    pac::{self, interrupt},
    prelude::*,
    serial::{Config, Event, Serial},
};
use stm32f7xx_hal as hal;

use droplet::config::{DropletConfig, MEAS_QUEUE_CEILING, MSG_QUEUE_CEILING};
use droplet::hw::{read_droplet_id, IrReceiver, IrTransmitter, SerialLogger, SysTickClock, Usart};
use droplet::ident::ordinal;
use droplet::ingest::{MeasurementQueue, MessageQueue};
use droplet::localization::Arena;
use droplet::services::Clock;
use droplet::Droplet;

static LOGGER: SerialLogger<pac::USART1> = SerialLogger::new(LevelFilter::Debug);

static MEAS_QUEUE: MeasurementQueue = MeasurementQueue::new(MEAS_QUEUE_CEILING);
static MSG_QUEUE: MessageQueue = MessageQueue::new(MSG_QUEUE_CEILING);

static IR_RX: Mutex<RefCell<Option<IrReceiver<pac::USART2>>>> = Mutex::new(RefCell::new(None));

#[entry]
fn main() -> ! {
    // Peripherals
    let (Some(dp), Some(cp)) = (pac::Peripherals::take(), cortex_m::Peripherals::take()) else {
        panic!("peripherals already taken");
    };

    // Clocks
    let rcc = dp.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    let clock = SysTickClock::start(cp.SYST, &clocks);

    // GPIO
    let gpioa = dp.GPIOA.split();

    // USART1 (DBG)
    let tx = gpioa.pa9.into_alternate::<7>();
    let rx = gpioa.pa10.into_alternate::<7>();
    let usart_cfg = Config {
        baud_rate: 115_200.bps(),
        ..Default::default()
    };
    let (dbg_tx, _) = Serial::new(dp.USART1, (tx, rx), &clocks, usart_cfg).split();
    LOGGER.init(Usart::new(dbg_tx));

    // USART2 (IR transceiver)
    let tx = gpioa.pa2.into_alternate::<7>();
    let rx = gpioa.pa3.into_alternate::<7>();
    let ir_cfg = Config {
        baud_rate: 115_200.bps(),
        ..Default::default()
    };
    let mut ir = Serial::new(dp.USART2, (tx, rx), &clocks, ir_cfg);
    ir.listen(Event::Rxne);
    let (ir_tx, ir_rx) = ir.split();
    let mut ir_tx = IrTransmitter::new(ir_tx);
    critical_section::with(|cs| {
        IR_RX.borrow_ref_mut(cs).replace(IrReceiver::new(ir_rx));
    });
    // SAFETY: the handler only touches state behind critical sections.
    unsafe { pac::NVIC::unmask(pac::Interrupt::USART2) };

    let id = read_droplet_id();
    log::info!(target: "droplet", "Droplet {:04X}, ordinal {:?}", id, ordinal(id));

    let mut bot = Droplet::new(
        id,
        DropletConfig::default(),
        &MEAS_QUEUE,
        &MSG_QUEUE,
        clock.now_ms(),
    );

    let arena = Arena::default();
    loop {
        let report = bot.step(clock.now_ms(), &mut (), &mut ir_tx);
        if report.broadcasts > 0 {
            let (r, g, b) = bot.status_color(&arena);
            log::trace!(target: "droplet::my_pos", "led #{:02X}{:02X}{:02X}", r, g, b);
        }
    }
}

#[exception]
fn SysTick() {
    SysTickClock::tick();
}

#[interrupt]
fn USART2() {
    critical_section::with(|cs| {
        if let Some(rx) = IR_RX.borrow_ref_mut(cs).as_mut() {
            rx.on_interrupt(SysTickClock::now(), &MEAS_QUEUE, &MSG_QUEUE);
        }
    });
}
