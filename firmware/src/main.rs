// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]
#![no_main]

mod pn532;
mod server;
mod svc;
mod ui;

use core::pin::pin;

use defmt::{info, unwrap};
// global logger
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::interrupt::{self, InterruptExt};
use embassy_nrf::{bind_interrupts, peripherals, spim};
// time driver
use embassy_time::{block_for, Duration, Instant, Timer};
use notecheck::bus::{BusArbiter, EnableLine};
use notecheck::hw::{Clock, Delay};
use notecheck::intake::Mailbox;
use notecheck::sign::{Ed25519Verify, PinnedKey, VerificationResult};
use notecheck::Machine;
use nrf_softdevice::ble::get_address;
use nrf_softdevice::Softdevice;
use panic_probe as _;

use pn532::Pn532;
use server::{initialize_sd, run_bluetooth, Server};
use ui::DefmtPresenter;

bind_interrupts!(struct Irqs {
    SPIM2_SPIS2_SPI2 => spim::InterruptHandler<peripherals::SPI2>;
});

/// Hand-off slot between the GATT write handler (SoftDevice context) and
/// the verifier loop.
pub static MAILBOX: Mailbox = Mailbox::new();

/// Active-low chip select presented as an enable line.
struct CsLine(Output<'static>);

impl EnableLine for CsLine {
    fn assert(&mut self) {
        self.0.set_low();
    }

    fn deassert(&mut self) {
        self.0.set_high();
    }
}

struct Uptime;

impl Clock for Uptime {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}

/// Blocking delay for the scan path. Transactions are bounded and the
/// radio preempts from SoftDevice priority, so busy-waiting here is safe.
struct Busy;

impl Delay for Busy {
    fn delay_ms(&mut self, ms: u32) {
        block_for(Duration::from_millis(u64::from(ms)));
    }
}

struct Dalek;

impl Ed25519Verify for Dalek {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8; 64],
        pubkey: &[u8; 32],
    ) -> VerificationResult {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(pubkey) else {
            return VerificationResult::Invalid;
        };
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        if key.verify_strict(message, &sig).is_ok() {
            VerificationResult::Valid
        } else {
            VerificationResult::Invalid
        }
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    info!("SD is running");
    sd.run().await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    let mut conf = embassy_nrf::config::Config::default();
    conf.hfclk_source = embassy_nrf::config::HfclkSource::ExternalXtal;
    conf.lfclk_source = embassy_nrf::config::LfclkSource::ExternalXtal;

    conf.gpiote_interrupt_priority = interrupt::Priority::P2;
    conf.time_interrupt_priority = interrupt::Priority::P2;

    let p = embassy_nrf::init(conf);

    let spi = {
        let mut config = spim::Config::default();
        // The tag controller clocks LSB first.
        config.frequency = spim::Frequency::M1;
        config.bit_order = spim::BitOrder::LSB_FIRST;
        spim::Spim::new(p.SPI2, Irqs, p.P0_19, p.P0_21, p.P0_20, config)
    };
    let tag_cs = CsLine(Output::new(p.P0_22, Level::High, OutputDrive::Standard));
    let display_cs = CsLine(Output::new(p.P0_23, Level::High, OutputDrive::Standard));

    // set priority to avoid collisions with softdevice
    interrupt::SPIM2_SPIS2_SPI2.set_priority(interrupt::Priority::P3);

    let sd = initialize_sd();

    let server = unwrap!(Server::new(sd), "Creating the softdevice server failed");
    unwrap!(spawner.spawn(softdevice_task(sd)), "Spawning the softdevice failed");

    // Get Bt device address
    let mut address = get_address(sd).bytes();
    address.reverse();
    info!("Address : {=[u8;6]:#X}", address);

    let key = unwrap!(
        PinnedKey::decode(consts::AUTHORITY_PUBKEY_B64),
        "Pinned authority key is invalid"
    );

    let bus = BusArbiter::new(display_cs, tag_cs);
    let reader = Pn532::new(spi);
    let mut machine = Machine::new(
        &MAILBOX,
        reader,
        Dalek,
        DefmtPresenter,
        Uptime,
        Busy,
        bus,
        key,
    );

    let verify = async {
        loop {
            machine.poll();
            Timer::after_millis(10).await;
        }
    };
    let ble = run_bluetooth(sd, &server);
    info!("Init tasks");

    futures::future::select(pin!(verify), pin!(ble)).await;
}
