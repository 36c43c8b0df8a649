// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Scan intake GATT service: one write-only characteristic carrying the
//! companion app's expected-note record.

use consts::ATT_MTU;
use defmt::debug;
use heapless::Vec;
use nrf_softdevice::gatt_service;

use crate::MAILBOX;

#[gatt_service(uuid = "12345678-1234-1234-1234-1234567890ab")]
pub struct ScanService {
    #[characteristic(uuid = "abcdefab-1234-5678-1234-abcdefabcdef", write, write_without_response)]
    rx: Vec<u8, ATT_MTU>,
}

impl ScanService {
    /// Runs in SoftDevice context: publish and get out. Parsing and every
    /// state decision happen on the verifier loop's side.
    pub(crate) fn handle(&self, event: ScanServiceEvent) {
        match event {
            ScanServiceEvent::RxWrite(data) => {
                debug!("app payload: {} bytes", data.len());
                MAILBOX.publish(&data);
            }
        }
    }
}
