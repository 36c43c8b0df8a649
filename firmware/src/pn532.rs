// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Minimal PN532 driver over SPI, just the commands the verifier needs.
//!
//! Chip select is not driven here: the shared-bus arbiter owns both enable
//! lines and asserts the reader's for the whole duration of a grant. Every
//! method returns plain success/failure; retry policy lives upstream.

use embassy_nrf::spim::{self, Spim};
use embassy_time::{block_for, Duration, Instant};
use heapless::Vec;
use notecheck::hw::{TagId, TagReader};

const SPI_DATA_WRITE: u8 = 0x01;
const SPI_STATUS_READ: u8 = 0x02;
const SPI_DATA_READ: u8 = 0x03;

const CMD_GET_FIRMWARE_VERSION: u8 = 0x02;
const CMD_SAM_CONFIGURATION: u8 = 0x14;
const CMD_IN_LIST_PASSIVE_TARGET: u8 = 0x4A;
const CMD_IN_DATA_EXCHANGE: u8 = 0x40;

const HOST_TO_PN532: u8 = 0xD4;
const PN532_TO_HOST: u8 = 0xD5;

const ACK_FRAME: [u8; 6] = [0x00, 0x00, 0xFF, 0x00, 0xFF, 0x00];

/// Worst case observed for SAMConfiguration is around 40ms.
const READY_TIMEOUT_MS: u64 = 50;

/// Covers the largest response we ask for: InDataExchange with a 16-byte
/// tag read, plus framing and leading idle bytes.
const RESP_MAX: usize = 48;

pub struct Pn532<'d, T: spim::Instance> {
    spi: Spim<'d, T>,
}

impl<'d, T: spim::Instance> Pn532<'d, T> {
    pub fn new(spi: Spim<'d, T>) -> Self {
        Self { spi }
    }

    /// Poll the status byte until the chip signals a pending response.
    fn wait_ready(&mut self) -> bool {
        let deadline = Instant::now() + Duration::from_millis(READY_TIMEOUT_MS);
        while Instant::now() < deadline {
            let mut rx = [0u8; 2];
            if self.spi.blocking_transfer(&mut rx, &[SPI_STATUS_READ]).is_err() {
                return false;
            }
            if rx[1] & 0x01 != 0 {
                return true;
            }
            block_for(Duration::from_millis(1));
        }
        false
    }

    /// Write one command frame and consume the ACK.
    fn send_command(&mut self, cmd: u8, params: &[u8]) -> bool {
        let len = (params.len() + 2) as u8;
        let mut frame: Vec<u8, 72> = Vec::new();
        let header = [
            SPI_DATA_WRITE,
            0x00,
            0x00,
            0xFF,
            len,
            (!len).wrapping_add(1),
            HOST_TO_PN532,
            cmd,
        ];
        if frame.extend_from_slice(&header).is_err()
            || frame.extend_from_slice(params).is_err()
        {
            return false;
        }
        let mut dcs = HOST_TO_PN532.wrapping_add(cmd);
        for &b in params {
            dcs = dcs.wrapping_add(b);
        }
        if frame.push((!dcs).wrapping_add(1)).is_err() || frame.push(0x00).is_err() {
            return false;
        }

        if self.spi.blocking_write(&frame).is_err() {
            return false;
        }
        if !self.wait_ready() {
            return false;
        }

        let mut rx = [0u8; 7];
        if self.spi.blocking_transfer(&mut rx, &[SPI_DATA_READ]).is_err() {
            return false;
        }
        rx[1..] == ACK_FRAME
    }

    /// Read and validate a response frame, copying the payload (after the
    /// direction and response-code bytes) into `out`.
    fn read_response(&mut self, cmd: u8, out: &mut [u8]) -> Option<usize> {
        if !self.wait_ready() {
            return None;
        }
        let mut rx = [0u8; RESP_MAX];
        self.spi.blocking_transfer(&mut rx, &[SPI_DATA_READ]).ok()?;

        // Skip the clocked-out command byte, then hunt for the preamble.
        let frame = &rx[1..];
        let start = frame.windows(3).position(|w| w == [0x00, 0x00, 0xFF])?;
        let frame = &frame[start + 3..];

        let len = *frame.first()? as usize;
        let lcs = *frame.get(1)?;
        if (len as u8).wrapping_add(lcs) != 0 {
            return None;
        }
        if *frame.get(2)? != PN532_TO_HOST || *frame.get(3)? != cmd.wrapping_add(1) {
            return None;
        }

        let payload_len = len.checked_sub(2)?;
        let payload = frame.get(4..4 + payload_len)?;
        let dcs = *frame.get(4 + payload_len)?;
        let mut sum = PN532_TO_HOST.wrapping_add(cmd.wrapping_add(1));
        for &b in payload {
            sum = sum.wrapping_add(b);
        }
        if sum.wrapping_add(dcs) != 0 {
            return None;
        }

        let n = payload.len().min(out.len());
        out[..n].copy_from_slice(&payload[..n]);
        Some(n)
    }

    fn transceive(&mut self, cmd: u8, params: &[u8], out: &mut [u8]) -> Option<usize> {
        if !self.send_command(cmd, params) {
            return None;
        }
        self.read_response(cmd, out)
    }
}

impl<'d, T: spim::Instance> TagReader for Pn532<'d, T> {
    fn initialize(&mut self) -> bool {
        // Normal mode, 1s virtual-card timeout, IRQ pin unused.
        self.transceive(CMD_SAM_CONFIGURATION, &[0x01, 0x14, 0x01], &mut [])
            .is_some()
    }

    fn probe_liveness(&mut self) -> bool {
        let mut out = [0u8; 8];
        self.transceive(CMD_GET_FIRMWARE_VERSION, &[], &mut out).is_some()
    }

    fn probe_presence(&mut self) -> Option<TagId> {
        let mut out = [0u8; 24];
        // One target, 106 kbps type A.
        let n = self.transceive(CMD_IN_LIST_PASSIVE_TARGET, &[0x01, 0x00], &mut out)?;
        // NbTg, Tg, SENS_RES(2), SEL_RES, NFCIDLength, NFCID...
        if n < 6 || out[0] == 0 {
            return None;
        }
        let id_len = out[5] as usize;
        if id_len == 0 || 6 + id_len > n {
            return None;
        }
        Some(TagId(Vec::from_slice(&out[6..6 + id_len]).ok()?))
    }

    fn read_page(&mut self, page: u8) -> Option<[u8; consts::TAG_PAGE_SIZE]> {
        let mut out = [0u8; 20];
        // Ultralight READ returns 16 bytes; we keep the requested page.
        let n = self.transceive(CMD_IN_DATA_EXCHANGE, &[0x01, 0x30, page], &mut out)?;
        if n < 1 + consts::TAG_PAGE_SIZE || out[0] != 0x00 {
            return None;
        }
        let mut data = [0u8; consts::TAG_PAGE_SIZE];
        data.copy_from_slice(&out[1..1 + consts::TAG_PAGE_SIZE]);
        Some(data)
    }
}
