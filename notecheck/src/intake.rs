// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wireless intake: the single-slot mailbox fed by the BLE stack and the
//! parsing of expected-note records out of it.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use serde::Deserialize;

use crate::record::{normalized_currency, trimmed, ExpectedNote};

/// Capacity of one raw wireless payload.
pub const PAYLOAD_MAX: usize = 256;

pub type RawPayload = heapless::Vec<u8, PAYLOAD_MAX>;

/// Latest-wins hand-off slot between the wireless stack's execution context
/// and the main loop.
///
/// Overwrite, not queue: a new delivery replaces an undrained one, so the
/// freshest app declaration always wins. The consumer drains at most one
/// payload per main-loop tick. `Signal` gives the torn-write-free swap.
pub struct Mailbox {
    slot: Signal<CriticalSectionRawMutex, RawPayload>,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self { slot: Signal::new() }
    }

    /// Producer side. Oversized deliveries are dropped whole rather than
    /// truncated into something that would parse differently.
    pub fn publish(&self, payload: &[u8]) {
        match RawPayload::from_slice(payload) {
            Ok(p) => self.slot.signal(p),
            Err(()) => warn!("intake: oversized payload dropped ({} bytes)", payload.len()),
        }
    }

    /// Consumer side; clears the freshness flag.
    pub fn take(&self) -> Option<RawPayload> {
        self.slot.try_take()
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire form of an app request. Unknown fields are ignored.
#[derive(Deserialize)]
struct AppRequest<'a> {
    #[serde(rename = "type", borrow)]
    kind: Option<&'a str>,
    #[serde(borrow)]
    serial: Option<&'a str>,
    #[serde(borrow)]
    currency: Option<&'a str>,
    denomination: Option<u32>,
}

/// Why an intake payload was dropped. Dropped payloads never change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IntakeError {
    /// Not a structured record we can decode.
    Malformed,
    /// Well-formed record of a type other than `scan`.
    IgnoredType,
    /// A required field is missing, empty, or non-positive.
    IncompleteFields,
    /// A field exceeds its fixed storage bound.
    FieldTooLong,
}

impl core::fmt::Display for IntakeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed payload"),
            Self::IgnoredType => write!(f, "non-scan record ignored"),
            Self::IncompleteFields => write!(f, "missing fields"),
            Self::FieldTooLong => write!(f, "field too long"),
        }
    }
}

/// Parse one wireless payload into an expected note.
///
/// The record type defaults to `scan`; anything else is ignored. The
/// currency is trimmed and uppercased here; the tag-side record is
/// normalized independently when it is scanned.
pub fn parse_expected(payload: &[u8]) -> Result<ExpectedNote, IntakeError> {
    let (req, _) = serde_json_core::de::from_slice::<AppRequest>(payload)
        .map_err(|_| IntakeError::Malformed)?;

    if req.kind.unwrap_or("scan") != "scan" {
        return Err(IntakeError::IgnoredType);
    }

    let serial_raw = req.serial.unwrap_or("").trim();
    let currency =
        normalized_currency(req.currency.unwrap_or("")).ok_or(IntakeError::FieldTooLong)?;
    let denomination = req.denomination.unwrap_or(0);

    if serial_raw.is_empty() || currency.is_empty() || denomination == 0 {
        return Err(IntakeError::IncompleteFields);
    }

    let serial = trimmed(serial_raw).ok_or(IntakeError::FieldTooLong)?;
    Ok(ExpectedNote { serial, currency, denomination })
}
