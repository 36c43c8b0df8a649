// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Locating and parsing the record embedded in raw tag memory.
//!
//! The record is JSON written into fixed-size pages, so it sits somewhere
//! between the first `{` and the last `}` of the dump, padded with zero
//! bytes whose exact extent is never known in advance.

use core::fmt::Write;

use serde::Deserialize;

use crate::record::{normalized_currency, trimmed, ScannedRecord};

/// Size of the acquired record region.
pub const TAG_BUF_LEN: usize =
    (consts::TAG_LAST_PAGE - consts::TAG_FIRST_PAGE + 1) as usize * consts::TAG_PAGE_SIZE;

pub type TagBuffer = heapless::Vec<u8, TAG_BUF_LEN>;

/// Capacity of a parser diagnostic carried to the display.
pub const DIAG_MAX: usize = 64;

pub type ParseDiag = heapless::String<DIAG_MAX>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExtractError {
    /// No brace-delimited span in the dump.
    NoPayloadFound,
}

impl core::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NoPayloadFound => write!(f, "no payload found"),
        }
    }
}

/// Isolate the candidate record text from a raw page dump.
///
/// Scans forward for the first `{`, backward for the last `}`, copies the
/// inclusive span with embedded null padding stripped, and trims
/// surrounding whitespace.
pub fn extract_payload(buf: &[u8]) -> Result<TagBuffer, ExtractError> {
    let start = buf
        .iter()
        .position(|&b| b == b'{')
        .ok_or(ExtractError::NoPayloadFound)?;
    let end = buf
        .iter()
        .rposition(|&b| b == b'}')
        .ok_or(ExtractError::NoPayloadFound)?;
    if end <= start {
        return Err(ExtractError::NoPayloadFound);
    }

    let mut stripped = TagBuffer::new();
    for &b in &buf[start..=end] {
        if b == 0 {
            continue;
        }
        if stripped.push(b).is_err() {
            // Span longer than any tag region we ever read.
            return Err(ExtractError::NoPayloadFound);
        }
    }

    let text = trim_ascii_ws(&stripped);
    TagBuffer::from_slice(text).map_err(|()| ExtractError::NoPayloadFound)
}

pub(crate) fn trim_ascii_ws(mut bytes: &[u8]) -> &[u8] {
    while let Some((&b, rest)) = bytes.split_first() {
        if b.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    while let Some((&b, rest)) = bytes.split_last() {
        if b.is_ascii_whitespace() {
            bytes = rest;
        } else {
            break;
        }
    }
    bytes
}

/// Wire form of the embedded tag record. Unknown fields are ignored,
/// missing ones default so that field matching (not parsing) reports them.
#[derive(Deserialize)]
struct TagRecord<'a> {
    #[serde(borrow)]
    serial: Option<&'a str>,
    #[serde(borrow)]
    currency: Option<&'a str>,
    value: Option<u32>,
    #[serde(borrow)]
    sig: Option<&'a str>,
}

/// Parse the extracted text into a [`ScannedRecord`].
///
/// Failure is a per-scan outcome, not a crash; the diagnostic rides along
/// for the transient notice screen.
pub fn parse_record(text: &[u8]) -> Result<ScannedRecord, ParseDiag> {
    let (rec, _) =
        serde_json_core::de::from_slice::<TagRecord>(text).map_err(|e| render_diag(&e))?;

    let serial = trimmed(rec.serial.unwrap_or("")).ok_or_else(|| diag("serial too long"))?;
    let currency =
        normalized_currency(rec.currency.unwrap_or("")).ok_or_else(|| diag("currency too long"))?;
    let sig_b64 = trimmed(rec.sig.unwrap_or("")).ok_or_else(|| diag("sig too long"))?;

    Ok(ScannedRecord { serial, currency, value: rec.value.unwrap_or(0), sig_b64 })
}

fn diag(msg: &str) -> ParseDiag {
    let mut d = ParseDiag::new();
    let _ = d.push_str(msg);
    d
}

fn render_diag(err: &serde_json_core::de::Error) -> ParseDiag {
    let mut d = ParseDiag::new();
    // Truncation just shortens the on-screen diagnostic.
    let _ = write!(d, "{}", err);
    d
}
