// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Owned note records and the field normalization helpers shared by the
//! intake and scan paths.

use heapless::String;

/// Capacity of a banknote serial number.
pub const SERIAL_MAX: usize = 40;

/// Capacity of a currency code.
pub const CURRENCY_MAX: usize = 12;

/// Capacity of a base64 signature (64 raw bytes encode to 88 characters).
pub const SIG_B64_MAX: usize = 96;

pub type Serial = String<SERIAL_MAX>;
pub type Currency = String<CURRENCY_MAX>;
pub type SigB64 = String<SIG_B64_MAX>;

/// The note the companion app told us to expect.
///
/// Only ever built through [`crate::intake::parse_expected`], so the fields
/// are guaranteed non-empty, the denomination positive and the currency
/// normalized. Presence is tracked by the state machine as `Option`: set
/// atomically on valid intake, cleared atomically on verdict production or
/// superseding intake.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ExpectedNote {
    pub serial: Serial,
    pub currency: Currency,
    pub denomination: u32,
}

/// One record scanned off a tag. Transient; discarded after one verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScannedRecord {
    pub serial: Serial,
    pub currency: Currency,
    pub value: u32,
    /// Signature as carried on the tag, still base64. Kept encoded so a
    /// missing signature can be told apart from an undecodable one.
    pub sig_b64: SigB64,
}

/// Copy a string into bounded storage after trimming surrounding
/// whitespace. `None` if it does not fit.
pub(crate) fn trimmed<const N: usize>(raw: &str) -> Option<String<N>> {
    String::try_from(raw.trim()).ok()
}

/// Trim and uppercase a currency code.
///
/// Used at two deliberately independent normalization points: the wireless
/// intake and the scanned tag record. The canonical message is built from
/// whichever side's normalized value, so both must agree with what the
/// signer used.
pub(crate) fn normalized_currency(raw: &str) -> Option<Currency> {
    let mut out = Currency::new();
    for c in raw.trim().chars() {
        out.push(c.to_ascii_uppercase()).ok()?;
    }
    Some(out)
}
