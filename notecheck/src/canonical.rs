// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The canonical message form shared by the treasury signer and this
//! verifier. Byte-for-byte equality is what makes a signature validate, so
//! nothing here may depend on call site or platform.

use core::fmt::Write;

use crate::record::{CURRENCY_MAX, SERIAL_MAX};

/// Field labels plus a bounded serial, currency and full-width decimal.
pub const CANONICAL_MAX: usize = SERIAL_MAX + CURRENCY_MAX + 44;

pub type CanonicalMessage = heapless::String<CANONICAL_MAX>;

/// Build `serial=<serial>|currency=<currency>|value=<value>` with the value
/// as plain decimal, no sign, no padding, no surrounding whitespace.
///
/// Errors only if the fields exceed the bounds every caller already
/// enforces; callers treat that as a failed verification.
pub fn canonical_message(
    serial: &str,
    currency: &str,
    value: u32,
) -> Result<CanonicalMessage, core::fmt::Error> {
    let mut msg = CanonicalMessage::new();
    write!(msg, "serial={}|currency={}|value={}", serial, currency, value)?;
    Ok(msg)
}
