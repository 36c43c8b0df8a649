// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Field matching between the scanned record and the app-declared note.

use crate::record::{ExpectedNote, ScannedRecord};

/// Why a note raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AlertReason {
    /// No expectation on file. Unreachable through the state machine, which
    /// only scans while one is present, but the matcher stands alone.
    NoExpectedNote,
    MissingSignature,
    InvalidSignature,
    SerialMismatch,
    CurrencyMismatch,
    ValueMismatch,
}

impl AlertReason {
    /// Operator-facing label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoExpectedNote => "No app data",
            Self::MissingSignature => "Missing sig",
            Self::InvalidSignature => "Invalid sig",
            Self::SerialMismatch => "Serial mismatch",
            Self::CurrencyMismatch => "Currency mismatch",
            Self::ValueMismatch => "Value mismatch",
        }
    }
}

/// Outcome of one completed scan. Produced once, consumed by the
/// presentation layer, discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    Verified,
    Alert(AlertReason),
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Compare in fixed priority order (serial, currency, denomination) and
/// report the first mismatch. Both currencies are already normalized.
pub fn match_note(scanned: &ScannedRecord, expected: Option<&ExpectedNote>) -> Verdict {
    let Some(exp) = expected else {
        return Verdict::Alert(AlertReason::NoExpectedNote);
    };
    if scanned.serial != exp.serial {
        return Verdict::Alert(AlertReason::SerialMismatch);
    }
    if scanned.currency != exp.currency {
        return Verdict::Alert(AlertReason::CurrencyMismatch);
    }
    if scanned.value != exp.denomination {
        return Verdict::Alert(AlertReason::ValueMismatch);
    }
    Verdict::Verified
}
