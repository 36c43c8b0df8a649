// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Verification core of the Cashmark banknote authenticator.
//!
//! The companion app declares the note it expects to see (serial, currency,
//! denomination) over BLE; the device reads the signed record embedded in the
//! note's contactless tag, verifies it against the pinned treasury key and
//! cross-checks the fields before declaring the note genuine.
//!
//! Everything hardware- or crypto-specific is injected through traits
//! ([`hw::TagReader`], [`bus::EnableLine`], [`sign::Ed25519Verify`],
//! [`present::Presenter`]), so this crate is `no_std` and every state
//! transition is testable on the host.

#![no_std]

// Must come first so the logging macros are visible to the rest of the crate.
mod fmt;

pub mod acquire;
pub mod bus;
pub mod canonical;
pub mod extract;
pub mod health;
pub mod hw;
pub mod intake;
pub mod machine;
pub mod matcher;
pub mod present;
pub mod record;
pub mod sign;

#[cfg(test)]
mod tests;

pub use machine::{AppState, Machine};
pub use matcher::{AlertReason, Verdict};
