// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Contracts of the external hardware collaborators. The drivers behind
//! these traits live in the firmware crate; the core only assumes the
//! operations below.

/// Identifier reported by a present tag (up to 7 UID bytes on NTAG parts).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TagId(pub heapless::Vec<u8, 7>);

/// Contactless tag reader.
pub trait TagReader {
    /// Full hardware (re)initialization. Idempotent and safe to call
    /// repeatedly; the health loop leans on that.
    fn initialize(&mut self) -> bool;

    /// Cheap liveness probe of the reader chip itself.
    fn probe_liveness(&mut self) -> bool;

    /// Presence probe; the tag identifier when a tag is in the field.
    fn probe_presence(&mut self) -> Option<TagId>;

    /// Read one fixed-size memory page.
    fn read_page(&mut self, page: u8) -> Option<[u8; consts::TAG_PAGE_SIZE]>;
}

/// Monotonic millisecond clock.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// Bounded blocking delay. Scan transactions busy-wait; the device has
/// nothing else to do mid-transaction.
pub trait Delay {
    fn delay_ms(&mut self, ms: u32);
}
