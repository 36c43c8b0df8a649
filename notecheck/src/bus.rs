// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mutual exclusion for the two peripherals sharing one electrical bus.
//!
//! The display and the tag reader hang off the same transport with
//! independent enable lines. The discipline: exactly one enable asserted
//! for the duration of a transaction, both deasserted at idle, never both
//! asserted. Single-threaded callers only; there is no contention to queue.

/// One peripheral enable line.
pub trait EnableLine {
    fn assert(&mut self);
    fn deassert(&mut self);
}

/// The two peripherals sharing the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusDevice {
    Display,
    TagReader,
}

pub struct BusArbiter<D, T> {
    display: D,
    tag: T,
}

impl<D: EnableLine, T: EnableLine> BusArbiter<D, T> {
    /// Take ownership of both enable lines and drive them to the safe idle
    /// state.
    pub fn new(mut display: D, mut tag: T) -> Self {
        display.deassert();
        tag.deassert();
        Self { display, tag }
    }

    /// Grant the bus to one peripheral for the scope of the returned guard.
    ///
    /// The other peripheral's enable is deasserted before the grantee's is
    /// asserted; dropping the guard returns the bus to idle.
    pub fn grant(&mut self, device: BusDevice) -> BusGrant<'_, D, T> {
        match device {
            BusDevice::Display => {
                self.tag.deassert();
                self.display.assert();
            }
            BusDevice::TagReader => {
                self.display.deassert();
                self.tag.assert();
            }
        }
        BusGrant { arbiter: self }
    }
}

/// Scoped bus ownership.
pub struct BusGrant<'a, D: EnableLine, T: EnableLine> {
    arbiter: &'a mut BusArbiter<D, T>,
}

impl<D: EnableLine, T: EnableLine> Drop for BusGrant<'_, D, T> {
    fn drop(&mut self) {
        self.arbiter.display.deassert();
        self.arbiter.tag.deassert();
    }
}
