// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Presentation sink contract. Rendering itself is a platform concern; the
//! core only decides what should be on screen and when.

use crate::health::HealthState;
use crate::machine::AppState;
use crate::record::ExpectedNote;

/// One full-screen display request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Screen<'a> {
    /// Waiting for the companion app to declare a note.
    Waiting,
    /// Reader hardware is down; auto-recovery is running.
    Disconnected,
    /// Expected note received; prompt to present the banknote.
    ReadyToScan(&'a ExpectedNote),
    /// Transient two-line notice after a failed scan attempt.
    Info { line1: &'a str, line2: &'a str },
    /// Final verdict for one scan.
    Result { ok: bool, reason: &'a str },
}

pub trait Presenter {
    fn show(&mut self, screen: Screen<'_>);

    /// Periodic status line: the app-state and reader-health labels plus
    /// the health indicator category.
    fn status(&mut self, app: AppState, health: HealthState);
}
