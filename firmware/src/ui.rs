// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Presentation sink. The handheld's panel rendering is handled by its
//! display module; firmware logs every screen decision over RTT so the
//! full UI flow is visible on a bench probe.

use defmt::{debug, info, warn};
use notecheck::health::HealthState;
use notecheck::machine::AppState;
use notecheck::present::{Presenter, Screen};

pub struct DefmtPresenter;

impl Presenter for DefmtPresenter {
    fn show(&mut self, screen: Screen<'_>) {
        match screen {
            Screen::Waiting => info!("screen: waiting for app"),
            Screen::Disconnected => warn!("screen: reader disconnected"),
            Screen::ReadyToScan(note) => info!(
                "screen: present note {} {} x{}",
                note.serial.as_str(),
                note.currency.as_str(),
                note.denomination
            ),
            Screen::Info { line1, line2 } => info!("screen: {} / {}", line1, line2),
            Screen::Result { ok, reason } => {
                if ok {
                    info!("screen: VERIFIED ({})", reason)
                } else {
                    warn!("screen: ALERT ({})", reason)
                }
            }
        }
    }

    fn status(&mut self, app: AppState, health: HealthState) {
        debug!("{} | {}", app.label(), health.label());
    }
}
