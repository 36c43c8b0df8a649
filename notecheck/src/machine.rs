// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! The WAIT → SCAN → RESULT cycle tying everything together.
//!
//! One cooperative loop drives the whole device: each [`Machine::poll`]
//! drains at most one wireless payload, services health and the status
//! line, and, when an expectation is on file and the reader is live,
//! attempts one scan. Scans block for their (bounded) duration; nothing
//! else blocks.

use consts::{
    INFO_HOLD_MS, INFO_HOLD_PARSE_MS, STATUS_INTERVAL_MS, TAG_REMOVAL_POLL_MS,
    TAG_REMOVAL_TIMEOUT_MS, TAG_SETTLE_MS,
};

use crate::acquire::{self, AcquireError};
use crate::bus::{BusArbiter, BusDevice, EnableLine};
use crate::extract;
use crate::health::{HealthMonitor, HealthState};
use crate::hw::{Clock, Delay, TagReader};
use crate::intake::{self, Mailbox};
use crate::matcher::{match_note, AlertReason, Verdict};
use crate::present::{Presenter, Screen};
use crate::record::ExpectedNote;
use crate::sign::{verify_record, Ed25519Verify, PinnedKey, SignatureError};

/// Top-level device state. Drives which subsystems are active: intake is
/// drained in every state, scanning runs only in `HaveDataWaitingScan`,
/// and `ShowingResult` is transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AppState {
    WaitingForApp,
    HaveDataWaitingScan,
    ShowingResult,
}

impl AppState {
    /// Status-line label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::WaitingForApp => "APP: capture",
            Self::HaveDataWaitingScan => "APP: data OK",
            Self::ShowingResult => "APP: result",
        }
    }
}

/// Identity of the last drawn screen, so static screens are not redrawn
/// every tick. Info and Result screens are always drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScreenId {
    Waiting,
    Disconnected,
    ReadyToScan,
    Info,
    Result,
}

pub struct Machine<'a, R, V, P, C, DL, D, T>
where
    R: TagReader,
    V: Ed25519Verify,
    P: Presenter,
    C: Clock,
    DL: Delay,
    D: EnableLine,
    T: EnableLine,
{
    intake: &'a Mailbox,
    reader: R,
    crypto: V,
    presenter: P,
    clock: C,
    delay: DL,
    bus: BusArbiter<D, T>,
    key: PinnedKey,
    state: AppState,
    expected: Option<ExpectedNote>,
    health: HealthMonitor,
    last_screen: Option<ScreenId>,
    last_status_ms: u64,
}

impl<'a, R, V, P, C, DL, D, T> Machine<'a, R, V, P, C, DL, D, T>
where
    R: TagReader,
    V: Ed25519Verify,
    P: Presenter,
    C: Clock,
    DL: Delay,
    D: EnableLine,
    T: EnableLine,
{
    /// Build the machine and bring the hardware to a known state: bus
    /// idle, one reader init attempt (failure is tolerated; the health
    /// loop keeps retrying), initial Waiting screen.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        intake: &'a Mailbox,
        reader: R,
        crypto: V,
        presenter: P,
        clock: C,
        delay: DL,
        bus: BusArbiter<D, T>,
        key: PinnedKey,
    ) -> Self {
        let mut m = Self {
            intake,
            reader,
            crypto,
            presenter,
            clock,
            delay,
            bus,
            key,
            state: AppState::WaitingForApp,
            expected: None,
            health: HealthMonitor::new(),
            last_screen: None,
            last_status_ms: 0,
        };

        let now = m.clock.now_ms();
        let ok = {
            let _bus = m.bus.grant(BusDevice::TagReader);
            m.reader.initialize()
        };
        if !ok {
            warn!("reader init failed, will auto-recover");
        }
        m.health.seed(ok, now);

        Self::draw(&mut m.presenter, &mut m.bus, &mut m.last_screen, Screen::Waiting);
        m
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn health(&self) -> HealthState {
        self.health.state()
    }

    pub fn expected(&self) -> Option<&ExpectedNote> {
        self.expected.as_ref()
    }

    /// One main-loop tick. Blocks only for the duration of an active tag
    /// transaction; everything else is gated on elapsed time.
    pub fn poll(&mut self) {
        self.drain_intake();
        self.service_health();
        self.service_status();

        if self.state == AppState::HaveDataWaitingScan && !self.health.is_down() {
            self.try_scan();
        }
    }

    /// Drain at most one wireless payload and act on it.
    fn drain_intake(&mut self) {
        let Some(payload) = self.intake.take() else {
            return;
        };
        match intake::parse_expected(&payload) {
            Ok(note) => {
                info!(
                    "intake: expect {} {} x{}",
                    note.serial.as_str(),
                    note.currency.as_str(),
                    note.denomination
                );
                self.expected = Some(note);
                // A fresh app declaration preempts whatever was pending.
                self.state = AppState::HaveDataWaitingScan;
                self.last_screen = None;
                if self.health.is_down() {
                    Self::draw(
                        &mut self.presenter,
                        &mut self.bus,
                        &mut self.last_screen,
                        Screen::Disconnected,
                    );
                } else if let Some(exp) = self.expected.as_ref() {
                    Self::draw(
                        &mut self.presenter,
                        &mut self.bus,
                        &mut self.last_screen,
                        Screen::ReadyToScan(exp),
                    );
                }
            }
            Err(e) => {
                // Dropped without any state change.
                warn!("intake: payload dropped: {}", e);
            }
        }
    }

    /// Periodic liveness probe with reinit on failure.
    fn service_health(&mut self) {
        let now = self.clock.now_ms();
        if !self.health.probe_due(now) {
            return;
        }

        let ok = {
            let _bus = self.bus.grant(BusDevice::TagReader);
            self.reader.probe_liveness() || self.reader.initialize()
        };
        if ok {
            self.health.record_success(now);
        } else {
            self.health.record_failure();
        }

        let state = self.health.evaluate(now);
        if state == HealthState::Down && self.state == AppState::HaveDataWaitingScan {
            // Make sure the disconnected notice replaces the scan prompt.
            self.last_screen = None;
            Self::draw(
                &mut self.presenter,
                &mut self.bus,
                &mut self.last_screen,
                Screen::Disconnected,
            );
        }
    }

    /// Periodic status line.
    fn service_status(&mut self) {
        let now = self.clock.now_ms();
        if now.saturating_sub(self.last_status_ms) < STATUS_INTERVAL_MS {
            return;
        }
        self.last_status_ms = now;
        let _bus = self.bus.grant(BusDevice::Display);
        self.presenter.status(self.state, self.health.state());
    }

    /// One scan attempt: presence probe, acquisition, extraction,
    /// signature check, field match, verdict.
    fn try_scan(&mut self) {
        let present = {
            let _bus = self.bus.grant(BusDevice::TagReader);
            self.reader.probe_presence()
        };
        if present.is_none() {
            return;
        }

        let now = self.clock.now_ms();
        self.health.record_success(now);
        self.health.begin_scan();
        info!("tag detected, acquiring");
        {
            let _bus = self.bus.grant(BusDevice::Display);
            self.presenter.status(self.state, self.health.state());
        }
        self.delay.delay_ms(TAG_SETTLE_MS);

        let acquired = {
            let _bus = self.bus.grant(BusDevice::TagReader);
            acquire::read_region(&mut self.reader, &mut self.delay, &self.clock, &mut self.health)
        };
        let buf = match acquired {
            Ok(buf) => buf,
            Err(AcquireError::ReadFailed { page }) => {
                warn!("tag read failed at page {}", page);
                self.scan_notice("Tag read failed", "Try tag again", INFO_HOLD_MS);
                return;
            }
        };

        let text = match extract::extract_payload(&buf) {
            Ok(text) => text,
            Err(e) => {
                warn!("extraction failed: {}", e);
                self.scan_notice("No record found", "Check tag write", INFO_HOLD_MS);
                return;
            }
        };

        let record = match extract::parse_record(&text) {
            Ok(record) => record,
            Err(diag) => {
                warn!("tag record malformed: {}", diag.as_str());
                self.scan_notice("Bad record", diag.as_str(), INFO_HOLD_PARSE_MS);
                return;
            }
        };

        let verdict = match verify_record(&record, &self.key, &self.crypto) {
            Ok(()) => match_note(&record, self.expected.as_ref()),
            Err(SignatureError::MissingSignature) => Verdict::Alert(AlertReason::MissingSignature),
            Err(SignatureError::InvalidSignature) => Verdict::Alert(AlertReason::InvalidSignature),
        };
        self.finish_scan(verdict);
    }

    /// Transient failure notice, then back to scan-ready. Informs neither
    /// the verdict path nor the expectation: the scan may simply be tried
    /// again.
    fn scan_notice(&mut self, line1: &str, line2: &str, hold_ms: u32) {
        self.health.end_scan();
        Self::draw(
            &mut self.presenter,
            &mut self.bus,
            &mut self.last_screen,
            Screen::Info { line1, line2 },
        );
        self.delay.delay_ms(hold_ms);
        self.last_screen = None;
        if let Some(exp) = self.expected.as_ref() {
            Self::draw(
                &mut self.presenter,
                &mut self.bus,
                &mut self.last_screen,
                Screen::ReadyToScan(exp),
            );
        }
    }

    /// Present the verdict, wait out tag removal, reset for the next note.
    fn finish_scan(&mut self, verdict: Verdict) {
        self.state = AppState::ShowingResult;
        self.health.end_scan();

        match verdict {
            Verdict::Verified => {
                info!("note verified");
                Self::draw(
                    &mut self.presenter,
                    &mut self.bus,
                    &mut self.last_screen,
                    Screen::Result { ok: true, reason: "OK" },
                );
            }
            Verdict::Alert(reason) => {
                warn!("note alert: {}", reason.label());
                Self::draw(
                    &mut self.presenter,
                    &mut self.bus,
                    &mut self.last_screen,
                    Screen::Result { ok: false, reason: reason.label() },
                );
            }
        }

        self.await_removal();
        self.reset_cycle();
    }

    /// Bounded wait for the note to leave the field, so one physical tap
    /// cannot produce two verdicts.
    fn await_removal(&mut self) {
        let start = self.clock.now_ms();
        while self.clock.now_ms().saturating_sub(start) < TAG_REMOVAL_TIMEOUT_MS {
            let present = {
                let _bus = self.bus.grant(BusDevice::TagReader);
                self.reader.probe_presence()
            };
            if present.is_none() {
                break;
            }
            self.delay.delay_ms(TAG_REMOVAL_POLL_MS);
        }
    }

    /// ShowingResult → WaitingForApp: clear the expectation and every
    /// scan-scoped bit of state.
    fn reset_cycle(&mut self) {
        self.expected = None;
        self.state = AppState::WaitingForApp;
        self.last_screen = None;
        Self::draw(&mut self.presenter, &mut self.bus, &mut self.last_screen, Screen::Waiting);
    }

    /// Draw a screen through the bus arbiter, skipping redraws of an
    /// unchanged static screen.
    fn draw(
        presenter: &mut P,
        bus: &mut BusArbiter<D, T>,
        cache: &mut Option<ScreenId>,
        screen: Screen<'_>,
    ) {
        let id = match screen {
            Screen::Waiting => ScreenId::Waiting,
            Screen::Disconnected => ScreenId::Disconnected,
            Screen::ReadyToScan(_) => ScreenId::ReadyToScan,
            Screen::Info { .. } => ScreenId::Info,
            Screen::Result { .. } => ScreenId::Result,
        };
        let cacheable =
            matches!(id, ScreenId::Waiting | ScreenId::Disconnected | ScreenId::ReadyToScan);
        if cacheable && *cache == Some(id) {
            return;
        }
        *cache = Some(id);

        let _bus = bus.grant(BusDevice::Display);
        presenter.show(screen);
    }
}
