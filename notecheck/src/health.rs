// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reader liveness tracking with hysteresis.
//!
//! A single missed probe must not flap the device to Down: health stays Up
//! while the last success is inside the grace window, and goes Down only on
//! a sustained failure streak with the grace window exceeded.

use consts::{HEALTH_DOWN_STREAK, HEALTH_GRACE_MS, HEALTH_PROBE_INTERVAL_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HealthState {
    Down,
    Up,
    /// Exclusive sub-state during an active tag transaction; probing is
    /// suspended so it never contends the bus with the scan.
    Scanning,
}

impl HealthState {
    /// Status-line label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Down => "TAG: disc",
            Self::Up => "TAG: ready",
            Self::Scanning => "TAG: scan",
        }
    }
}

pub struct HealthMonitor {
    state: HealthState,
    /// None until the reader has answered once.
    last_ok_ms: Option<u64>,
    fail_streak: u32,
    last_probe_ms: u64,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self { state: HealthState::Down, last_ok_ms: None, fail_streak: 0, last_probe_ms: 0 }
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub fn is_down(&self) -> bool {
        self.state == HealthState::Down
    }

    pub fn fail_streak(&self) -> u32 {
        self.fail_streak
    }

    /// Boot-time seeding from the first init attempt. A dead reader starts
    /// Down right away; the periodic loop takes over from there.
    pub fn seed(&mut self, ok: bool, now_ms: u64) {
        if ok {
            self.record_success(now_ms);
            self.state = HealthState::Up;
        } else {
            self.fail_streak = HEALTH_DOWN_STREAK;
            self.state = HealthState::Down;
        }
    }

    /// Whether a liveness probe is due. Consumes the due-ness: a `true`
    /// answer moves the probe timestamp forward.
    pub fn probe_due(&mut self, now_ms: u64) -> bool {
        if self.state == HealthState::Scanning {
            return false;
        }
        if now_ms.saturating_sub(self.last_probe_ms) < HEALTH_PROBE_INTERVAL_MS {
            return false;
        }
        self.last_probe_ms = now_ms;
        true
    }

    /// Any successful reader interaction counts, page reads included.
    pub fn record_success(&mut self, now_ms: u64) {
        self.fail_streak = 0;
        self.last_ok_ms = Some(now_ms);
    }

    pub fn record_failure(&mut self) {
        self.fail_streak = self.fail_streak.saturating_add(1);
    }

    /// Recompute Up/Down and return the new state.
    pub fn evaluate(&mut self, now_ms: u64) -> HealthState {
        let recently_ok = match self.last_ok_ms {
            Some(t) => now_ms.saturating_sub(t) <= HEALTH_GRACE_MS,
            None => false,
        };
        self.state = if recently_ok {
            HealthState::Up
        } else if self.fail_streak >= HEALTH_DOWN_STREAK {
            HealthState::Down
        } else {
            HealthState::Up
        };
        self.state
    }

    /// Enter the exclusive scanning sub-state.
    pub fn begin_scan(&mut self) {
        self.state = HealthState::Scanning;
    }

    /// Leave the scanning sub-state. The reader just carried a transaction,
    /// so it is Up by definition.
    pub fn end_scan(&mut self) {
        self.state = HealthState::Up;
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}
