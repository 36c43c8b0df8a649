// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Multi-attempt acquisition of the tag's record region.

use consts::{TAG_FIRST_PAGE, TAG_LAST_PAGE, TAG_READ_ATTEMPTS, TAG_READ_RETRY_MS};

use crate::extract::TagBuffer;
use crate::health::HealthMonitor;
use crate::hw::{Clock, Delay, TagReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquireError {
    /// A page stayed unreadable through every attempt. Not fatal: the
    /// caller returns to scan-ready and the health signal is informed.
    ReadFailed { page: u8 },
}

impl core::fmt::Display for AcquireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ReadFailed { page } => write!(f, "page {} unreadable", page),
        }
    }
}

/// Run `op` up to `attempts` times with a fixed pause between attempts.
pub fn retry<T>(
    attempts: u32,
    pause_ms: u32,
    delay: &mut impl Delay,
    mut op: impl FnMut() -> Option<T>,
) -> Option<T> {
    for attempt in 0..attempts {
        if let Some(v) = op() {
            return Some(v);
        }
        if attempt + 1 < attempts {
            delay.delay_ms(pause_ms);
        }
    }
    None
}

/// Read the whole record region, page by page, into one buffer.
///
/// Aborts on the first page that stays unreadable. Every successful page
/// read refreshes the health signal.
pub fn read_region<R: TagReader>(
    reader: &mut R,
    delay: &mut impl Delay,
    clock: &impl Clock,
    health: &mut HealthMonitor,
) -> Result<TagBuffer, AcquireError> {
    let mut buf = TagBuffer::new();
    for page in TAG_FIRST_PAGE..=TAG_LAST_PAGE {
        let read = retry(TAG_READ_ATTEMPTS, TAG_READ_RETRY_MS, delay, || reader.read_page(page));
        let Some(data) = read else {
            health.record_failure();
            return Err(AcquireError::ReadFailed { page });
        };
        health.record_success(clock.now_ms());
        // The buffer holds exactly TAG_LAST_PAGE - TAG_FIRST_PAGE + 1 pages.
        let _ = buf.extend_from_slice(&data);
    }
    Ok(buf)
}
