// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device-wide constants shared between the verification core and the
//! firmware binary.

#![no_std]

/// Maximum Transfer Unit (MTU) size for BLE communication.
/// Set to 247 bytes to allow efficient data transfer while staying within BLE limits.
pub const ATT_MTU: usize = 247;

/// Full device name advertised over BLE.
pub const DEVICE_NAME: &str = "Cashmark Verifier";

/// Short device name used in limited advertising data, to stay within the
/// 31-byte advertising data size limit.
pub const SHORT_NAME: &str = "Cashmark";

/// UUID of the note-scan BLE service exposed to the companion app.
pub const SCAN_SERVICE_UUID: u128 = 0x12345678_1234_1234_1234_1234567890ab;

/// UUID of the write characteristic carrying expected-note records.
pub const SCAN_RX_CHAR_UUID: u128 = 0xabcdefab_1234_5678_1234_abcdefabcdef;

/// List of BLE service UUIDs advertised by this device.
pub const SERVICES_LIST: [[u8; 16]; 1] = [SCAN_SERVICE_UUID.to_le_bytes()];

/// Treasury authority public key, base64 of the 32 raw Ed25519 bytes.
///
/// Compiled in; the device never provisions keys at runtime. A record on a
/// banknote tag is genuine only if its signature verifies against this key.
pub const AUTHORITY_PUBKEY_B64: &str = "O2onvM62pC1io6jQKm8Nc2UyFXcd4kOmOsBIoYtZ2ik=";

/// First tag memory page of the embedded record region.
pub const TAG_FIRST_PAGE: u8 = 4;

/// Last tag memory page of the embedded record region (inclusive).
pub const TAG_LAST_PAGE: u8 = 80;

/// Size in bytes of one tag memory page.
pub const TAG_PAGE_SIZE: usize = 4;

/// Attempts per page before the page is declared unreadable.
pub const TAG_READ_ATTEMPTS: u32 = 10;

/// Delay between page read attempts.
pub const TAG_READ_RETRY_MS: u32 = 10;

/// Settle time between tag detection and the first page read.
pub const TAG_SETTLE_MS: u32 = 90;

/// Interval between reader liveness probes.
pub const HEALTH_PROBE_INTERVAL_MS: u64 = 500;

/// Maximum elapsed time since the last successful probe during which the
/// reader is still considered live despite probe failures.
pub const HEALTH_GRACE_MS: u64 = 1500;

/// Consecutive probe failures (with the grace window exceeded) before the
/// reader is reported down.
pub const HEALTH_DOWN_STREAK: u32 = 3;

/// Interval between periodic status-line updates.
pub const STATUS_INTERVAL_MS: u64 = 250;

/// Upper bound on the post-verdict wait for the note to be lifted off
/// the reader.
pub const TAG_REMOVAL_TIMEOUT_MS: u64 = 2500;

/// Poll interval while waiting for tag removal.
pub const TAG_REMOVAL_POLL_MS: u32 = 40;

/// How long a transient read/extraction notice stays on screen.
pub const INFO_HOLD_MS: u32 = 900;

/// How long a malformed-record notice (with parser diagnostic) stays on
/// screen. Slightly longer so the diagnostic can actually be read.
pub const INFO_HOLD_PARSE_MS: u32 = 1100;
