// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::{Cell, RefCell};
use core::fmt::Write;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
// Provides the critical-section implementation for the mailbox under test.
use critical_section as _;
use ed25519_dalek::{Signer, SigningKey};
use heapless::{String, Vec};

use crate::acquire::{read_region, retry, AcquireError};
use crate::bus::{BusArbiter, BusDevice, EnableLine};
use crate::canonical::canonical_message;
use crate::extract::{extract_payload, parse_record, ExtractError, TAG_BUF_LEN};
use crate::health::{HealthMonitor, HealthState};
use crate::hw::{Clock, Delay, TagId, TagReader};
use crate::intake::{parse_expected, IntakeError, Mailbox};
use crate::machine::{AppState, Machine};
use crate::matcher::{match_note, AlertReason, Verdict};
use crate::present::{Presenter, Screen};
use crate::record::{ExpectedNote, ScannedRecord};
use crate::sign::{verify_record, Ed25519Verify, KeyError, PinnedKey, SignatureError, VerificationResult};

const TEST_SEED: [u8; 32] = [7; 32];

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&TEST_SEED)
}

fn test_key() -> PinnedKey {
    PinnedKey::from_bytes(signing_key().verifying_key().to_bytes())
}

fn sign_b64(msg: &str) -> String<96> {
    let sig = signing_key().sign(msg.as_bytes());
    let mut buf = [0u8; 96];
    let n = BASE64.encode_slice(sig.to_bytes(), &mut buf).unwrap();
    String::try_from(core::str::from_utf8(&buf[..n]).unwrap()).unwrap()
}

/// Same base64 length, one character changed: still decodes to 64 bytes,
/// no longer the authority's signature.
fn tampered(sig: &str) -> String<96> {
    let mut out = String::new();
    for (i, c) in sig.chars().enumerate() {
        if i == 4 {
            out.push(if c == 'A' { 'B' } else { 'A' }).unwrap();
        } else {
            out.push(c).unwrap();
        }
    }
    out
}

fn scanned(serial: &str, currency: &str, value: u32, sig: &str) -> ScannedRecord {
    ScannedRecord {
        serial: String::try_from(serial).unwrap(),
        currency: String::try_from(currency).unwrap(),
        value,
        sig_b64: String::try_from(sig).unwrap(),
    }
}

fn expected_note(serial: &str, currency: &str, denomination: u32) -> ExpectedNote {
    ExpectedNote {
        serial: String::try_from(serial).unwrap(),
        currency: String::try_from(currency).unwrap(),
        denomination,
    }
}

fn tag_json(serial: &str, currency: &str, value: u32, sig: &str) -> String<512> {
    let mut s = String::new();
    write!(
        s,
        "{{\"serial\":\"{}\",\"currency\":\"{}\",\"value\":{},\"sig\":\"{}\"}}",
        serial, currency, value, sig
    )
    .unwrap();
    s
}

fn signed_tag_json(serial: &str, currency: &str, value: u32) -> String<512> {
    let msg = canonical_message(serial, currency, value).unwrap();
    tag_json(serial, currency, value, sign_b64(msg.as_str()).as_str())
}

struct Dalek;

impl Ed25519Verify for Dalek {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8; 64],
        pubkey: &[u8; 32],
    ) -> VerificationResult {
        let Ok(key) = ed25519_dalek::VerifyingKey::from_bytes(pubkey) else {
            return VerificationResult::Invalid;
        };
        let sig = ed25519_dalek::Signature::from_bytes(signature);
        if key.verify_strict(message, &sig).is_ok() {
            VerificationResult::Valid
        } else {
            VerificationResult::Invalid
        }
    }
}

/// Clock and delay in one: delays advance the clock, so bounded busy-waits
/// terminate in tests exactly as they do on hardware.
struct FakeTime {
    now: Cell<u64>,
}

impl FakeTime {
    fn new() -> Self {
        Self { now: Cell::new(0) }
    }

    fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for &FakeTime {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

impl Delay for &FakeTime {
    fn delay_ms(&mut self, ms: u32) {
        self.now.set(self.now.get() + u64::from(ms));
    }
}

struct LineProbe<'a>(&'a Cell<bool>);

impl EnableLine for LineProbe<'_> {
    fn assert(&mut self) {
        self.0.set(true);
    }

    fn deassert(&mut self) {
        self.0.set(false);
    }
}

struct FakeTag {
    live: Cell<bool>,
    present: Cell<bool>,
    memory: RefCell<[u8; TAG_BUF_LEN]>,
    fail_page: Cell<Option<u8>>,
    inits: Cell<u32>,
}

impl FakeTag {
    fn new() -> Self {
        Self {
            live: Cell::new(true),
            present: Cell::new(false),
            memory: RefCell::new([0; TAG_BUF_LEN]),
            fail_page: Cell::new(None),
            inits: Cell::new(0),
        }
    }

    fn load(&self, payload: &[u8]) {
        self.memory.borrow_mut()[..payload.len()].copy_from_slice(payload);
    }
}

impl TagReader for &FakeTag {
    fn initialize(&mut self) -> bool {
        self.inits.set(self.inits.get() + 1);
        self.live.get()
    }

    fn probe_liveness(&mut self) -> bool {
        self.live.get()
    }

    fn probe_presence(&mut self) -> Option<TagId> {
        self.present
            .get()
            .then(|| TagId(Vec::from_slice(&[0x04, 0x1a, 0x2b, 0x3c]).unwrap()))
    }

    fn read_page(&mut self, page: u8) -> Option<[u8; consts::TAG_PAGE_SIZE]> {
        if !self.live.get() || self.fail_page.get() == Some(page) {
            return None;
        }
        let off = (page - consts::TAG_FIRST_PAGE) as usize * consts::TAG_PAGE_SIZE;
        let mem = self.memory.borrow();
        let mut out = [0u8; consts::TAG_PAGE_SIZE];
        out.copy_from_slice(&mem[off..off + consts::TAG_PAGE_SIZE]);
        Some(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Shown {
    Waiting,
    Disconnected,
    ReadyToScan { denomination: u32 },
    Info,
    Result { ok: bool, reason: String<32> },
    Status { app: AppState, health: HealthState },
}

struct PresenterLog {
    events: RefCell<Vec<Shown, 128>>,
}

impl PresenterLog {
    fn new() -> Self {
        Self { events: RefCell::new(Vec::new()) }
    }

    fn contains(&self, shown: &Shown) -> bool {
        self.events.borrow().iter().any(|e| e == shown)
    }

    fn no_result(&self) -> bool {
        self.events.borrow().iter().all(|e| !matches!(e, Shown::Result { .. }))
    }

    fn last_screen(&self) -> Option<Shown> {
        self.events
            .borrow()
            .iter()
            .rev()
            .find(|e| !matches!(e, Shown::Status { .. }))
            .cloned()
    }
}

impl Presenter for &PresenterLog {
    fn show(&mut self, screen: Screen<'_>) {
        let ev = match screen {
            Screen::Waiting => Shown::Waiting,
            Screen::Disconnected => Shown::Disconnected,
            Screen::ReadyToScan(note) => Shown::ReadyToScan { denomination: note.denomination },
            Screen::Info { .. } => Shown::Info,
            Screen::Result { ok, reason } => {
                Shown::Result { ok, reason: String::try_from(reason).unwrap() }
            }
        };
        self.events.borrow_mut().push(ev).unwrap();
    }

    fn status(&mut self, app: AppState, health: HealthState) {
        self.events.borrow_mut().push(Shown::Status { app, health }).unwrap();
    }
}

fn result_of(ok: bool, reason: &str) -> Shown {
    Shown::Result { ok, reason: String::try_from(reason).unwrap() }
}

// Canonical message

#[test]
fn canonical_message_exact_form() {
    let msg = canonical_message("A123", "USD", 20).unwrap();
    assert_eq!(msg.as_str(), "serial=A123|currency=USD|value=20");
}

#[test]
fn canonical_message_is_deterministic() {
    let a = canonical_message("ZB99887766", "EUR", 500).unwrap();
    let b = canonical_message("ZB99887766", "EUR", 500).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_str(), "serial=ZB99887766|currency=EUR|value=500");
}

// Wireless intake

#[test]
fn intake_valid_record_normalizes_currency() {
    let note =
        parse_expected(br#"{"type":"scan","serial":"A123","currency":" usd ","denomination":20}"#)
            .unwrap();
    assert_eq!(note.serial.as_str(), "A123");
    assert_eq!(note.currency.as_str(), "USD");
    assert_eq!(note.denomination, 20);
}

#[test]
fn intake_type_defaults_to_scan() {
    let note =
        parse_expected(br#"{"serial":"A123","currency":"usd","denomination":20}"#).unwrap();
    assert_eq!(note.serial.as_str(), "A123");
}

#[test]
fn intake_ignores_other_types() {
    let err =
        parse_expected(br#"{"type":"ping","serial":"A123","currency":"usd","denomination":20}"#)
            .unwrap_err();
    assert_eq!(err, IntakeError::IgnoredType);
}

#[test]
fn intake_rejects_malformed_payload() {
    assert_eq!(parse_expected(b"not json at all").unwrap_err(), IntakeError::Malformed);
}

#[test]
fn intake_rejects_incomplete_fields() {
    assert_eq!(
        parse_expected(br#"{"serial":"","currency":"usd","denomination":20}"#).unwrap_err(),
        IntakeError::IncompleteFields
    );
    assert_eq!(
        parse_expected(br#"{"serial":"A123","currency":"usd"}"#).unwrap_err(),
        IntakeError::IncompleteFields
    );
    assert_eq!(
        parse_expected(br#"{"serial":"A123","currency":"usd","denomination":0}"#).unwrap_err(),
        IntakeError::IncompleteFields
    );
}

#[test]
fn mailbox_latest_delivery_wins() {
    let mailbox = Mailbox::new();
    mailbox.publish(b"first");
    mailbox.publish(b"second");
    assert_eq!(mailbox.take().unwrap().as_slice(), b"second");
    // Drained: the freshness flag is cleared.
    assert!(mailbox.take().is_none());
}

// Payload extraction

#[test]
fn extract_rejects_buffer_without_braces() {
    assert_eq!(extract_payload(&[0u8; 64]).unwrap_err(), ExtractError::NoPayloadFound);
    assert_eq!(extract_payload(b"plain text").unwrap_err(), ExtractError::NoPayloadFound);
}

#[test]
fn extract_rejects_close_before_open() {
    assert_eq!(extract_payload(b"}...{").unwrap_err(), ExtractError::NoPayloadFound);
}

#[test]
fn extract_strips_null_padding() {
    let text = extract_payload(b"\x00\x00{\"a\":\x001}\x00\x00\x00").unwrap();
    assert_eq!(text.as_slice(), b"{\"a\":1}");
}

#[test]
fn extract_spans_to_last_close_brace() {
    let text = extract_payload(b"{\"a\":{\"b\":2}}\x00\x00").unwrap();
    assert_eq!(text.as_slice(), b"{\"a\":{\"b\":2}}");
}

#[test]
fn parse_record_reports_diagnostic() {
    let err = parse_record(b"{\"serial\":}").unwrap_err();
    assert!(!err.is_empty());
}

#[test]
fn parse_record_defaults_missing_fields() {
    let rec = parse_record(b"{}").unwrap();
    assert!(rec.serial.is_empty());
    assert_eq!(rec.value, 0);
    assert!(rec.sig_b64.is_empty());
}

#[test]
fn parse_record_normalizes_tag_currency() {
    let rec = parse_record(b"{\"serial\":\" A1 \",\"currency\":\"usd\",\"value\":20}").unwrap();
    assert_eq!(rec.serial.as_str(), "A1");
    assert_eq!(rec.currency.as_str(), "USD");
}

// Signature verification

#[test]
fn pinned_production_key_decodes() {
    assert!(PinnedKey::decode(consts::AUTHORITY_PUBKEY_B64).is_ok());
}

#[test]
fn pinned_key_wrong_length_rejected() {
    // 4 base64 chars decode to 3 bytes.
    assert_eq!(PinnedKey::decode("AAAA").unwrap_err(), KeyError::WrongLength);
    assert_eq!(PinnedKey::decode("!!not base64!!").unwrap_err(), KeyError::BadEncoding);
}

#[test]
fn signature_valid_record_verifies() {
    let msg = canonical_message("A123", "USD", 20).unwrap();
    let rec = scanned("A123", "USD", 20, sign_b64(msg.as_str()).as_str());
    assert_eq!(verify_record(&rec, &test_key(), &Dalek), Ok(()));
}

#[test]
fn signature_missing_is_distinct() {
    let rec = scanned("A123", "USD", 20, "");
    assert_eq!(
        verify_record(&rec, &test_key(), &Dalek),
        Err(SignatureError::MissingSignature)
    );
}

#[test]
fn signature_bitflip_fails() {
    let msg = canonical_message("A123", "USD", 20).unwrap();
    let sig = sign_b64(msg.as_str());
    let rec = scanned("A123", "USD", 20, tampered(sig.as_str()).as_str());
    assert_eq!(
        verify_record(&rec, &test_key(), &Dalek),
        Err(SignatureError::InvalidSignature)
    );
}

#[test]
fn signature_over_different_message_fails() {
    let msg = canonical_message("A123", "USD", 20).unwrap();
    let sig = sign_b64(msg.as_str());
    // Any single field change breaks the canonical message.
    for rec in [
        scanned("A124", "USD", 20, sig.as_str()),
        scanned("A123", "EUR", 20, sig.as_str()),
        scanned("A123", "USD", 21, sig.as_str()),
    ] {
        assert_eq!(
            verify_record(&rec, &test_key(), &Dalek),
            Err(SignatureError::InvalidSignature)
        );
    }
}

#[test]
fn signature_wrong_length_fails() {
    // 32 bytes of zeroes: valid base64, wrong decoded length.
    let mut short = [0u8; 64];
    let n = BASE64.encode_slice([0u8; 32], &mut short).unwrap();
    let rec = scanned("A123", "USD", 20, core::str::from_utf8(&short[..n]).unwrap());
    assert_eq!(
        verify_record(&rec, &test_key(), &Dalek),
        Err(SignatureError::InvalidSignature)
    );
}

#[test]
fn signature_undecodable_fails() {
    let rec = scanned("A123", "USD", 20, "@@@not-base64@@@");
    assert_eq!(
        verify_record(&rec, &test_key(), &Dalek),
        Err(SignatureError::InvalidSignature)
    );
}

// Field matching

#[test]
fn match_reports_first_mismatch_in_priority_order() {
    let exp = expected_note("A123", "USD", 20);

    let all_wrong = scanned("B999", "EUR", 50, "");
    assert_eq!(
        match_note(&all_wrong, Some(&exp)),
        Verdict::Alert(AlertReason::SerialMismatch)
    );

    let wrong_currency = scanned("A123", "EUR", 50, "");
    assert_eq!(
        match_note(&wrong_currency, Some(&exp)),
        Verdict::Alert(AlertReason::CurrencyMismatch)
    );

    let wrong_value = scanned("A123", "USD", 50, "");
    assert_eq!(
        match_note(&wrong_value, Some(&exp)),
        Verdict::Alert(AlertReason::ValueMismatch)
    );

    let all_match = scanned("A123", "USD", 20, "");
    assert_eq!(match_note(&all_match, Some(&exp)), Verdict::Verified);
}

#[test]
fn match_without_expectation_alerts() {
    let rec = scanned("A123", "USD", 20, "");
    assert_eq!(match_note(&rec, None), Verdict::Alert(AlertReason::NoExpectedNote));
}

// Health monitor

#[test]
fn health_two_failures_then_success_stays_up() {
    let mut h = HealthMonitor::new();
    h.seed(true, 0);

    assert!(h.probe_due(500));
    h.record_failure();
    assert_eq!(h.evaluate(500), HealthState::Up);

    assert!(h.probe_due(1000));
    h.record_failure();
    assert_eq!(h.evaluate(1000), HealthState::Up);

    assert!(h.probe_due(1500));
    h.record_success(1500);
    assert_eq!(h.evaluate(1500), HealthState::Up);
    assert_eq!(h.fail_streak(), 0);
}

#[test]
fn health_sustained_failures_beyond_grace_go_down() {
    let mut h = HealthMonitor::new();
    h.seed(true, 0);

    for t in [600, 1100, 1600] {
        assert!(h.probe_due(t));
        h.record_failure();
    }
    // Streak of 3 and the last success (t=0) is outside the grace window.
    assert_eq!(h.evaluate(1600), HealthState::Down);
}

#[test]
fn health_single_failure_inside_grace_stays_up() {
    let mut h = HealthMonitor::new();
    h.seed(true, 0);
    h.record_failure();
    assert_eq!(h.evaluate(1000), HealthState::Up);
}

#[test]
fn health_probe_suspended_while_scanning() {
    let mut h = HealthMonitor::new();
    h.seed(true, 0);
    h.begin_scan();
    assert!(!h.probe_due(10_000));
    h.end_scan();
    assert!(h.probe_due(10_000));
}

#[test]
fn health_probe_respects_interval() {
    let mut h = HealthMonitor::new();
    h.seed(true, 0);
    assert!(!h.probe_due(499));
    assert!(h.probe_due(500));
    // Due-ness was consumed.
    assert!(!h.probe_due(600));
}

#[test]
fn health_seed_failure_starts_down() {
    let mut h = HealthMonitor::new();
    h.seed(false, 0);
    assert_eq!(h.state(), HealthState::Down);
}

// Bus arbiter

#[test]
fn bus_idles_with_both_lines_deasserted() {
    let display = Cell::new(true);
    let tag = Cell::new(true);
    let _arbiter = BusArbiter::new(LineProbe(&display), LineProbe(&tag));
    assert!(!display.get());
    assert!(!tag.get());
}

#[test]
fn bus_grant_asserts_exactly_one_line() {
    let display = Cell::new(false);
    let tag = Cell::new(false);
    let mut arbiter = BusArbiter::new(LineProbe(&display), LineProbe(&tag));

    {
        let _grant = arbiter.grant(BusDevice::Display);
        assert!(display.get());
        assert!(!tag.get());
    }
    assert!(!display.get());
    assert!(!tag.get());

    {
        let _grant = arbiter.grant(BusDevice::TagReader);
        assert!(!display.get());
        assert!(tag.get());
    }
    assert!(!display.get());
    assert!(!tag.get());
}

// Retry combinator and acquisition

#[test]
fn retry_returns_first_success() {
    let time = FakeTime::new();
    let calls = Cell::new(0u32);
    let out = retry(10, 10, &mut &time, || {
        calls.set(calls.get() + 1);
        (calls.get() == 3).then_some(42)
    });
    assert_eq!(out, Some(42));
    assert_eq!(calls.get(), 3);
    // Two pauses between the three attempts.
    assert_eq!(time.now.get(), 20);
}

#[test]
fn retry_gives_up_after_max_attempts() {
    let time = FakeTime::new();
    let calls = Cell::new(0u32);
    let out: Option<()> = retry(10, 10, &mut &time, || {
        calls.set(calls.get() + 1);
        None
    });
    assert_eq!(out, None);
    assert_eq!(calls.get(), 10);
}

#[test]
fn read_region_fills_whole_buffer() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    tag.load(b"{\"a\":1}");
    let mut h = HealthMonitor::new();
    let buf = read_region(&mut &tag, &mut &time, &&time, &mut h).unwrap();
    assert_eq!(buf.len(), TAG_BUF_LEN);
    assert_eq!(&buf[..7], b"{\"a\":1}");
    assert_eq!(h.fail_streak(), 0);
}

#[test]
fn read_region_aborts_on_unreadable_page() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    tag.fail_page.set(Some(10));
    let mut h = HealthMonitor::new();
    let err = read_region(&mut &tag, &mut &time, &&time, &mut h).unwrap_err();
    assert_eq!(err, AcquireError::ReadFailed { page: 10 });
    assert_eq!(h.fail_streak(), 1);
}

// State machine scenarios

#[test]
fn machine_intake_arms_scan_state() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    machine.poll();

    assert_eq!(machine.state(), AppState::HaveDataWaitingScan);
    let exp = machine.expected().unwrap();
    assert_eq!(exp.serial.as_str(), "A123");
    assert_eq!(exp.currency.as_str(), "USD");
    assert_eq!(exp.denomination, 20);
    assert!(log.contains(&Shown::ReadyToScan { denomination: 20 }));
}

#[test]
fn machine_drops_bad_intake_without_state_change() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(b"garbage");
    machine.poll();
    assert_eq!(machine.state(), AppState::WaitingForApp);
    assert!(machine.expected().is_none());

    mailbox.publish(br#"{"serial":"A123","currency":"usd"}"#);
    machine.poll();
    assert_eq!(machine.state(), AppState::WaitingForApp);
    assert!(machine.expected().is_none());
}

#[test]
fn machine_full_cycle_verifies_genuine_note() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    tag.load(signed_tag_json("A123", "USD", 20).as_bytes());
    tag.present.set(true);
    machine.poll();

    assert!(log.contains(&result_of(true, "OK")));
    // Note never removed: the bounded wait ran out, then the cycle reset.
    assert_eq!(machine.state(), AppState::WaitingForApp);
    assert!(machine.expected().is_none());
    assert_eq!(log.last_screen(), Some(Shown::Waiting));
}

#[test]
fn machine_flags_tampered_signature() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    let msg = canonical_message("A123", "USD", 20).unwrap();
    let sig = sign_b64(msg.as_str());
    tag.load(tag_json("A123", "USD", 20, tampered(sig.as_str()).as_str()).as_bytes());
    tag.present.set(true);
    machine.poll();

    assert!(log.contains(&result_of(false, "Invalid sig")));
    assert_eq!(machine.state(), AppState::WaitingForApp);
}

#[test]
fn machine_flags_value_mismatch_on_genuine_signature() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    // The treasury genuinely signed a 50; the app expected a 20.
    tag.load(signed_tag_json("A123", "USD", 50).as_bytes());
    tag.present.set(true);
    machine.poll();

    assert!(log.contains(&result_of(false, "Value mismatch")));
}

#[test]
fn machine_flags_missing_signature() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    tag.load(tag_json("A123", "USD", 20, "").as_bytes());
    tag.present.set(true);
    machine.poll();

    assert!(log.contains(&result_of(false, "Missing sig")));
}

#[test]
fn machine_stays_scan_ready_when_tag_has_no_payload() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    // Tag memory left all zeroes: no `{` anywhere.
    tag.present.set(true);
    machine.poll();

    assert!(log.contains(&Shown::Info));
    assert!(log.no_result());
    assert_eq!(machine.state(), AppState::HaveDataWaitingScan);
    assert!(machine.expected().is_some());
    // The scan prompt was redrawn after the transient notice.
    assert_eq!(log.last_screen(), Some(Shown::ReadyToScan { denomination: 20 }));
}

#[test]
fn machine_returns_to_scan_ready_on_read_failure() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    tag.load(signed_tag_json("A123", "USD", 20).as_bytes());
    tag.present.set(true);
    tag.fail_page.set(Some(10));
    machine.poll();

    assert!(log.contains(&Shown::Info));
    assert!(log.no_result());
    assert_eq!(machine.state(), AppState::HaveDataWaitingScan);
}

#[test]
fn machine_fresh_intake_preempts_pending_expectation() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    machine.poll();
    mailbox.publish(br#"{"type":"scan","serial":"B999","currency":"eur","denomination":50}"#);
    machine.poll();

    assert_eq!(machine.state(), AppState::HaveDataWaitingScan);
    let exp = machine.expected().unwrap();
    assert_eq!(exp.serial.as_str(), "B999");
    assert_eq!(exp.currency.as_str(), "EUR");
    assert_eq!(exp.denomination, 50);
    assert!(log.contains(&Shown::ReadyToScan { denomination: 50 }));
}

#[test]
fn machine_dead_reader_shows_disconnected_and_recovers() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    tag.live.set(false);
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    assert_eq!(machine.health(), HealthState::Down);

    mailbox.publish(br#"{"type":"scan","serial":"A123","currency":"usd","denomination":20}"#);
    tag.present.set(true);
    machine.poll();

    // Scan gated off while down; the expectation is kept, not discarded.
    assert!(log.contains(&Shown::Disconnected));
    assert!(log.no_result());
    assert_eq!(machine.state(), AppState::HaveDataWaitingScan);
    assert!(machine.expected().is_some());

    // Reader comes back: the next due probe recovers and the scan runs.
    tag.live.set(true);
    tag.load(signed_tag_json("A123", "USD", 20).as_bytes());
    time.advance(500);
    machine.poll();

    assert!(log.contains(&result_of(true, "OK")));
    assert_eq!(machine.state(), AppState::WaitingForApp);
}

#[test]
fn machine_emits_periodic_status_line() {
    let time = FakeTime::new();
    let tag = FakeTag::new();
    let log = PresenterLog::new();
    let mailbox = Mailbox::new();
    let display = Cell::new(false);
    let tag_cs = Cell::new(false);
    let bus = BusArbiter::new(LineProbe(&display), LineProbe(&tag_cs));
    let mut machine = Machine::new(&mailbox, &tag, Dalek, &log, &time, &time, bus, test_key());

    time.advance(250);
    machine.poll();
    assert!(log.contains(&Shown::Status {
        app: AppState::WaitingForApp,
        health: HealthState::Up,
    }));
}
