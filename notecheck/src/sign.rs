// SPDX-FileCopyrightText: 2025 Cashmark Devices <hello@cashmark.dev>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signature verification of a scanned record against the pinned treasury
//! key. Deterministic and side-effect-free; there is nothing to retry here.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::canonical::canonical_message;
use crate::record::ScannedRecord;

/// Asymmetric verification primitive, injected by the platform.
pub trait Ed25519Verify {
    fn verify(
        &self,
        message: &[u8],
        signature: &[u8; 64],
        pubkey: &[u8; 32],
    ) -> VerificationResult;
}

/// Verification result. The values are arbitrary, but chosen to be
/// different by more than one bit to make glitching attacks more difficult.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
pub enum VerificationResult {
    Valid = 0xcafe_babe,
    Invalid = 0xdead_beef,
}

/// The compiled-in trusted authority key, already decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinnedKey([u8; 32]);

/// Failure to decode the compiled-in key. This is a build configuration
/// fault caught once at boot, never a per-scan error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum KeyError {
    BadEncoding,
    WrongLength,
}

impl core::fmt::Display for KeyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BadEncoding => write!(f, "key is not valid base64"),
            Self::WrongLength => write!(f, "key does not decode to 32 bytes"),
        }
    }
}

impl PinnedKey {
    /// Decode the base64 authority key.
    pub fn decode(b64: &str) -> Result<Self, KeyError> {
        let mut buf = [0u8; 48];
        let len = BASE64
            .decode_slice(b64.as_bytes(), &mut buf)
            .map_err(|_| KeyError::BadEncoding)?;
        if len != 32 {
            return Err(KeyError::WrongLength);
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&buf[..32]);
        Ok(Self(key))
    }

    pub const fn from_bytes(key: [u8; 32]) -> Self {
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Signature-stage failures. Both fail closed; they are distinguished only
/// for the operator-facing alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignatureError {
    /// The record carries no signature at all.
    MissingSignature,
    /// Undecodable, wrong-length, or mismatching signature.
    InvalidSignature,
}

/// Verify a scanned record against the pinned key.
///
/// The canonical message is built from the record's fields as received
/// (the scan path already normalized the currency); any ambiguity along
/// the way (decode error, wrong length) is an invalid signature, never
/// a verified note.
pub fn verify_record<V: Ed25519Verify>(
    record: &ScannedRecord,
    key: &PinnedKey,
    crypto: &V,
) -> Result<(), SignatureError> {
    if record.sig_b64.is_empty() {
        return Err(SignatureError::MissingSignature);
    }

    // 64 raw bytes, with headroom for decode_slice's conservative sizing.
    let mut buf = [0u8; 72];
    let len = BASE64
        .decode_slice(record.sig_b64.as_bytes(), &mut buf)
        .map_err(|_| SignatureError::InvalidSignature)?;
    if len != 64 {
        return Err(SignatureError::InvalidSignature);
    }
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&buf[..64]);

    let msg = canonical_message(&record.serial, &record.currency, record.value)
        .map_err(|_| SignatureError::InvalidSignature)?;
    debug!("canonical message: {}", msg.as_str());

    match crypto.verify(msg.as_bytes(), &signature, key.as_bytes()) {
        VerificationResult::Valid => Ok(()),
        VerificationResult::Invalid => Err(SignatureError::InvalidSignature),
    }
}
