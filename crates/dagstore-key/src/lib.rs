// SPDX-License-Identifier: Apache-2.0
//! Content-addressed `Key` type for dagstore.
//!
//! A [`Key`] is a fixed-width digest identifying a `Value` by the hash of its
//! canonical encoding. Construction never fails, ordering is byte-wise, and
//! [`Key::concat`] derives a new key from the concatenation of others (used by
//! the merge algebra to hash a sorted predecessor list).
//!
//! # Hash Domain
//!
//! Keys are BLAKE3 digests with no domain separation prefix: the bytes fed to
//! [`Key::of_bytes`] ARE the identity. Callers needing domain separation
//! (distinguishing a blob's content hash from a node's canonical encoding
//! hash) must encode that distinction into the bytes before hashing — `Value`
//! does this by hashing the full tagged encoding, not raw payload bytes.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Width in bytes of a [`Key`]'s digest.
///
/// Fixed at compile time by the hash implementation in use (BLAKE3's native
/// output width). A configuration knob for hash width exists for alternate
/// instantiations; this build has one instantiation, so the constant and
/// the knob agree by construction.
pub const KEY_WIDTH: usize = 32;

/// A fixed-width content digest identifying a `Value`.
///
/// Totally ordered (lexicographic on bytes), hashable to a machine word via
/// [`std::hash::Hash`], and cheap to copy.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key([u8; KEY_WIDTH]);

impl Key {
    /// Wrap raw digest bytes directly. Does not hash — for decoding wire
    /// bytes that are already a digest.
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_WIDTH]) -> Self {
        Self(bytes)
    }

    /// Derive a key from an arbitrary byte string.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Derive a key from the concatenation of other keys.
    ///
    /// `concat([k1, ..., kn]) = hash(k1 || ... || kn)`. Order-sensitive:
    /// callers that need a stable key for an unordered set of predecessors
    /// must sort them first.
    #[must_use]
    pub fn concat<'a, I>(keys: I) -> Self
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let mut hasher = blake3::Hasher::new();
        for k in keys {
            hasher.update(&k.0);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// View the digest as a byte slice.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_WIDTH] {
        &self.0
    }

    /// Digest width in bytes (constant for this instantiation).
    #[must_use]
    pub const fn length() -> usize {
        KEY_WIDTH
    }

    /// Hash to a machine-word-sized integer suitable for table bucketing.
    ///
    /// Reinterprets the first 8 bytes of the digest as a big-endian `u64`.
    #[must_use]
    pub fn hash_word(&self) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.0[..8]);
        u64::from_be_bytes(buf)
    }

    /// Lowercase hex representation, used by the debug/JSON mirror.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase hex representation produced by [`Key::to_hex`].
    ///
    /// # Errors
    ///
    /// Returns [`HexKeyError`] if `s` is not exactly `2 * KEY_WIDTH` hex
    /// characters.
    pub fn from_hex(s: &str) -> Result<Self, HexKeyError> {
        if s.len() != KEY_WIDTH * 2 {
            return Err(HexKeyError::WrongLength(s.len()));
        }
        let mut bytes = [0u8; KEY_WIDTH];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| HexKeyError::BadDigit)?;
        Ok(Self(bytes))
    }
}

/// Error parsing a hex-encoded [`Key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HexKeyError {
    /// Input was not exactly `2 * KEY_WIDTH` characters.
    #[error("expected {} hex chars, got {0}", KEY_WIDTH * 2)]
    WrongLength(usize),
    /// Input contained a non-hex-digit character.
    #[error("non-hex digit in key string")]
    BadDigit,
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Key").field(&self.to_hex()).finish()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl Serialize for Key {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Key::from_hex(&s).map_err(DeError::custom)
    }
}
