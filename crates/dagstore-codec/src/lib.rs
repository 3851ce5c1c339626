// SPDX-License-Identifier: Apache-2.0
//! Binary wire codec for dagstore domain types.
//!
//! # Wire format
//!
//! ```text
//! integers   fixed-width, big-endian (u8 = 1 byte, u32 = 4 bytes, u64 = 8)
//! bool       1 byte, 0x00 / 0x01
//! string     u32 byte length, then UTF-8 bytes, no terminator
//! list<T>    u32 element count, then that many T
//! option<T>  1 byte presence tag (0x00 absent / 0x01 present), then T if present
//! key        raw digest bytes, width fixed by instantiation, no length prefix
//! value      1 byte tag (0x00 blob / 0x01 node), payload, then predecessor list
//! tag        string
//! graph      list<key> vertices, then list<(key,key)> edges
//! ```
//!
//! [`Wire::write`]/[`Wire::decode`] are async: reads may need to wait for more
//! bytes to arrive on the underlying stream, and writes flush through the
//! same `tokio::io` primitives the server and sync engine already depend on.
//! The waiting primitive is [`ReadWindow::ensure`] — "page in until at least
//! `n` bytes are resident" — which every decode implementation calls before
//! slicing into the buffer. On a codec error the connection is torn down,
//! so no caller observes a partially-consumed type.
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

mod wire_impls;
mod window;

pub use window::ReadWindow;

use dagstore_key::Key;
use std::future::Future;
use std::string::FromUtf8Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Errors raised by the codec: malformed bytes on the wire, or an underlying
/// stream failure. Both are fatal for the connection that produced them.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The underlying stream ended before a full frame was available.
    #[error("unexpected end of stream")]
    UnexpectedEof,
    /// Underlying I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A length-prefixed string was not valid UTF-8.
    #[error("invalid utf-8 in string: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
    /// A 1-byte discriminant tag had an unrecognized value.
    #[error("invalid tag byte: {0:#04x}")]
    InvalidTag(u8),
    /// A declared length would exceed the codec's safety bound.
    #[error("length {0} exceeds the codec's safety bound")]
    LengthTooLarge(u64),
}

/// Safety bound on any single length-prefixed field, guarding against a
/// corrupt or adversarial peer declaring a multi-gigabyte allocation.
pub const MAX_FRAME_LEN: u64 = 256 * 1024 * 1024;

/// A domain type that can be written to and read from the wire.
///
/// `encode` appends exactly [`Wire::sizeof`] bytes to `out`; [`Wire::write`]
/// is the default async entry point built on top of it (encode to a
/// temporary buffer, then a single `write_all`). `decode` is the async read
/// side, built on [`ReadWindow::ensure`].
pub trait Wire: Sized {
    /// Serialized byte length of `self`.
    fn sizeof(&self) -> usize;

    /// Append the wire encoding of `self` to `out`. Must append exactly
    /// [`Wire::sizeof`] bytes.
    fn encode(&self, out: &mut Vec<u8>);

    /// Decode a value from `win`, advancing its read cursor past exactly the
    /// bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] on malformed bytes or a stream failure.
    fn decode<R>(win: &mut ReadWindow<R>) -> impl Future<Output = Result<Self, CodecError>> + Send
    where
        R: AsyncRead + Unpin + Send;

    /// Write `self` to `w`: encode to a buffer, then one `write_all`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Io`] on a stream failure.
    fn write<W>(&self, w: &mut W) -> impl Future<Output = Result<(), CodecError>> + Send
    where
        W: AsyncWrite + Unpin + Send,
        Self: Sync,
    {
        async move {
            let mut buf = Vec::with_capacity(self.sizeof());
            self.encode(&mut buf);
            w.write_all(&buf).await?;
            Ok(())
        }
    }
}

/// Debug/JSON mirror: serialize a wire type to its JSON shape.
///
/// Thin wrapper over `serde_json`, not a bespoke pretty-printer — the
/// human-readable mirror is meant for external tooling (log inspection,
/// debugging scripts), not as a second wire format to maintain by hand.
///
/// # Errors
///
/// Returns a `serde_json::Error` if `x` cannot be represented as JSON.
pub fn to_json<T: serde::Serialize>(x: &T) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(x)
}

/// Debug/JSON mirror: deserialize a wire type from its JSON shape.
///
/// # Errors
///
/// Returns a `serde_json::Error` if `json` does not match `T`'s shape.
pub fn of_json<T: serde::de::DeserializeOwned>(
    json: serde_json::Value,
) -> Result<T, serde_json::Error> {
    serde_json::from_value(json)
}

pub(crate) fn key_from_slice(bytes: &[u8]) -> Key {
    let mut arr = [0u8; dagstore_key::KEY_WIDTH];
    arr.copy_from_slice(bytes);
    Key::from_bytes(arr)
}
