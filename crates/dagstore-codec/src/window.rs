// SPDX-License-Identifier: Apache-2.0
//! Buffered read window over an async byte stream.

use crate::CodecError;
use tokio::io::{AsyncRead, AsyncReadExt};

const INITIAL_CAPACITY: usize = 16 * 1024;

/// A buffered read cursor over `R`.
///
/// Decoders call [`ReadWindow::ensure`] to page in bytes until at least `n`
/// are resident, then [`ReadWindow::take`] to consume exactly `n` of them.
/// Unconsumed bytes (the start of the next frame, already read off the
/// socket) are preserved across calls rather than discarded.
pub struct ReadWindow<R> {
    source: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: AsyncRead + Unpin> ReadWindow<R> {
    /// Wrap `source` in a read window with the default initial capacity.
    pub fn new(source: R) -> Self {
        Self::with_capacity(source, INITIAL_CAPACITY)
    }

    /// Wrap `source` in a read window, pre-allocating `capacity` bytes.
    pub fn with_capacity(source: R, capacity: usize) -> Self {
        Self {
            source,
            buf: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Page in bytes from the underlying stream until at least `n` bytes are
    /// resident from the current cursor position.
    ///
    /// Compacts the already-consumed prefix first, so the buffer only grows
    /// when the unconsumed tail itself exceeds `n`.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnexpectedEof`] if the stream ends before `n`
    /// bytes become available, or [`CodecError::Io`] on a read failure.
    pub async fn ensure(&mut self, n: usize) -> Result<(), CodecError> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        while self.buf.len() < n {
            let mut chunk = [0u8; INITIAL_CAPACITY];
            let read = self.source.read(&mut chunk).await?;
            if read == 0 {
                return Err(CodecError::UnexpectedEof);
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }

    /// Consume and return the next `n` bytes.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `n` bytes are resident; callers must call
    /// [`ReadWindow::ensure`] first.
    pub fn take(&mut self, n: usize) -> &[u8] {
        let start = self.pos;
        self.pos += n;
        &self.buf[start..self.pos]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn ensure_then_take_reads_exact_bytes() {
        let mut win = ReadWindow::new(Cursor::new(b"hello world".to_vec()));
        win.ensure(5).await.unwrap();
        assert_eq!(win.take(5), b"hello");
        win.ensure(6).await.unwrap();
        assert_eq!(win.take(6), b" world");
    }

    #[tokio::test]
    async fn ensure_past_eof_errors() {
        let mut win = ReadWindow::new(Cursor::new(b"short".to_vec()));
        assert!(matches!(
            win.ensure(100).await,
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn repeated_small_takes_span_multiple_reads() {
        let mut win = ReadWindow::with_capacity(Cursor::new(vec![1, 2, 3, 4, 5, 6]), 2);
        win.ensure(3).await.unwrap();
        assert_eq!(win.take(3), &[1, 2, 3]);
        win.ensure(3).await.unwrap();
        assert_eq!(win.take(3), &[4, 5, 6]);
    }
}
