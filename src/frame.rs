//! Per-connection byte buffer: "give me at least `k` bytes from this socket."
//!
//! TCP does not respect message boundaries, so bytes belonging to the next
//! request may already sit in the buffer after the current request is
//! decoded. [`FrameReader`] keeps that residue around instead of discarding
//! it, and only touches the socket when the buffer genuinely runs dry.

use crate::error::{ServerError, ServerResult};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

/// Bytes read from the socket per `recv` call.
const READ_CHUNK: usize = 1024;

pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Ensures `self.buf` holds at least `k` bytes, reading from `stream` in
    /// chunks of up to [`READ_CHUNK`] bytes as needed. Fails with
    /// `ConnectionClosed` if the peer closes before `k` bytes accumulate.
    pub async fn ensure(&mut self, stream: &mut TcpStream, k: usize) -> ServerResult<()> {
        let mut chunk = [0u8; READ_CHUNK];
        while self.buf.len() < k {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ServerError::ConnectionClosed);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }

    /// Returns the buffered bytes without consuming them.
    pub fn peek(&self) -> &[u8] {
        &self.buf
    }

    /// Drops the first `n` bytes, keeping whatever comes after for the next
    /// request.
    pub fn consume(&mut self, n: usize) {
        self.buf.drain(..n);
    }
}

impl Default for FrameReader {
    fn default() -> Self {
        Self::new()
    }
}
