// src/decryptor/peek.rs
//! Bounded look-ahead over a byte source.
//!
//! The decrypter inspects up to 8 upcoming bytes (signatures, multi-byte
//! fields) before committing to a state transition. The window fills
//! lazily from the wrapped reader and never grows past [`PEEK_LEN`].

use std::io::Read;

use crate::consts::PEEK_LEN;

pub struct PeekReader<R> {
    inner: R,
    window: [u8; PEEK_LEN],
    len: usize,
}

impl<R: Read> PeekReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            window: [0; PEEK_LEN],
            len: 0,
        }
    }

    fn read_one(&mut self) -> std::io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Look at the next `n` bytes without consuming them. Returns fewer
    /// than `n` bytes only at end of input.
    pub fn peek(&mut self, n: usize) -> std::io::Result<&[u8]> {
        debug_assert!(n <= PEEK_LEN);
        while self.len < n {
            match self.read_one()? {
                Some(b) => {
                    self.window[self.len] = b;
                    self.len += 1;
                }
                None => break,
            }
        }
        Ok(&self.window[..self.len.min(n)])
    }

    /// Consume and return the next byte, `None` at end of input.
    pub fn next_byte(&mut self) -> std::io::Result<Option<u8>> {
        if self.len > 0 {
            let b = self.window[0];
            self.window.copy_within(1.., 0);
            self.len -= 1;
            return Ok(Some(b));
        }
        self.read_one()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
