//! src/decryptor/read.rs
//! The pull-side adapter around the decrypt state machine.

use std::io::Read;

use crate::error::ZipCryptError;

use super::peek::PeekReader;
use super::state::Machine;

/// Decrypts a ZipCrypto-protected archive while it is being read.
///
/// Wrap the source carrying the protected archive, then read the plain
/// archive out: either one byte at a time through [`read_byte`], or
/// through the [`std::io::Read`] impl. No seeking happens on the source
/// and nothing is buffered beyond an 8-byte look-ahead.
///
/// After any error the reader is poisoned: every later call reports the
/// poisoning instead of resuming mid-record.
///
/// # Example
///
/// ```no_run
/// use std::fs::File;
/// use std::io::Read;
/// use zipcrypt_rs::ZipDecryptReader;
///
/// let src = File::open("protected.zip")?;
/// let mut reader = ZipDecryptReader::new(src, "password");
/// let mut plain = Vec::new();
/// reader.read_to_end(&mut plain)?;
/// # Ok::<(), std::io::Error>(())
/// ```
///
/// [`read_byte`]: ZipDecryptReader::read_byte
pub struct ZipDecryptReader<R> {
    source: PeekReader<R>,
    machine: Machine,
    poisoned: bool,
}

impl<R: Read> ZipDecryptReader<R> {
    /// Wrap `source` and decrypt with `password`. The password is used to
    /// derive the cipher keys and is not retained.
    pub fn new(source: R, password: &str) -> Self {
        Self::with_password_bytes(source, password.as_bytes())
    }

    /// Like [`new`](Self::new) but takes the password as raw bytes (the
    /// low 8 bits of each code unit). Callers holding the password in a
    /// wipeable buffer can zero it as soon as this returns; only the
    /// derived key triple lives on, and it wipes itself on drop.
    pub fn with_password_bytes(source: R, password: &[u8]) -> Self {
        Self {
            source: PeekReader::new(source),
            machine: Machine::new(password, false),
            poisoned: false,
        }
    }

    /// Turn the advisory password check into a hard error.
    ///
    /// The 12th byte of each entry's encryption header is compared
    /// against a check byte from the entry metadata. The check catches a
    /// wrong password with probability 255/256 per entry; by default a
    /// mismatch is ignored and decryption produces garbage payload bytes,
    /// matching the behavior of most extractors. In strict mode the
    /// mismatch surfaces as [`ZipCryptError::PasswordCheck`].
    pub fn strict_password_check(mut self, strict: bool) -> Self {
        self.machine.set_strict(strict);
        self
    }

    /// The next plain byte, or `None` once the input is exhausted.
    /// Subsequent calls at end of input keep returning `None`.
    pub fn read_byte(&mut self) -> Result<Option<u8>, ZipCryptError> {
        if self.poisoned {
            return Err(ZipCryptError::Malformed(
                "reader is poisoned by an earlier error".into(),
            ));
        }
        match self.machine.next_output(&mut self.source) {
            Ok(b) => Ok(b),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Release the wrapped source.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }
}

impl<R: Read> Read for ZipDecryptReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_byte()? {
                Some(b) => {
                    buf[filled] = b;
                    filled += 1;
                }
                None => break,
            }
        }
        Ok(filled)
    }
}
