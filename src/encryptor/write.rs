//! src/encryptor/write.rs
//! The push-side adapter around the encrypt state machine.

use std::io::Write;

use crate::error::ZipCryptError;

use super::state::Machine;

/// Encrypts a plain ZIP archive while it is being written.
///
/// Wrap the sink that should receive the protected archive, then write
/// the plain archive in: either one byte at a time through
/// [`write_byte`], or through the [`std::io::Write`] impl. Entries whose
/// sizes are deferred to a data descriptor are held in memory until the
/// descriptor arrives; everything else streams straight through.
///
/// Call [`finish`] when the whole archive has been written: it checks the
/// input ended on a record boundary, flushes, and hands the sink back.
/// After any error the writer is poisoned and every later call reports
/// the poisoning.
///
/// # Example
///
/// ```no_run
/// use std::fs::File;
/// use std::io::{self, Write};
/// use zipcrypt_rs::ZipEncryptWriter;
///
/// let mut plain = File::open("plain.zip")?;
/// let dst = File::create("protected.zip")?;
/// let mut writer = ZipEncryptWriter::new(dst, "password");
/// io::copy(&mut plain, &mut writer)?;
/// writer.finish()?;
/// # Ok::<(), io::Error>(())
/// ```
///
/// [`write_byte`]: ZipEncryptWriter::write_byte
/// [`finish`]: ZipEncryptWriter::finish
pub struct ZipEncryptWriter<W: Write> {
    sink: W,
    machine: Machine,
    poisoned: bool,
}

impl<W: Write> ZipEncryptWriter<W> {
    /// Wrap `sink` and encrypt with `password`. The password is used to
    /// derive the cipher keys and is not retained.
    pub fn new(sink: W, password: &str) -> Self {
        Self::with_password_bytes(sink, password.as_bytes())
    }

    /// Like [`new`](Self::new) but takes the password as raw bytes (the
    /// low 8 bits of each code unit). Callers holding the password in a
    /// wipeable buffer can zero it as soon as this returns; only the
    /// derived key triple lives on, and it wipes itself on drop.
    pub fn with_password_bytes(sink: W, password: &[u8]) -> Self {
        Self {
            sink,
            machine: Machine::new(password),
            poisoned: false,
        }
    }

    /// Feed one byte of the plain archive. Zero or more bytes reach the
    /// sink: none while a field or a deferred-size entry is being
    /// collected, many when such an entry flushes.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), ZipCryptError> {
        if self.poisoned {
            return Err(ZipCryptError::Malformed(
                "writer is poisoned by an earlier error".into(),
            ));
        }
        match self.machine.push(byte, &mut self.sink) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    /// Bytes delivered to the sink so far.
    pub fn bytes_written(&self) -> u64 {
        self.machine.bytes_written()
    }

    /// Declare the input complete: verify it ended on a record boundary,
    /// flush the sink, and return it.
    pub fn finish(mut self) -> Result<W, ZipCryptError> {
        if self.poisoned {
            return Err(ZipCryptError::Malformed(
                "writer is poisoned by an earlier error".into(),
            ));
        }
        if !self.machine.at_record_boundary() {
            return Err(ZipCryptError::Malformed(
                "input ends inside a record".into(),
            ));
        }
        self.sink.flush()?;
        Ok(self.sink)
    }
}

impl<W: Write> Write for ZipEncryptWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for &b in buf {
            self.write_byte(b)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }
}
