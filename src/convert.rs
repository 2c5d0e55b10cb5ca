// src/convert.rs

//! Re-key a protected archive in one streaming pass.

use std::io::{Read, Write};

use crate::decryptor::ZipDecryptReader;
use crate::encryptor::ZipEncryptWriter;
use crate::error::ZipCryptError;

/// Change the password of a protected archive by decrypting with the old
/// password and re-encrypting with the new one, byte by byte, without an
/// intermediate copy of the archive.
///
/// The entries get fresh encryption headers (fresh randomness), so the
/// output differs from a direct encryption of the same plain archive even
/// when the passwords match. Returns the number of bytes written to
/// `sink`.
pub fn change_password<R, W>(
    source: R,
    sink: W,
    old_password: &str,
    new_password: &str,
) -> Result<u64, ZipCryptError>
where
    R: Read,
    W: Write,
{
    let mut reader = ZipDecryptReader::new(source, old_password);
    let mut writer = ZipEncryptWriter::new(sink, new_password);
    while let Some(b) = reader.read_byte()? {
        writer.write_byte(b)?;
    }
    let written = writer.bytes_written();
    writer.finish()?;
    Ok(written)
}
