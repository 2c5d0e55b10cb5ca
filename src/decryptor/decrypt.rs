// src/decryptor/decrypt.rs

use std::io::{BufWriter, Read, Write};

use crate::error::ZipCryptError;

use super::read::ZipDecryptReader;

/// Decrypt a whole protected archive from `source` into `sink`.
///
/// Streams `source` through a [`ZipDecryptReader`]. Returns the number of
/// bytes written to `sink` (twelve fewer than the input per entry).
pub fn decrypt<R, W>(source: R, sink: W, password: &str) -> Result<u64, ZipCryptError>
where
    R: Read,
    W: Write,
{
    let mut reader = ZipDecryptReader::new(source, password);
    let mut sink = BufWriter::new(sink);
    let mut written = 0u64;
    while let Some(b) = reader.read_byte()? {
        sink.write_all(&[b])?;
        written += 1;
    }
    sink.flush()?;
    Ok(written)
}
