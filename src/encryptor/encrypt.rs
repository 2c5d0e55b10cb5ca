// src/encryptor/encrypt.rs

use std::io::{Read, Write};

use crate::error::ZipCryptError;

use super::write::ZipEncryptWriter;

/// Encrypt a whole plain archive from `source` into `sink`.
///
/// Streams `source` through a [`ZipEncryptWriter`] and finishes it.
/// Returns the number of bytes written to `sink` (twelve more than the
/// input per entry).
pub fn encrypt<R, W>(mut source: R, sink: W, password: &str) -> Result<u64, ZipCryptError>
where
    R: Read,
    W: Write,
{
    let mut writer = ZipEncryptWriter::new(sink, password);
    let mut buf = [0u8; 4096];
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        for &b in &buf[..n] {
            writer.write_byte(b)?;
        }
    }
    let written = writer.bytes_written();
    writer.finish()?;
    Ok(written)
}
