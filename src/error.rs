//! # Error Types
//!
//! This module defines the error type used throughout the library.
//! All operations return [`Result<T, ZipCryptError>`](ZipCryptError).

use thiserror::Error;

/// The error type for both transform directions.
///
/// Covers I/O errors, the archive-shape errors each direction can detect,
/// and the optional password check of the decrypter.
#[derive(Error, Debug)]
pub enum ZipCryptError {
    /// I/O error from the underlying source or sink.
    ///
    /// Wraps [`std::io::Error`] and is created automatically when a read
    /// or write on the wrapped stream fails.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The decrypter was handed an archive whose first entry is not
    /// password protected (local header flag bit 0 clear).
    #[error("archive is not password protected")]
    NotEncrypted,

    /// The encrypter was handed an archive that is already password
    /// protected (local header flag bit 0 set).
    #[error("archive is already password protected")]
    AlreadyEncrypted,

    /// The archive uses Strong Encryption (flag bit 6), which this
    /// library does not support.
    #[error("strong encryption is not supported")]
    StrongEncryption,

    /// The byte stream is not a ZIP archive this library can transform:
    /// an unrecognized signature at a record boundary, a zero-length file
    /// name, an inconsistent data-descriptor trailer, or input that ends
    /// in the middle of a record.
    #[error("malformed archive: {0}")]
    Malformed(String),

    /// The 12th decrypted byte of an entry's encryption header did not
    /// match its check value. Only raised in strict mode; see
    /// [`ZipDecryptReader::strict_password_check`](crate::ZipDecryptReader::strict_password_check).
    #[error("password check failed: expected {expected:#04x}, got {actual:#04x}")]
    PasswordCheck {
        /// Check byte stored in the entry metadata.
        expected: u8,
        /// Check byte recovered from the encryption header.
        actual: u8,
    },
}

impl From<ZipCryptError> for std::io::Error {
    fn from(e: ZipCryptError) -> Self {
        match e {
            ZipCryptError::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
