// src/crypto/rng.rs
//! Operating-system randomness for the encryption header.
//!
//! A thread-local `OsRng` fills the ten random bytes at the front of each
//! entry's encryption header. Failure to draw randomness is an error, not
//! a fallback: those bytes are the only secret-independent randomness in
//! the output.

use rand::{rngs::OsRng, TryRngCore};
use std::cell::RefCell;

use crate::error::ZipCryptError;

thread_local! {
    static RNG: RefCell<OsRng> = const { RefCell::new(OsRng) };
}

/// Fill `dest` with cryptographically secure random bytes.
pub fn fill(dest: &mut [u8]) -> Result<(), ZipCryptError> {
    RNG.with(|rng| {
        rng.borrow_mut()
            .try_fill_bytes(dest)
            .map_err(|e| ZipCryptError::Io(std::io::Error::other(e)))
    })
}
