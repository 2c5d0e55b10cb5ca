// src/crypto/mod.rs

//! The ZipCrypto stream cipher and the randomness it needs.

pub(crate) mod keys;
pub(crate) mod rng;

pub use keys::KeyState;
