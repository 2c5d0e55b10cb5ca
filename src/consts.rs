// src/consts.rs

/// Length of the encryption header prepended to every protected payload.
pub const ENCRYPTION_HEADER_LEN: usize = 12;

/// Number of random bytes at the start of the encryption header; the
/// remaining two bytes carry the check value.
pub const ENCRYPTION_HEADER_RANDOM_LEN: usize = 10;

/// Row size of the in-memory buffer used for entries whose compressed
/// size is only known after the payload.
pub const BUFFER_ROW_LEN: usize = 65_536;

/// Look-ahead window of the decrypter.
pub const PEEK_LEN: usize = 8;
