//! src/crypto/keys.rs
//! PKWARE traditional (ZipCrypto) key schedule and per-byte stream cipher.
//!
//! Three 32-bit keys, initialized to fixed magic values and stirred with
//! each password byte. Every processed plaintext byte updates the keys, so
//! both directions feed `update` with plaintext: the encrypter with the
//! byte it is hiding, the decrypter with the byte it just recovered.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Standard CRC-32 lookup table (reversed polynomial 0xEDB88320).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0u32;
    while i < 256 {
        let mut crc = i;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i as usize] = crc;
        i += 1;
    }
    table
};

const INITIAL_KEY0: u32 = 0x12345678;
const INITIAL_KEY1: u32 = 0x23456789;
const INITIAL_KEY2: u32 = 0x34567890;

#[inline]
fn crc32_step(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc ^ byte as u32) & 0xFF) as usize] ^ (crc >> 8)
}

/// The three-word cipher state.
///
/// A transformer keeps two of these: the password keys, derived once from
/// the password and immutable for the life of the transformer, and the
/// working keys, reset from the password keys at the start of every entry
/// payload. Both wipe themselves on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KeyState {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl KeyState {
    /// Derive the key triple from a password. Only the low 8 bits of each
    /// code unit participate; the password itself is not retained.
    pub fn from_password(password: &[u8]) -> Self {
        let mut keys = Self {
            key0: INITIAL_KEY0,
            key1: INITIAL_KEY1,
            key2: INITIAL_KEY2,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    /// Stir one plaintext byte into the key state.
    #[inline]
    pub fn update(&mut self, byte: u8) {
        self.key0 = crc32_step(self.key0, byte);
        self.key1 = self.key1.wrapping_add(self.key0 & 0xFF);
        self.key1 = self.key1.wrapping_mul(134775813).wrapping_add(1);
        self.key2 = crc32_step(self.key2, (self.key1 >> 24) as u8);
    }

    /// The next keystream byte. Does not advance the state; `update`
    /// advances it.
    #[inline]
    pub fn keystream_byte(&self) -> u8 {
        let t = (self.key2 | 2) as u16;
        (t.wrapping_mul(t ^ 1) >> 8) as u8
    }

    /// Encrypt one byte, advancing the keys with the plaintext.
    #[inline]
    pub fn encrypt_byte(&mut self, byte: u8) -> u8 {
        let cipher = byte ^ self.keystream_byte();
        self.update(byte);
        cipher
    }

    /// Decrypt one byte, advancing the keys with the recovered plaintext.
    #[inline]
    pub fn decrypt_byte(&mut self, byte: u8) -> u8 {
        let plain = byte ^ self.keystream_byte();
        self.update(plain);
        plain
    }

    /// The current key words (for debugging and test vectors).
    pub fn words(&self) -> (u32, u32, u32) {
        (self.key0, self.key1, self.key2)
    }
}
