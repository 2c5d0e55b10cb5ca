// src/decryptor/state.rs
//! The pull-side state machine.
//!
//! Bytes are consumed from a [`PeekReader`] and transformed into the plain
//! archive: local headers keep their layout but lose the encrypted flag and
//! 12 bytes of compressed size, the 12-byte encryption header is dropped,
//! payloads are deciphered, and the central directory is adjusted back to
//! the positions and sizes the plain output actually has. Anything that is
//! not a recognized record at a section boundary passes through untouched.
//!
//! Multi-byte rewrites are staged in a small queue; payload bytes are
//! returned directly, one per input byte.

use std::collections::VecDeque;
use std::io::Read;

use crate::consts::ENCRYPTION_HEADER_LEN;
use crate::crypto::KeyState;
use crate::error::ZipCryptError;
use crate::record::{
    clear_encrypted, Signature, FLAG_DEFERRED_SIZES, FLAG_ENCRYPTED, FLAG_STRONG_ENCRYPTION,
};

use super::peek::PeekReader;

/// Where a passthrough span hands control when it runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AfterCopy {
    EncryptionHeader,
    Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// At a record boundary; classify the next signature.
    Section,
    /// Two flag bytes of a local file header.
    LfhFlags,
    /// Fixed fields between the flags and the name length.
    LfhFixed { deferred: bool },
    /// File-name length and extra-field length.
    LfhNameExtra,
    /// Uninterpreted span emitted unchanged.
    Passthrough { remaining: u64, then: AfterCopy },
    /// The 12-byte encryption header; consumed, decrypted, not emitted.
    EncryptionHeader,
    /// Payload with a known number of bytes left.
    Data { remaining: u64 },
    /// Payload that ends at the next data-descriptor signature.
    DataUnknown,
    /// Data descriptor after a deferred-size payload.
    DataDescriptor,
    /// Central file header.
    Cfh,
    /// End of central directory.
    Ecd,
    /// Passthrough to end of input.
    Tail,
    Eof,
}

pub(crate) struct Machine {
    state: State,
    password_keys: KeyState,
    working_keys: KeyState,
    strict: bool,
    /// Expected check byte of the entry currently being read.
    check_byte: u8,
    /// Encrypted payload length of the current entry, while known.
    compressed_size: Option<u64>,
    queue: VecDeque<u8>,
    /// Bytes emitted so far; the authoritative source for output offsets.
    bytes_out: u64,
    /// Output offset of each local header, in archive order.
    lfh_offsets: Vec<u32>,
    /// Index of the next central-directory entry to patch.
    cfh_index: usize,
    /// Output offset of the first central file header.
    cd_offset: Option<u32>,
}

impl Machine {
    pub(crate) fn new(password: &[u8], strict: bool) -> Self {
        let password_keys = KeyState::from_password(password);
        let working_keys = password_keys.clone();
        Self {
            state: State::Section,
            password_keys,
            working_keys,
            strict,
            check_byte: 0,
            compressed_size: None,
            queue: VecDeque::new(),
            bytes_out: 0,
            lfh_offsets: Vec::new(),
            cfh_index: 0,
            cd_offset: None,
        }
    }

    pub(crate) fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    fn take<R: Read, const N: usize>(
        &mut self,
        src: &mut PeekReader<R>,
    ) -> Result<[u8; N], ZipCryptError> {
        let mut out = [0u8; N];
        for slot in out.iter_mut() {
            *slot = src
                .next_byte()?
                .ok_or_else(|| ZipCryptError::Malformed("input ends inside a record".into()))?;
        }
        Ok(out)
    }

    fn enqueue(&mut self, bytes: &[u8]) {
        self.queue.extend(bytes);
    }

    #[inline]
    fn emit(&mut self, byte: u8) -> Result<Option<u8>, ZipCryptError> {
        self.bytes_out += 1;
        Ok(Some(byte))
    }

    /// Produce the next output byte, or `None` once the input is drained.
    pub(crate) fn next_output<R: Read>(
        &mut self,
        src: &mut PeekReader<R>,
    ) -> Result<Option<u8>, ZipCryptError> {
        loop {
            if let Some(b) = self.queue.pop_front() {
                return self.emit(b);
            }

            match self.state {
                State::Section => {
                    let window = src.peek(4)?;
                    if window.is_empty() {
                        self.state = State::Eof;
                        continue;
                    }
                    let sig = if window.len() == 4 {
                        Signature::classify([window[0], window[1], window[2], window[3]])
                    } else {
                        None
                    };
                    match sig {
                        Some(Signature::LocalFileHeader) => {
                            self.lfh_offsets.push(self.bytes_out as u32);
                            let head: [u8; 6] = self.take(src)?; // magic + version needed
                            self.enqueue(&head);
                            self.state = State::LfhFlags;
                        }
                        Some(Signature::CentralFileHeader) => self.state = State::Cfh,
                        Some(Signature::EndOfCentralDirectory) => self.state = State::Ecd,
                        _ => self.state = State::Tail,
                    }
                }

                State::LfhFlags => {
                    let flag_bytes: [u8; 2] = self.take(src)?;
                    let flags = u16::from_le_bytes(flag_bytes);
                    if flags & FLAG_ENCRYPTED == 0 {
                        return Err(ZipCryptError::NotEncrypted);
                    }
                    if flags & FLAG_STRONG_ENCRYPTION != 0 {
                        return Err(ZipCryptError::StrongEncryption);
                    }
                    self.enqueue(&[clear_encrypted(flag_bytes[0]), flag_bytes[1]]);
                    self.state = State::LfhFixed {
                        deferred: flags & FLAG_DEFERRED_SIZES != 0,
                    };
                }

                State::LfhFixed { deferred } => {
                    if deferred {
                        // method, time, date, then zeroed crc/sizes
                        let fixed: [u8; 18] = self.take(src)?;
                        // high byte of the 16-bit mod time stands in for
                        // the crc check byte when sizes are deferred
                        self.check_byte = fixed[3];
                        self.enqueue(&fixed);
                        self.compressed_size = None;
                    } else {
                        let head: [u8; 6] = self.take(src)?; // method, time, date
                        self.enqueue(&head);
                        let crc: [u8; 4] = self.take(src)?;
                        self.check_byte = crc[3];
                        self.enqueue(&crc);
                        let csize = u32::from_le_bytes(self.take(src)?);
                        self.enqueue(&csize.wrapping_sub(ENCRYPTION_HEADER_LEN as u32).to_le_bytes());
                        let usize_bytes: [u8; 4] = self.take(src)?;
                        self.enqueue(&usize_bytes);
                        self.compressed_size = Some(u64::from(csize));
                    }
                    self.state = State::LfhNameExtra;
                }

                State::LfhNameExtra => {
                    let lens: [u8; 4] = self.take(src)?;
                    let name_len = u16::from_le_bytes([lens[0], lens[1]]);
                    let extra_len = u16::from_le_bytes([lens[2], lens[3]]);
                    self.enqueue(&lens);
                    self.state = State::Passthrough {
                        remaining: u64::from(name_len) + u64::from(extra_len),
                        then: AfterCopy::EncryptionHeader,
                    };
                }

                State::Passthrough { remaining, then } => {
                    if remaining == 0 {
                        self.state = match then {
                            AfterCopy::EncryptionHeader => State::EncryptionHeader,
                            AfterCopy::Section => State::Section,
                        };
                        continue;
                    }
                    let bytes: [u8; 1] = self.take(src)?;
                    self.state = State::Passthrough {
                        remaining: remaining - 1,
                        then,
                    };
                    return self.emit(bytes[0]);
                }

                State::EncryptionHeader => {
                    self.working_keys = self.password_keys.clone();
                    let header: [u8; ENCRYPTION_HEADER_LEN] = self.take(src)?;
                    let mut last = 0u8;
                    for &b in &header {
                        last = self.working_keys.decrypt_byte(b);
                    }
                    if self.strict && last != self.check_byte {
                        return Err(ZipCryptError::PasswordCheck {
                            expected: self.check_byte,
                            actual: last,
                        });
                    }
                    self.state = match self.compressed_size {
                        Some(total) => {
                            let payload = total.checked_sub(ENCRYPTION_HEADER_LEN as u64).ok_or_else(|| {
                                ZipCryptError::Malformed(
                                    "compressed size smaller than the encryption header".into(),
                                )
                            })?;
                            if payload == 0 {
                                State::Section
                            } else {
                                State::Data { remaining: payload }
                            }
                        }
                        None => State::DataUnknown,
                    };
                }

                State::Data { remaining } => {
                    let bytes: [u8; 1] = self.take(src)?;
                    let plain = self.working_keys.decrypt_byte(bytes[0]);
                    self.state = if remaining == 1 {
                        State::Section
                    } else {
                        State::Data {
                            remaining: remaining - 1,
                        }
                    };
                    return self.emit(plain);
                }

                State::DataUnknown => {
                    let window = src.peek(4)?;
                    if window == Signature::DataDescriptor.magic() {
                        self.state = State::DataDescriptor;
                        continue;
                    }
                    let bytes: [u8; 1] = self.take(src)?;
                    let plain = self.working_keys.decrypt_byte(bytes[0]);
                    return self.emit(plain);
                }

                State::DataDescriptor => {
                    let head: [u8; 8] = self.take(src)?; // magic + crc
                    self.enqueue(&head);
                    let csize = u32::from_le_bytes(self.take(src)?);
                    self.enqueue(&csize.wrapping_sub(ENCRYPTION_HEADER_LEN as u32).to_le_bytes());
                    let usize_bytes: [u8; 4] = self.take(src)?;
                    self.enqueue(&usize_bytes);
                    self.state = State::Section;
                }

                State::Cfh => {
                    if self.cd_offset.is_none() {
                        self.cd_offset = Some(self.bytes_out as u32);
                    }
                    let head: [u8; 8] = self.take(src)?; // magic + both versions
                    self.enqueue(&head);
                    let flag_bytes: [u8; 2] = self.take(src)?;
                    self.enqueue(&[clear_encrypted(flag_bytes[0]), flag_bytes[1]]);
                    let mid: [u8; 6] = self.take(src)?; // method, time, date
                    self.enqueue(&mid);
                    let crc: [u8; 4] = self.take(src)?;
                    self.enqueue(&crc);
                    let csize = u32::from_le_bytes(self.take(src)?);
                    self.enqueue(&csize.wrapping_sub(ENCRYPTION_HEADER_LEN as u32).to_le_bytes());
                    let usize_bytes: [u8; 4] = self.take(src)?;
                    self.enqueue(&usize_bytes);
                    let lens: [u8; 6] = self.take(src)?;
                    let name_len = u16::from_le_bytes([lens[0], lens[1]]);
                    let extra_len = u16::from_le_bytes([lens[2], lens[3]]);
                    let comment_len = u16::from_le_bytes([lens[4], lens[5]]);
                    self.enqueue(&lens);
                    let attrs: [u8; 8] = self.take(src)?; // disk start + attributes
                    self.enqueue(&attrs);
                    let _original_offset: [u8; 4] = self.take(src)?;
                    let offset = *self.lfh_offsets.get(self.cfh_index).ok_or_else(|| {
                        ZipCryptError::Malformed(
                            "central directory entry without a local header".into(),
                        )
                    })?;
                    self.enqueue(&offset.to_le_bytes());
                    self.cfh_index += 1;
                    self.state = State::Passthrough {
                        remaining: u64::from(name_len)
                            + u64::from(extra_len)
                            + u64::from(comment_len),
                        then: AfterCopy::Section,
                    };
                }

                State::Ecd => {
                    let head: [u8; 16] = self.take(src)?; // magic, disks, counts, cd size
                    self.enqueue(&head);
                    let original_offset: [u8; 4] = self.take(src)?;
                    match self.cd_offset {
                        Some(offset) => self.enqueue(&offset.to_le_bytes()),
                        None => self.enqueue(&original_offset),
                    }
                    self.state = State::Tail;
                }

                State::Tail => match src.next_byte()? {
                    Some(b) => return self.emit(b),
                    None => {
                        self.state = State::Eof;
                        continue;
                    }
                },

                State::Eof => return Ok(None),
            }
        }
    }
}
