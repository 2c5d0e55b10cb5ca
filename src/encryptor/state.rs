// src/encryptor/state.rs
//! The push-side state machine.
//!
//! The input is a plain archive arriving one byte at a time; the output is
//! the protected archive. Beyond enciphering payloads this machine has to
//! rewrite everything the injected 12-byte headers displace: compressed
//! sizes in local and central headers, per-entry local-header offsets in
//! the central directory, and the directory start offset in the end
//! record. `bytes_written` counts delivered output bytes and is the only
//! source for those offsets.
//!
//! Fixed-width spans are crossed with a passthrough counter (`copy`) and a
//! small field accumulator (`acc`) instead of one state per byte offset.

use std::io::Write;

use crate::consts::{ENCRYPTION_HEADER_LEN, ENCRYPTION_HEADER_RANDOM_LEN};
use crate::crypto::{rng, KeyState};
use crate::error::ZipCryptError;
use crate::record::{
    mark_encrypted, Signature, SignatureScanner, FLAG_DEFERRED_SIZES, FLAG_ENCRYPTED,
    FLAG_STRONG_ENCRYPTION,
};

use super::buffer::RowBuffer;

/// Length of the local-header span held back for a deferred-size entry:
/// method field through extra-length field (the magic, version and flags
/// have already been emitted).
const HELD_FIXED_LEN: usize = 22;

/// Offset of the name-length field within that span.
const HELD_NAME_LEN_OFFSET: usize = 18;

/// Boundary signatures that can follow a deferred-size entry.
const DEFERRED_BOUNDARIES: &[Signature] =
    &[Signature::LocalFileHeader, Signature::CentralFileHeader];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Accumulating a 4-byte signature at a record boundary.
    Section,
    /// Two flag bytes of a local header.
    LfhFlags,
    /// CRC, compressed size, uncompressed size of a sized entry.
    LfhTriple,
    /// Name-length and extra-length fields of a sized entry.
    LfhLens,
    /// Name and extra field copied; the encryption header goes out when
    /// the first payload (or next-record) byte arrives.
    PayloadStart,
    /// Enciphering a payload of known remaining length.
    Data { remaining: u64 },
    /// Holding back a deferred-size entry until its boundary signature.
    Buffering,
    /// Two flag bytes of a central header.
    CfhFlags,
    /// CRC/size triple of a central header, replaced from the ledger.
    CfhTriple,
    /// Name/extra/comment lengths of a central header.
    CfhLens,
    /// Local-header offset field of a central header.
    CfhOffset { trailing: u64 },
    /// Directory-offset field of the end record.
    EcdOffset,
    /// Everything after the end record passes through.
    Tail,
}

pub(crate) struct Machine {
    state: State,
    password_keys: KeyState,
    working_keys: KeyState,
    /// Passthrough countdown; consumed before the state logic sees bytes.
    copy: u64,
    /// Accumulator for the fixed field the current state is collecting.
    acc: [u8; 12],
    acc_len: usize,
    /// CRC of the entry currently being written; its two high bytes are
    /// the encryption-header check value.
    entry_crc: u32,
    /// Payload length of the entry whose name/extra span is streaming by.
    pending_payload: u64,
    held: RowBuffer,
    scanner: Option<SignatureScanner>,
    /// Output offset of each emitted local header, in archive order.
    local_header_offsets: Vec<u32>,
    /// Post-adjustment CRC/csize/usize triple per entry; central-directory
    /// entries are patched from this ledger.
    crc_and_size: Vec<[u8; 12]>,
    /// Index of the next central-directory entry to patch.
    next_cfh: usize,
    /// Output offset of the first central file header.
    central_directory_offset: Option<u32>,
    bytes_written: u64,
}

impl Machine {
    pub(crate) fn new(password: &[u8]) -> Self {
        let password_keys = KeyState::from_password(password);
        let working_keys = password_keys.clone();
        Self {
            state: State::Section,
            password_keys,
            working_keys,
            copy: 0,
            acc: [0; 12],
            acc_len: 0,
            entry_crc: 0,
            pending_payload: 0,
            held: RowBuffer::new(),
            scanner: None,
            local_header_offsets: Vec::new(),
            crc_and_size: Vec::new(),
            next_cfh: 0,
            central_directory_offset: None,
            bytes_written: 0,
        }
    }

    fn emit<W: Write>(&mut self, out: &mut W, bytes: &[u8]) -> Result<(), ZipCryptError> {
        out.write_all(bytes)?;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Accumulate `byte`; once `want` bytes are in, reset and return them
    /// (the field occupies the front of the returned array).
    fn gather(&mut self, byte: u8, want: usize) -> Option<[u8; 12]> {
        self.acc[self.acc_len] = byte;
        self.acc_len += 1;
        if self.acc_len == want {
            self.acc_len = 0;
            Some(self.acc)
        } else {
            None
        }
    }

    /// Reseed the working keys and emit the 12-byte encryption header:
    /// ten random bytes plus the two high bytes of the entry CRC, all
    /// enciphered.
    fn emit_encryption_header<W: Write>(&mut self, out: &mut W) -> Result<(), ZipCryptError> {
        self.working_keys = self.password_keys.clone();
        let mut header = [0u8; ENCRYPTION_HEADER_LEN];
        rng::fill(&mut header[..ENCRYPTION_HEADER_RANDOM_LEN])?;
        header[ENCRYPTION_HEADER_RANDOM_LEN] = (self.entry_crc >> 16) as u8;
        header[ENCRYPTION_HEADER_RANDOM_LEN + 1] = (self.entry_crc >> 24) as u8;
        let mut cipher = [0u8; ENCRYPTION_HEADER_LEN];
        for (slot, b) in cipher.iter_mut().zip(header) {
            *slot = self.working_keys.encrypt_byte(b);
        }
        self.emit(out, &cipher)
    }

    pub(crate) fn push<W: Write>(&mut self, byte: u8, out: &mut W) -> Result<(), ZipCryptError> {
        if self.copy > 0 {
            self.copy -= 1;
            return self.emit(out, &[byte]);
        }

        match self.state {
            State::Section => {
                let Some(field) = self.gather(byte, 4) else {
                    return Ok(());
                };
                let magic = [field[0], field[1], field[2], field[3]];
                match Signature::classify(magic) {
                    Some(Signature::LocalFileHeader) => {
                        self.local_header_offsets.push(self.bytes_written as u32);
                        self.emit(out, &magic)?;
                        self.copy = 2; // version needed
                        self.state = State::LfhFlags;
                    }
                    Some(Signature::CentralFileHeader) => {
                        if self.central_directory_offset.is_none() {
                            self.central_directory_offset = Some(self.bytes_written as u32);
                        }
                        self.emit(out, &magic)?;
                        self.copy = 4; // version made by + version needed
                        self.state = State::CfhFlags;
                    }
                    Some(Signature::EndOfCentralDirectory) => {
                        self.emit(out, &magic)?;
                        self.copy = 12; // disk numbers, entry counts, directory size
                        self.state = State::EcdOffset;
                    }
                    _ => {
                        return Err(ZipCryptError::Malformed(format!(
                            "unrecognized signature {magic:02x?} at a record boundary"
                        )));
                    }
                }
                Ok(())
            }

            State::LfhFlags => {
                let Some(field) = self.gather(byte, 2) else {
                    return Ok(());
                };
                let flags = u16::from_le_bytes([field[0], field[1]]);
                if flags & FLAG_ENCRYPTED != 0 {
                    return Err(ZipCryptError::AlreadyEncrypted);
                }
                if flags & FLAG_STRONG_ENCRYPTION != 0 {
                    return Err(ZipCryptError::StrongEncryption);
                }
                self.emit(out, &[mark_encrypted(field[0]), field[1]])?;
                if flags & FLAG_DEFERRED_SIZES != 0 {
                    self.held.release();
                    self.scanner = Some(SignatureScanner::new(DEFERRED_BOUNDARIES));
                    self.state = State::Buffering;
                } else {
                    self.copy = 6; // method, time, date
                    self.state = State::LfhTriple;
                }
                Ok(())
            }

            State::LfhTriple => {
                let Some(field) = self.gather(byte, 12) else {
                    return Ok(());
                };
                let crc = u32::from_le_bytes([field[0], field[1], field[2], field[3]]);
                let csize = u32::from_le_bytes([field[4], field[5], field[6], field[7]]);
                let mut triple = [0u8; 12];
                triple[..4].copy_from_slice(&field[..4]);
                triple[4..8].copy_from_slice(&csize.wrapping_add(ENCRYPTION_HEADER_LEN as u32).to_le_bytes());
                triple[8..].copy_from_slice(&field[8..12]);
                self.crc_and_size.push(triple);
                self.emit(out, &triple)?;
                self.entry_crc = crc;
                self.pending_payload = u64::from(csize);
                self.state = State::LfhLens;
                Ok(())
            }

            State::LfhLens => {
                let Some(field) = self.gather(byte, 4) else {
                    return Ok(());
                };
                let name_len = u16::from_le_bytes([field[0], field[1]]);
                let extra_len = u16::from_le_bytes([field[2], field[3]]);
                if name_len == 0 {
                    return Err(ZipCryptError::Malformed("zero-length file name".into()));
                }
                self.emit(out, &[field[0], field[1], field[2], field[3]])?;
                self.copy = u64::from(name_len) + u64::from(extra_len);
                self.state = State::PayloadStart;
                Ok(())
            }

            State::PayloadStart => {
                self.emit_encryption_header(out)?;
                self.state = if self.pending_payload == 0 {
                    State::Section
                } else {
                    State::Data {
                        remaining: self.pending_payload,
                    }
                };
                // re-dispatch: this byte is payload or the next record
                self.push(byte, out)
            }

            State::Data { remaining } => {
                let cipher = self.working_keys.encrypt_byte(byte);
                self.emit(out, &[cipher])?;
                self.state = if remaining == 1 {
                    State::Section
                } else {
                    State::Data {
                        remaining: remaining - 1,
                    }
                };
                Ok(())
            }

            State::Buffering => {
                let mut scanner = self.scanner.take().expect("scanner lives while buffering");
                let found = scanner.feed(byte, |b| self.held.push(b));
                match found {
                    Some(boundary) => {
                        self.flush_deferred(out)?;
                        self.state = State::Section;
                        for b in boundary.magic() {
                            self.push(b, out)?;
                        }
                    }
                    None => self.scanner = Some(scanner),
                }
                Ok(())
            }

            State::CfhFlags => {
                let Some(field) = self.gather(byte, 2) else {
                    return Ok(());
                };
                self.emit(out, &[mark_encrypted(field[0]), field[1]])?;
                self.copy = 6; // method, time, date
                self.state = State::CfhTriple;
                Ok(())
            }

            State::CfhTriple => {
                if self.gather(byte, 12).is_none() {
                    return Ok(());
                }
                let triple = *self.crc_and_size.get(self.next_cfh).ok_or_else(|| {
                    ZipCryptError::Malformed(
                        "more central directory entries than local headers".into(),
                    )
                })?;
                self.emit(out, &triple)?;
                self.state = State::CfhLens;
                Ok(())
            }

            State::CfhLens => {
                let Some(field) = self.gather(byte, 6) else {
                    return Ok(());
                };
                let name_len = u16::from_le_bytes([field[0], field[1]]);
                let extra_len = u16::from_le_bytes([field[2], field[3]]);
                let comment_len = u16::from_le_bytes([field[4], field[5]]);
                self.emit(out, &field[..6])?;
                self.copy = 8; // disk start, internal attrs, external attrs
                self.state = State::CfhOffset {
                    trailing: u64::from(name_len) + u64::from(extra_len) + u64::from(comment_len),
                };
                Ok(())
            }

            State::CfhOffset { trailing } => {
                if self.gather(byte, 4).is_none() {
                    return Ok(());
                }
                let offset = *self.local_header_offsets.get(self.next_cfh).ok_or_else(|| {
                    ZipCryptError::Malformed(
                        "more central directory entries than local headers".into(),
                    )
                })?;
                self.emit(out, &offset.to_le_bytes())?;
                self.next_cfh += 1;
                self.copy = trailing;
                self.state = State::Section;
                Ok(())
            }

            State::EcdOffset => {
                let Some(field) = self.gather(byte, 4) else {
                    return Ok(());
                };
                match self.central_directory_offset {
                    Some(offset) => self.emit(out, &offset.to_le_bytes())?,
                    // no entries were seen, nothing shifted
                    None => self.emit(out, &[field[0], field[1], field[2], field[3]])?,
                }
                self.state = State::Tail;
                Ok(())
            }

            State::Tail => self.emit(out, &[byte]),
        }
    }

    /// Emit a buffered deferred-size entry: the header re-issued with the
    /// sizes from its data descriptor, the descriptor itself dropped.
    fn flush_deferred<W: Write>(&mut self, out: &mut W) -> Result<(), ZipCryptError> {
        self.scanner = None;
        // the buffer holds everything from the method field through the
        // data descriptor; the descriptor triple sits in the last 12 bytes
        let len = self.held.len();
        if len < HELD_FIXED_LEN + ENCRYPTION_HEADER_LEN {
            return Err(ZipCryptError::Malformed(
                "deferred-size entry ends before its data descriptor".into(),
            ));
        }
        let crc = self.held.u32_le(len - 12);
        let csize = self.held.u32_le(len - 8);
        let name_len = self.held.u16_le(HELD_NAME_LEN_OFFSET);
        let extra_len = self.held.u16_le(HELD_NAME_LEN_OFFSET + 2);
        if name_len == 0 {
            return Err(ZipCryptError::Malformed("zero-length file name".into()));
        }

        let payload_start = HELD_FIXED_LEN + usize::from(name_len) + usize::from(extra_len);
        let payload_end = payload_start
            .checked_add(csize as usize)
            .filter(|&end| end <= len)
            .ok_or_else(|| {
                ZipCryptError::Malformed("data descriptor sizes exceed the buffered entry".into())
            })?;
        // the remainder must be the descriptor itself, with or without its
        // optional signature
        let descriptor = self.held.copy_range(payload_end, len);
        let descriptor_ok = match descriptor.len() {
            12 => true,
            16 => descriptor[..4] == Signature::DataDescriptor.magic(),
            _ => false,
        };
        if !descriptor_ok {
            return Err(ZipCryptError::Malformed(
                "data descriptor does not line up with the buffered entry".into(),
            ));
        }

        // method, time, date as they arrived
        let head = self.held.copy_range(0, 6);
        self.emit(out, &head)?;

        let mut triple = [0u8; 12];
        triple[..4].copy_from_slice(&crc.to_le_bytes());
        triple[4..8].copy_from_slice(&csize.wrapping_add(ENCRYPTION_HEADER_LEN as u32).to_le_bytes());
        triple[8..].copy_from_slice(&descriptor[descriptor.len() - 4..]);
        self.crc_and_size.push(triple);
        self.emit(out, &triple)?;

        let lens = self.held.copy_range(HELD_NAME_LEN_OFFSET, HELD_FIXED_LEN);
        self.emit(out, &lens)?;
        let name_extra = self.held.copy_range(HELD_FIXED_LEN, payload_start);
        self.emit(out, &name_extra)?;

        self.entry_crc = crc;
        self.emit_encryption_header(out)?;
        for i in payload_start..payload_end {
            let cipher = self.working_keys.encrypt_byte(self.held.byte(i));
            self.emit(out, &[cipher])?;
        }
        self.held.release();
        Ok(())
    }

    pub(crate) fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// True when the stream stopped at a record boundary.
    pub(crate) fn at_record_boundary(&self) -> bool {
        self.copy == 0 && self.acc_len == 0 && matches!(self.state, State::Section | State::Tail)
    }
}
