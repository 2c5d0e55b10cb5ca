//! tests/common.rs
//! In-memory ZIP fixtures and record locators shared across test files.
//!
//! Archives are built deterministically: stored entries (method 0), fixed
//! timestamps, explicit little-endian fields, Zip32 only. The sized
//! layout writes CRC and sizes in the local header; the deferred layout
//! zeroes them, sets flag bit 3 and appends a data descriptor after the
//! payload.

#![allow(dead_code)] // each test file uses a different subset

pub const LFH_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub const CFH_MAGIC: [u8; 4] = [0x50, 0x4B, 0x01, 0x02];
pub const ECD_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
pub const DD_MAGIC: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];

/// Fixed DOS mod time/date used by every fixture entry.
pub const FIXTURE_DOS_TIME: u16 = 0x6B32;
pub const FIXTURE_DOS_DATE: u16 = 0x5A21;

#[derive(Clone)]
pub struct Entry {
    pub name: &'static str,
    pub payload: Vec<u8>,
    pub extra: Vec<u8>,
}

impl Entry {
    pub fn new(name: &'static str, payload: &[u8]) -> Self {
        Self {
            name,
            payload: payload.to_vec(),
            extra: Vec::new(),
        }
    }

    pub fn with_extra(name: &'static str, payload: &[u8], extra: &[u8]) -> Self {
        Self {
            name,
            payload: payload.to_vec(),
            extra: extra.to_vec(),
        }
    }
}

/// How entry sizes are recorded.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// CRC and sizes in the local header, no data descriptor.
    Sized,
    /// Flag bit 3: zeroed local fields, descriptor after the payload.
    Deferred { signed_descriptor: bool },
}

/// CRC-32 (reversed polynomial 0xEDB88320) over `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in data {
        crc ^= u32::from(b);
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ 0xEDB8_8320
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

pub fn build_archive(entries: &[Entry], layout: Layout, comment: &[u8]) -> Vec<u8> {
    let deferred = matches!(layout, Layout::Deferred { .. });
    let flags: u16 = if deferred { 0x0008 } else { 0x0000 };

    let mut out = Vec::new();
    let mut cd = Vec::new();
    for entry in entries {
        let crc = crc32(&entry.payload);
        let size = entry.payload.len() as u32;
        let local_offset = out.len() as u32;

        out.extend_from_slice(&LFH_MAGIC);
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&FIXTURE_DOS_TIME.to_le_bytes());
        out.extend_from_slice(&FIXTURE_DOS_DATE.to_le_bytes());
        if deferred {
            out.extend_from_slice(&[0u8; 12]);
        } else {
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }
        out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&entry.extra);
        out.extend_from_slice(&entry.payload);
        if let Layout::Deferred { signed_descriptor } = layout {
            if signed_descriptor {
                out.extend_from_slice(&DD_MAGIC);
            }
            out.extend_from_slice(&crc.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&size.to_le_bytes());
        }

        cd.extend_from_slice(&CFH_MAGIC);
        cd.extend_from_slice(&20u16.to_le_bytes()); // version made by
        cd.extend_from_slice(&20u16.to_le_bytes()); // version needed
        cd.extend_from_slice(&flags.to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes());
        cd.extend_from_slice(&FIXTURE_DOS_TIME.to_le_bytes());
        cd.extend_from_slice(&FIXTURE_DOS_DATE.to_le_bytes());
        cd.extend_from_slice(&crc.to_le_bytes());
        cd.extend_from_slice(&size.to_le_bytes());
        cd.extend_from_slice(&size.to_le_bytes());
        cd.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        cd.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        cd.extend_from_slice(&0u16.to_le_bytes()); // comment length
        cd.extend_from_slice(&0u16.to_le_bytes()); // disk start
        cd.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
        cd.extend_from_slice(&0u32.to_le_bytes()); // external attrs
        cd.extend_from_slice(&local_offset.to_le_bytes());
        cd.extend_from_slice(entry.name.as_bytes());
        cd.extend_from_slice(&entry.extra);
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&cd);
    out.extend_from_slice(&ECD_MAGIC);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(cd.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment);
    out
}

pub fn stored_archive(entries: &[Entry]) -> Vec<u8> {
    build_archive(entries, Layout::Sized, b"")
}

pub fn deferred_archive(entries: &[Entry]) -> Vec<u8> {
    build_archive(
        entries,
        Layout::Deferred {
            signed_descriptor: true,
        },
        b"",
    )
}

pub fn read_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

pub fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Positions of every occurrence of `magic` in `bytes`.
pub fn find_all(bytes: &[u8], magic: [u8; 4]) -> Vec<usize> {
    bytes
        .windows(4)
        .enumerate()
        .filter(|(_, w)| *w == magic)
        .map(|(i, _)| i)
        .collect()
}

/// Position of the sole occurrence of `magic`, panicking otherwise.
pub fn find_one(bytes: &[u8], magic: [u8; 4]) -> usize {
    let hits = find_all(bytes, magic);
    assert_eq!(hits.len(), 1, "expected exactly one {magic:02x?}");
    hits[0]
}

/// Walk an archive whose local headers carry their sizes (no data
/// descriptors) and return the offset of every local header plus the
/// offset where the central directory starts. Scanning by structure
/// avoids false matches on magic bytes inside enciphered payloads.
pub fn walk_local_headers(archive: &[u8]) -> (Vec<usize>, usize) {
    let mut offsets = Vec::new();
    let mut pos = 0;
    while archive[pos..pos + 4] == LFH_MAGIC {
        offsets.push(pos);
        let csize = read_u32(archive, pos + 18) as usize;
        let name_len = read_u16(archive, pos + 26) as usize;
        let extra_len = read_u16(archive, pos + 28) as usize;
        pos += 30 + name_len + extra_len + csize;
    }
    (offsets, pos)
}

/// Walk the central directory starting at `cd_start`, returning the
/// offset of each central header.
pub fn walk_central_directory(archive: &[u8], cd_start: usize) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut pos = cd_start;
    while archive[pos..pos + 4] == CFH_MAGIC {
        offsets.push(pos);
        let name_len = read_u16(archive, pos + 28) as usize;
        let extra_len = read_u16(archive, pos + 30) as usize;
        let comment_len = read_u16(archive, pos + 32) as usize;
        pos += 46 + name_len + extra_len + comment_len;
    }
    assert_eq!(archive[pos..pos + 4], ECD_MAGIC, "directory must end at the end record");
    offsets
}

/// Build a ZipCrypto-protected archive the way a *streaming* producer
/// would: flag bit 3 kept set, sizes deferred to signed data descriptors,
/// the encryption-header check byte taken from the mod time. This is the
/// input shape the decrypter's data-descriptor path exists for; our own
/// encrypter never produces it.
///
/// With `valid_check` false the check byte is deliberately wrong, for
/// strict-mode tests. Header filler bytes are fixed, so the output is
/// deterministic.
pub fn streamed_protected_archive(
    entries: &[Entry],
    password: &str,
    valid_check: bool,
) -> Vec<u8> {
    use zipcrypt_rs::crypto::KeyState;

    let flags: u16 = 0x0008 | 0x0001;
    let password_keys = KeyState::from_password(password.as_bytes());
    let check_byte = if valid_check {
        (FIXTURE_DOS_TIME >> 8) as u8
    } else {
        !(FIXTURE_DOS_TIME >> 8) as u8
    };

    let mut out = Vec::new();
    let mut offsets = Vec::new();
    for entry in entries {
        let crc = crc32(&entry.payload);
        let size = entry.payload.len() as u32;
        offsets.push(out.len() as u32);

        out.extend_from_slice(&LFH_MAGIC);
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&FIXTURE_DOS_TIME.to_le_bytes());
        out.extend_from_slice(&FIXTURE_DOS_DATE.to_le_bytes());
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&entry.extra);

        let mut keys = password_keys.clone();
        let mut header = [0x5Au8; 12];
        header[11] = check_byte;
        for b in header {
            out.push(keys.encrypt_byte(b));
        }
        for &b in &entry.payload {
            out.push(keys.encrypt_byte(b));
        }

        out.extend_from_slice(&DD_MAGIC);
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(size + 12).to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
    }

    let cd_offset = out.len() as u32;
    let mut cd_len = 0usize;
    for (entry, local_offset) in entries.iter().zip(&offsets) {
        let crc = crc32(&entry.payload);
        let size = entry.payload.len() as u32;
        out.extend_from_slice(&CFH_MAGIC);
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&FIXTURE_DOS_TIME.to_le_bytes());
        out.extend_from_slice(&FIXTURE_DOS_DATE.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(size + 12).to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&local_offset.to_le_bytes());
        out.extend_from_slice(entry.name.as_bytes());
        out.extend_from_slice(&entry.extra);
        cd_len += 46 + entry.name.len() + entry.extra.len();
    }

    out.extend_from_slice(&ECD_MAGIC);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(cd_len as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// Deterministic filler bytes for large payloads.
pub fn filler(len: usize) -> Vec<u8> {
    let mut state = 0x2545_F491u32;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(747796405).wrapping_add(2891336453);
            (state >> 24) as u8
        })
        .collect()
}
