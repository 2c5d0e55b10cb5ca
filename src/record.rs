//! # Record Recognition
//!
//! The four ZIP record signatures this library handles, the general-purpose
//! flag bits it inspects, and the incremental scanner used to find the next
//! record boundary inside an undelimited byte run.

/// Flag bit 0: entry payload is encrypted.
pub const FLAG_ENCRYPTED: u16 = 0x0001;

/// Flag bit 3: CRC and sizes are deferred to a data descriptor after the
/// payload.
pub const FLAG_DEFERRED_SIZES: u16 = 0x0008;

/// Flag bit 6: Strong Encryption (unsupported).
pub const FLAG_STRONG_ENCRYPTION: u16 = 0x0040;

/// The record types recognized at section boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    /// Local file header, `50 4B 03 04`.
    LocalFileHeader,
    /// Central file header, `50 4B 01 02`.
    CentralFileHeader,
    /// End of central directory, `50 4B 05 06`.
    EndOfCentralDirectory,
    /// Data descriptor, `50 4B 07 08`.
    DataDescriptor,
}

impl Signature {
    /// The 4-byte magic introducing this record.
    pub const fn magic(self) -> [u8; 4] {
        match self {
            Self::LocalFileHeader => [0x50, 0x4B, 0x03, 0x04],
            Self::CentralFileHeader => [0x50, 0x4B, 0x01, 0x02],
            Self::EndOfCentralDirectory => [0x50, 0x4B, 0x05, 0x06],
            Self::DataDescriptor => [0x50, 0x4B, 0x07, 0x08],
        }
    }

    /// Classify a 4-byte window. Only a full 4-byte match is accepted,
    /// never a prefix.
    pub fn classify(window: [u8; 4]) -> Option<Self> {
        [
            Self::LocalFileHeader,
            Self::CentralFileHeader,
            Self::EndOfCentralDirectory,
            Self::DataDescriptor,
        ]
        .into_iter()
        .find(|sig| sig.magic() == window)
    }
}

/// Set the encrypted bit and clear the deferred-sizes bit in the low flag
/// byte; bits 0, 3 and 6 all live in the low byte.
pub const fn mark_encrypted(flags_lo: u8) -> u8 {
    (flags_lo & 0xF7) | 0x01
}

/// Clear the encrypted bit in the low flag byte.
pub const fn clear_encrypted(flags_lo: u8) -> u8 {
    flags_lo & 0xFE
}

/// Incremental scan-until-one-of over a byte-at-a-time stream.
///
/// Feeds bytes one by one; bytes that can no longer begin a target
/// signature are spilled to the caller in order, and a full 4-byte match
/// reports which target was found. The match offset only advances on a
/// contiguous match; on a failed partial match the unmatched tail is
/// re-examined rather than discarded, so a boundary that begins inside a
/// broken partial match is still found.
pub struct SignatureScanner {
    targets: &'static [Signature],
    window: [u8; 4],
    len: usize,
}

impl SignatureScanner {
    pub fn new(targets: &'static [Signature]) -> Self {
        Self {
            targets,
            window: [0; 4],
            len: 0,
        }
    }

    fn is_viable_prefix(&self) -> bool {
        self.targets
            .iter()
            .any(|sig| sig.magic()[..self.len] == self.window[..self.len])
    }

    /// Feed one byte. Non-signature bytes are handed to `spill` in input
    /// order; returns the matched signature once one completes. The four
    /// magic bytes themselves are never spilled.
    pub fn feed(&mut self, byte: u8, mut spill: impl FnMut(u8)) -> Option<Signature> {
        self.window[self.len] = byte;
        self.len += 1;

        while self.len > 0 && !self.is_viable_prefix() {
            spill(self.window[0]);
            self.window.copy_within(1.., 0);
            self.len -= 1;
        }

        if self.len == 4 {
            let found = Signature::classify(self.window);
            self.len = 0;
            // classify cannot fail here: a 4-byte viable prefix is a match
            return found;
        }
        None
    }

    /// Bytes currently held as a partial match.
    pub fn pending(&self) -> &[u8] {
        &self.window[..self.len]
    }
}
