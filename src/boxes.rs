use serde::{Serialize, Serializer};
use std::fmt;

/// Size of the standard box header: 32-bit size followed by a 4-byte type code.
pub const HEADER_SIZE: u64 = 8;

/// Size of the version + flags word that prefixes a full box payload.
pub const FULL_BOX_HEADER_SIZE: u64 = 4;

#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    pub fn from_str(s: &str) -> Option<Self> {
        let b = s.as_bytes();
        if b.len() == 4 {
            Some(FourCC([b[0], b[1], b[2], b[3]]))
        } else {
            None
        }
    }

    pub fn is_printable(&self) -> bool {
        self.0.iter().all(|c| (32..=126).contains(c))
    }

    pub fn as_str_lossy(&self) -> String {
        self.0
            .iter()
            .map(|&c| if (32..=126).contains(&c) { c as char } else { '.' })
            .collect()
    }

    /// Hex form of the raw code, e.g. `6d6f6f76`.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_printable() {
            write!(f, "{}", self.as_str_lossy())
        } else {
            write!(f, "0x{}", self.to_hex())
        }
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str_lossy())
    }
}

impl Serialize for FourCC {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.as_str_lossy())
    }
}

/// A standard box header as read from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxHeader {
    pub size: u32,   // total size including the 8-byte header
    pub typ: FourCC, // raw type code, not guaranteed printable
    pub start: u64,  // stream offset of the header
    pub depth: usize,
}

impl BoxHeader {
    /// Number of payload bytes following the header. Zero when the declared
    /// size is too small to be valid.
    pub fn payload_len(&self) -> u64 {
        u64::from(self.size).saturating_sub(HEADER_SIZE)
    }

    pub fn payload_start(&self) -> u64 {
        self.start + HEADER_SIZE
    }

    pub fn end(&self) -> u64 {
        self.start + u64::from(self.size)
    }
}

/// Version and flags of a full box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FullBoxHeader {
    pub version: u8,
    pub flags: u32, // low 24 bits only
}

impl FullBoxHeader {
    pub fn from_word(word: u32) -> Self {
        FullBoxHeader {
            version: (word >> 24) as u8,
            flags: word & 0x00ff_ffff,
        }
    }
}
