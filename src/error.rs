use crate::boxes::FourCC;
use serde::Serialize;
use std::fmt;

/// Box header variants that are valid in the format but not handled here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Declared size 1: a 64-bit size follows the type code.
    ExtendedSize,
    /// Declared size 0: the box runs to the end of the stream.
    SizeToEnd,
    /// `uuid` type code: a 16-byte extended type follows.
    ExtendedType,
    /// Nesting deeper than the configured limit.
    DepthLimit(usize),
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::ExtendedSize => write!(f, "64-bit extended size"),
            Variant::SizeToEnd => write!(f, "size 0 (extends to end of stream)"),
            Variant::ExtendedType => write!(f, "extended uuid type"),
            Variant::DepthLimit(max) => write!(f, "nesting deeper than {max} levels"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("short read at offset {offset}: wanted {wanted} bytes, {available} available")]
    ShortRead {
        offset: u64,
        wanted: u64,
        available: u64,
    },

    #[error("'{typ}' box at offset {offset} (depth {depth}): declared size {size} is too short, need {required}")]
    TooShort {
        typ: FourCC,
        offset: u64,
        depth: usize,
        size: u32,
        required: u64,
    },

    #[error("'{typ}' box at offset {offset} (depth {depth}): malformed size {size}: {reason}")]
    MalformedSize {
        typ: FourCC,
        offset: u64,
        depth: usize,
        size: u32,
        reason: String,
    },

    #[error("'{typ}' box at offset {offset} (depth {depth}): unsupported {variant}")]
    UnsupportedVariant {
        typ: FourCC,
        offset: u64,
        depth: usize,
        variant: Variant,
    },

    #[error("'{typ}' box at offset {offset}: unsupported version {version}")]
    UnsupportedVersion {
        typ: FourCC,
        offset: u64,
        version: u8,
    },

    #[error("cannot compute {quantity}: timescale is zero")]
    DivisionHazard { quantity: &'static str },
}

impl ParseError {
    /// Errors that invalidate only the box being decoded. The walker has already
    /// consumed that box's payload, so the stream position is still trustworthy.
    pub fn is_box_local(&self) -> bool {
        matches!(self, ParseError::UnsupportedVersion { .. })
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// A tolerable oddity in a decoded box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldWarning {
    ReservedNonZero { field: &'static str, value: u32 },
    UnexpectedFlags { flags: u32 },
    TrailingBytes { count: u64 },
    ZeroTimescale,
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldWarning::ReservedNonZero { field, value } => {
                write!(f, "reserved field {field} is non-zero ({value:#x})")
            }
            FieldWarning::UnexpectedFlags { flags } => write!(f, "unexpected flags {flags:#08x}"),
            FieldWarning::TrailingBytes { count } => {
                write!(f, "{count} payload bytes after the decoded fields were ignored")
            }
            FieldWarning::ZeroTimescale => write!(f, "timescale is zero, duration in seconds undefined"),
        }
    }
}

/// A field warning tied to the box it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoxWarning {
    pub typ: FourCC,
    pub offset: u64,
    pub warning: FieldWarning,
}

impl fmt::Display for BoxWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' box at offset {}: {}", self.typ, self.offset, self.warning)
    }
}
