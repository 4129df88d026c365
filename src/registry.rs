use crate::boxes::{BoxHeader, FourCC, HEADER_SIZE};
use crate::cursor::PayloadCursor;
use crate::error::{FieldWarning, ParseError, Result};
use crate::fp::{FpI8, FpI16, Matrix};
use crate::parser::read_fullbox_header;
use serde::Serialize;
use std::collections::HashMap;

/// Decoded fields of one of the semantically handled box types.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuredData {
    /// File Type Box (ftyp)
    FileType(FtypData),
    /// Movie Header Box (mvhd)
    MovieHeader(MvhdData),
    /// Movie Extends Header Box (mehd)
    MovieExtendsHeader(MehdData),
    /// Movie Fragment Header Box (mfhd)
    MovieFragmentHeader(MfhdData),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FtypData {
    pub major_brand: FourCC,
    pub minor_version: u32,
    pub compatible_brands: Vec<FourCC>,
}

/// Movie Header Box data. Times are widened to 64 bits regardless of version.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MvhdData {
    pub version: u8,
    pub flags: u32,
    pub creation_time: u64,
    pub modification_time: u64,
    pub timescale: u32,
    pub duration: u64,
    pub rate: FpI16,
    pub volume: FpI8,
    pub matrix: Matrix,
    pub next_track_id: u32,
}

impl MvhdData {
    /// Movie duration in seconds. Fails rather than returning inf/NaN when the
    /// timescale is zero.
    pub fn duration_seconds(&self) -> Result<f64> {
        if self.timescale == 0 {
            return Err(ParseError::DivisionHazard {
                quantity: "movie duration in seconds",
            });
        }
        Ok(self.duration as f64 / f64::from(self.timescale))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MehdData {
    pub version: u8,
    pub flags: u32,
    pub fragment_duration: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MfhdData {
    pub flags: u32,
    pub sequence_number: u32,
}

/// Trait for box decoders.
///
/// A decoder receives the already-read header and a cursor over exactly the
/// box payload. It reads the fields it knows and fails only when they cannot
/// be read; tolerable oddities go into `warnings` instead of failing.
pub trait BoxDecoder: Send + Sync {
    fn decode(
        &self,
        r: &mut PayloadCursor<'_>,
        hdr: &BoxHeader,
        warnings: &mut Vec<FieldWarning>,
    ) -> Result<StructuredData>;
}

/// Registry of decoders keyed by type code.
///
/// The registry is immutable once constructed; use [`Registry::with_decoder`]
/// to build it fluently.
pub struct Registry {
    map: HashMap<FourCC, BoxDecoderEntry>,
}

struct BoxDecoderEntry {
    inner: Box<dyn BoxDecoder>,
    name: String,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Return a new registry with the given decoder added.
    ///
    /// `name` is human-readable and shows up in debug logs.
    pub fn with_decoder(mut self, key: FourCC, name: &str, dec: Box<dyn BoxDecoder>) -> Self {
        self.map.insert(
            key,
            BoxDecoderEntry {
                inner: dec,
                name: name.to_string(),
            },
        );
        self
    }

    pub fn contains(&self, key: &FourCC) -> bool {
        self.map.contains_key(key)
    }

    pub fn name(&self, key: &FourCC) -> Option<&str> {
        self.map.get(key).map(|d| d.name.as_str())
    }

    /// Decode the payload of a box using a registered decoder.
    ///
    /// Returns `None` if no decoder exists for the given key.
    pub fn decode(
        &self,
        key: &FourCC,
        r: &mut PayloadCursor<'_>,
        hdr: &BoxHeader,
        warnings: &mut Vec<FieldWarning>,
    ) -> Option<Result<StructuredData>> {
        self.map
            .get(key)
            .map(|d| d.inner.decode(r, hdr, warnings))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------- Helpers ----------

/// Check that the declared size covers the fixed layout for the version.
/// Bytes beyond it are left to the walker, which reports them as a warning.
fn require_min_size(hdr: &BoxHeader, required: u64) -> Result<()> {
    if u64::from(hdr.size) < required {
        return Err(ParseError::TooShort {
            typ: hdr.typ,
            offset: hdr.start,
            depth: hdr.depth,
            size: hdr.size,
            required,
        });
    }
    Ok(())
}

fn unsupported_version(hdr: &BoxHeader, version: u8) -> ParseError {
    ParseError::UnsupportedVersion {
        typ: hdr.typ,
        offset: hdr.start,
        version,
    }
}

fn check_reserved(field: &'static str, value: u32, warnings: &mut Vec<FieldWarning>) {
    if value != 0 {
        warnings.push(FieldWarning::ReservedNonZero { field, value });
    }
}

// ---------- Decoders ----------

const FTYP_FIXED_SIZE: u64 = HEADER_SIZE + 8;

// ftyp: major + minor + compatible brands
pub struct FtypDecoder;

impl BoxDecoder for FtypDecoder {
    fn decode(
        &self,
        r: &mut PayloadCursor<'_>,
        hdr: &BoxHeader,
        _warnings: &mut Vec<FieldWarning>,
    ) -> Result<StructuredData> {
        let size = u64::from(hdr.size);
        if size < FTYP_FIXED_SIZE {
            return Err(ParseError::TooShort {
                typ: hdr.typ,
                offset: hdr.start,
                depth: hdr.depth,
                size: hdr.size,
                required: FTYP_FIXED_SIZE,
            });
        }
        let brands_len = size - FTYP_FIXED_SIZE;
        if brands_len % 4 != 0 {
            return Err(ParseError::MalformedSize {
                typ: hdr.typ,
                offset: hdr.start,
                depth: hdr.depth,
                size: hdr.size,
                reason: format!("{brands_len} bytes of compatible brands is not a multiple of 4"),
            });
        }

        let major_brand = r.read_fourcc()?;
        let minor_version = r.read_u32()?;
        let compatible_brands = (0..brands_len / 4)
            .map(|_| r.read_fourcc())
            .collect::<Result<Vec<_>>>()?;

        Ok(StructuredData::FileType(FtypData {
            major_brand,
            minor_version,
            compatible_brands,
        }))
    }
}

// mvhd: header (4) + times (16 or 28) + rate/volume/reserved/matrix/pre_defined/next_track_id (80)
const MVHD_V0_SIZE: u64 = HEADER_SIZE + 4 + 16 + 80;
const MVHD_V1_SIZE: u64 = HEADER_SIZE + 4 + 28 + 80;

pub struct MvhdDecoder;

impl BoxDecoder for MvhdDecoder {
    fn decode(
        &self,
        r: &mut PayloadCursor<'_>,
        hdr: &BoxHeader,
        warnings: &mut Vec<FieldWarning>,
    ) -> Result<StructuredData> {
        let fb = read_fullbox_header(r, hdr)?;
        let required = match fb.version {
            0 => MVHD_V0_SIZE,
            1 => MVHD_V1_SIZE,
            v => return Err(unsupported_version(hdr, v)),
        };
        require_min_size(hdr, required)?;

        let (creation_time, modification_time, timescale, duration) = if fb.version == 1 {
            (r.read_u64()?, r.read_u64()?, r.read_u32()?, r.read_u64()?)
        } else {
            (
                u64::from(r.read_u32()?),
                u64::from(r.read_u32()?),
                r.read_u32()?,
                u64::from(r.read_u32()?),
            )
        };
        if timescale == 0 {
            warnings.push(FieldWarning::ZeroTimescale);
        }

        let rate = FpI16::parse_raw(r.read_i32()?);
        let volume = FpI8::parse_raw(r.read_i16()?);

        check_reserved("reserved16", u32::from(r.read_u16()?), warnings);
        for field in ["reserved32[0]", "reserved32[1]"] {
            check_reserved(field, r.read_u32()?, warnings);
        }

        let mut raw = [0i32; 9];
        for v in raw.iter_mut() {
            *v = r.read_i32()?;
        }
        let matrix = Matrix::from_raw(raw);

        for field in [
            "pre_defined[0]",
            "pre_defined[1]",
            "pre_defined[2]",
            "pre_defined[3]",
            "pre_defined[4]",
            "pre_defined[5]",
        ] {
            check_reserved(field, r.read_u32()?, warnings);
        }

        let next_track_id = r.read_u32()?;

        Ok(StructuredData::MovieHeader(MvhdData {
            version: fb.version,
            flags: fb.flags,
            creation_time,
            modification_time,
            timescale,
            duration,
            rate,
            volume,
            matrix,
            next_track_id,
        }))
    }
}

// mehd: fragment duration, 32 or 64 bits by version
pub struct MehdDecoder;

impl BoxDecoder for MehdDecoder {
    fn decode(
        &self,
        r: &mut PayloadCursor<'_>,
        hdr: &BoxHeader,
        warnings: &mut Vec<FieldWarning>,
    ) -> Result<StructuredData> {
        let fb = read_fullbox_header(r, hdr)?;
        let width = match fb.version {
            0 => 4,
            1 => 8,
            v => return Err(unsupported_version(hdr, v)),
        };
        require_min_size(hdr, HEADER_SIZE + 4 + width)?;
        if fb.flags != 0 {
            warnings.push(FieldWarning::UnexpectedFlags { flags: fb.flags });
        }

        let fragment_duration = if fb.version == 1 {
            r.read_u64()?
        } else {
            u64::from(r.read_u32()?)
        };

        Ok(StructuredData::MovieExtendsHeader(MehdData {
            version: fb.version,
            flags: fb.flags,
            fragment_duration,
        }))
    }
}

// mfhd: sequence number; only version 0 exists
pub struct MfhdDecoder;

impl BoxDecoder for MfhdDecoder {
    fn decode(
        &self,
        r: &mut PayloadCursor<'_>,
        hdr: &BoxHeader,
        warnings: &mut Vec<FieldWarning>,
    ) -> Result<StructuredData> {
        let fb = read_fullbox_header(r, hdr)?;
        if fb.version != 0 {
            return Err(unsupported_version(hdr, fb.version));
        }
        require_min_size(hdr, HEADER_SIZE + 4 + 4)?;
        if fb.flags != 0 {
            warnings.push(FieldWarning::UnexpectedFlags { flags: fb.flags });
        }

        let sequence_number = r.read_u32()?;

        Ok(StructuredData::MovieFragmentHeader(MfhdData {
            flags: fb.flags,
            sequence_number,
        }))
    }
}

/// Registry with a decoder for every box type the dispatch table marks as
/// decoded.
pub fn default_registry() -> Registry {
    Registry::new()
        .with_decoder(FourCC(*b"ftyp"), "ftyp", Box::new(FtypDecoder))
        .with_decoder(FourCC(*b"mvhd"), "mvhd", Box::new(MvhdDecoder))
        .with_decoder(FourCC(*b"mehd"), "mehd", Box::new(MehdDecoder))
        .with_decoder(FourCC(*b"mfhd"), "mfhd", Box::new(MfhdDecoder))
}
