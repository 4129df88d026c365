//! Signed fixed-point values used by the movie header.

use serde::{Serialize, Serializer};

/// A signed 16.16 fixed point value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FpI16(i32);

impl FpI16 {
    pub fn parse_raw(val: i32) -> Self {
        Self(val)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl From<FpI16> for f64 {
    fn from(fp: FpI16) -> Self {
        f64::from(fp.0) / f64::from(1u32 << 16)
    }
}

/// A signed 8.8 fixed point value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FpI8(i16);

impl FpI8 {
    pub fn parse_raw(val: i16) -> Self {
        Self(val)
    }

    pub fn raw(&self) -> i16 {
        self.0
    }
}

impl From<FpI8> for f64 {
    fn from(fp: FpI8) -> Self {
        f64::from(fp.0) / f64::from(1u16 << 8)
    }
}

/// A signed 2.30 fixed point value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FpI2(i32);

impl FpI2 {
    pub fn parse_raw(val: i32) -> Self {
        Self(val)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl From<FpI2> for f64 {
    fn from(fp: FpI2) -> Self {
        f64::from(fp.0) / f64::from(1u32 << 30)
    }
}

macro_rules! serialize_as_f64 {
    ($($t:ty),*) => {
        $(impl Serialize for $t {
            fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_f64(f64::from(*self))
            }
        })*
    };
}

serialize_as_f64!(FpI16, FpI8, FpI2);

/// Entry of the 3x3 transformation matrix. The third column (u, v, w) is
/// stored as 2.30, everything else as 16.16.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MatrixEntry {
    Fixed16(FpI16),
    Fixed2(FpI2),
}

impl From<MatrixEntry> for f64 {
    fn from(e: MatrixEntry) -> Self {
        match e {
            MatrixEntry::Fixed16(v) => v.into(),
            MatrixEntry::Fixed2(v) => v.into(),
        }
    }
}

/// Transformation matrix { a, b, u, c, d, v, x, y, w } in stream order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Matrix(pub [MatrixEntry; 9]);

impl Matrix {
    pub fn from_raw(raw: [i32; 9]) -> Self {
        let mut entries = [MatrixEntry::Fixed16(FpI16::default()); 9];
        for (i, v) in raw.into_iter().enumerate() {
            entries[i] = if i % 3 == 2 {
                MatrixEntry::Fixed2(FpI2::parse_raw(v))
            } else {
                MatrixEntry::Fixed16(FpI16::parse_raw(v))
            };
        }
        Matrix(entries)
    }

    pub fn to_f64(&self) -> [f64; 9] {
        self.0.map(f64::from)
    }

    pub fn is_identity(&self) -> bool {
        self.to_f64() == [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_each_radix() {
        assert_eq!(f64::from(FpI16::parse_raw(0x0001_8000)), 1.5);
        assert_eq!(f64::from(FpI16::parse_raw(-0x0001_0000)), -1.0);
        assert_eq!(f64::from(FpI8::parse_raw(0x0100)), 1.0);
        assert_eq!(f64::from(FpI8::parse_raw(0x0080)), 0.5);
        assert_eq!(f64::from(FpI2::parse_raw(0x4000_0000)), 1.0);
    }

    #[test]
    fn identity_matrix_uses_mixed_radix() {
        let m = Matrix::from_raw([0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000]);
        assert!(m.is_identity());
        assert!(matches!(m.0[8], MatrixEntry::Fixed2(_)));
        assert!(matches!(m.0[0], MatrixEntry::Fixed16(_)));
    }
}
