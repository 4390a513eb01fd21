//! Element types shared by the storage and scoring layers.
//!
//! Arrays on disk carry a tagged [`ElementType`] in their schema; in code the
//! same types are monomorphized through [`ArrayElement`] (raw storage codec)
//! and [`Scalar`] (feature elements the scoring kernels accept). Distance
//! computation always accumulates in `f32` regardless of the element type.

use serde::{Deserialize, Serialize};

/// External identifier of a database vector.
pub type VectorId = u64;

/// Tagged element type recorded in on-disk array schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// 32-bit IEEE float (preferred feature type).
    Float32,
    /// Unsigned 8-bit feature element.
    Uint8,
    /// Signed 8-bit feature element.
    Int8,
    /// Unsigned 64-bit integer (ids and partition indices).
    Uint64,
}

impl ElementType {
    /// Width of one cell in bytes.
    pub fn byte_width(&self) -> usize {
        match self {
            ElementType::Float32 => 4,
            ElementType::Uint8 | ElementType::Int8 => 1,
            ElementType::Uint64 => 8,
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElementType::Float32 => write!(f, "float32"),
            ElementType::Uint8 => write!(f, "uint8"),
            ElementType::Int8 => write!(f, "int8"),
            ElementType::Uint64 => write!(f, "uint64"),
        }
    }
}

/// An element that can be stored in a persistent dense array.
///
/// Cells are persisted little-endian with no padding, so a block of `n`
/// elements occupies exactly `n * BYTE_WIDTH` bytes.
pub trait ArrayElement: Copy + Default + Send + Sync + 'static {
    const DTYPE: ElementType;
    const BYTE_WIDTH: usize;

    /// Decode `out.len()` little-endian cells from `bytes`.
    fn read_le(bytes: &[u8], out: &mut [Self]);

    /// Append the little-endian encoding of `vals` to `out`.
    fn write_le(vals: &[Self], out: &mut Vec<u8>);
}

/// A feature element the scoring kernels operate on.
pub trait Scalar: ArrayElement + PartialOrd {
    fn to_f32(self) -> f32;

    /// Inverse of [`Scalar::to_f32`]; exact for `f32`, rounds (with
    /// saturation) for the integer element types. Used when writing trained
    /// centroid means back into the database element type.
    fn from_f32(v: f32) -> Self;
}

impl ArrayElement for f32 {
    const DTYPE: ElementType = ElementType::Float32;
    const BYTE_WIDTH: usize = 4;

    fn read_le(bytes: &[u8], out: &mut [Self]) {
        debug_assert_eq!(bytes.len(), out.len() * Self::BYTE_WIDTH);
        for (dst, chunk) in out.iter_mut().zip(bytes.chunks_exact(4)) {
            *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
    }

    fn write_le(vals: &[Self], out: &mut Vec<u8>) {
        out.reserve(vals.len() * Self::BYTE_WIDTH);
        for v in vals {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

impl ArrayElement for u8 {
    const DTYPE: ElementType = ElementType::Uint8;
    const BYTE_WIDTH: usize = 1;

    fn read_le(bytes: &[u8], out: &mut [Self]) {
        debug_assert_eq!(bytes.len(), out.len());
        out.copy_from_slice(bytes);
    }

    fn write_le(vals: &[Self], out: &mut Vec<u8>) {
        out.extend_from_slice(vals);
    }
}

impl ArrayElement for i8 {
    const DTYPE: ElementType = ElementType::Int8;
    const BYTE_WIDTH: usize = 1;

    fn read_le(bytes: &[u8], out: &mut [Self]) {
        debug_assert_eq!(bytes.len(), out.len());
        for (dst, b) in out.iter_mut().zip(bytes.iter()) {
            *dst = *b as i8;
        }
    }

    fn write_le(vals: &[Self], out: &mut Vec<u8>) {
        out.reserve(vals.len());
        for v in vals {
            out.push(*v as u8);
        }
    }
}

impl ArrayElement for u64 {
    const DTYPE: ElementType = ElementType::Uint64;
    const BYTE_WIDTH: usize = 8;

    fn read_le(bytes: &[u8], out: &mut [Self]) {
        debug_assert_eq!(bytes.len(), out.len() * Self::BYTE_WIDTH);
        for (dst, chunk) in out.iter_mut().zip(bytes.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(chunk);
            *dst = u64::from_le_bytes(buf);
        }
    }

    fn write_le(vals: &[Self], out: &mut Vec<u8>) {
        out.reserve(vals.len() * Self::BYTE_WIDTH);
        for v in vals {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }
}

impl Scalar for f32 {
    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(v: f32) -> Self {
        v
    }
}

impl Scalar for u8 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(v: f32) -> Self {
        v.round().clamp(0.0, u8::MAX as f32) as u8
    }
}

impl Scalar for i8 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(v: f32) -> Self {
        v.round().clamp(i8::MIN as f32, i8::MAX as f32) as i8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_serde_roundtrip() {
        for (variant, expected_json) in [
            (ElementType::Float32, "\"float32\""),
            (ElementType::Uint8, "\"uint8\""),
            (ElementType::Int8, "\"int8\""),
            (ElementType::Uint64, "\"uint64\""),
        ] {
            let json = serde_json::to_string(&variant).unwrap();
            assert_eq!(json, expected_json);
            let back: ElementType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, variant);
        }
    }

    #[test]
    fn test_f32_le_roundtrip() {
        let vals = [1.5f32, -2.25, 0.0, f32::MAX];
        let mut bytes = Vec::new();
        f32::write_le(&vals, &mut bytes);
        assert_eq!(bytes.len(), 16);

        let mut back = [0.0f32; 4];
        f32::read_le(&bytes, &mut back);
        assert_eq!(back, vals);
    }

    #[test]
    fn test_u64_le_roundtrip() {
        let vals = [0u64, 1, u64::MAX, 42];
        let mut bytes = Vec::new();
        u64::write_le(&vals, &mut bytes);

        let mut back = [0u64; 4];
        u64::read_le(&bytes, &mut back);
        assert_eq!(back, vals);
    }

    #[test]
    fn test_i8_le_roundtrip() {
        let vals = [-128i8, -1, 0, 127];
        let mut bytes = Vec::new();
        i8::write_le(&vals, &mut bytes);

        let mut back = [0i8; 4];
        i8::read_le(&bytes, &mut back);
        assert_eq!(back, vals);
    }

    #[test]
    fn test_from_f32_saturates_integers() {
        assert_eq!(u8::from_f32(300.0), 255);
        assert_eq!(u8::from_f32(-4.0), 0);
        assert_eq!(i8::from_f32(200.0), 127);
        assert_eq!(i8::from_f32(-200.0), -128);
        assert_eq!(i8::from_f32(2.6), 3);
    }

    #[test]
    fn test_byte_width_matches_trait() {
        assert_eq!(ElementType::Float32.byte_width(), f32::BYTE_WIDTH);
        assert_eq!(ElementType::Uint8.byte_width(), u8::BYTE_WIDTH);
        assert_eq!(ElementType::Int8.byte_width(), i8::BYTE_WIDTH);
        assert_eq!(ElementType::Uint64.byte_width(), u64::BYTE_WIDTH);
    }
}
