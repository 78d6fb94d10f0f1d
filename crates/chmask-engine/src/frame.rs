//! Two-dimensional detector frames.
//!
//! Dimension 0 is the sample axis (`width`), dimension 1 the channel axis
//! (`height`). Storage is channel-major: all of channel 0, then channel 1, ...

use std::fmt;
use std::str::FromStr;

use bytemuck::Pod;

use crate::error::MaskError;
use crate::pool::Lease;

/// Numeric element kinds with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

impl DataType {
    pub const ALL: [DataType; 10] = [
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
    ];

    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Element size in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
            Self::Int64 | Self::UInt64 | Self::Float64 => 8,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| format!("unknown data type `{s}` (expected one of int8..float64)"))
    }
}

/// Numeric element stored in a frame. `Default` is the numeric zero.
pub trait Element: Pod + Default + PartialEq + Send + Sync + 'static {
    const TYPE: DataType;
}

macro_rules! element {
    ($($t:ty => $kind:ident),* $(,)?) => {$(
        impl Element for $t {
            const TYPE: DataType = DataType::$kind;
        }

        impl From<Vec<$t>> for FrameData {
            fn from(v: Vec<$t>) -> Self {
                FrameData::$kind(v)
            }
        }
    )*};
}

element! {
    i8 => Int8, u8 => UInt8, i16 => Int16, u16 => UInt16,
    i32 => Int32, u32 => UInt32, i64 => Int64, u64 => UInt64,
    f32 => Float32, f64 => Float64,
}

/// Typed frame storage. `Raw` carries frames whose type code is not one of
/// the ten known kinds; they are moved around but never interpreted.
#[derive(Debug, Clone)]
pub enum FrameData {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Int64(Vec<i64>),
    UInt64(Vec<u64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Raw { type_code: u32, bytes: Vec<u8> },
}

impl FrameData {
    pub fn type_code(&self) -> u32 {
        match self {
            Self::Int8(_) => DataType::Int8.code(),
            Self::UInt8(_) => DataType::UInt8.code(),
            Self::Int16(_) => DataType::Int16.code(),
            Self::UInt16(_) => DataType::UInt16.code(),
            Self::Int32(_) => DataType::Int32.code(),
            Self::UInt32(_) => DataType::UInt32.code(),
            Self::Int64(_) => DataType::Int64.code(),
            Self::UInt64(_) => DataType::UInt64.code(),
            Self::Float32(_) => DataType::Float32.code(),
            Self::Float64(_) => DataType::Float64.code(),
            Self::Raw { type_code, .. } => *type_code,
        }
    }

    /// Number of elements, or `None` for raw data of unknown element size.
    pub fn element_count(&self) -> Option<usize> {
        Some(match self {
            Self::Int8(v) => v.len(),
            Self::UInt8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::UInt16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::UInt32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::UInt64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Raw { .. } => return None,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Int8(v) => bytemuck::cast_slice(v),
            Self::UInt8(v) => v.as_slice(),
            Self::Int16(v) => bytemuck::cast_slice(v),
            Self::UInt16(v) => bytemuck::cast_slice(v),
            Self::Int32(v) => bytemuck::cast_slice(v),
            Self::UInt32(v) => bytemuck::cast_slice(v),
            Self::Int64(v) => bytemuck::cast_slice(v),
            Self::UInt64(v) => bytemuck::cast_slice(v),
            Self::Float32(v) => bytemuck::cast_slice(v),
            Self::Float64(v) => bytemuck::cast_slice(v),
            Self::Raw { bytes, .. } => bytes.as_slice(),
        }
    }

    fn decode(kind: DataType, bytes: &[u8]) -> Self {
        match kind {
            DataType::Int8 => Self::Int8(decode_vec(bytes)),
            DataType::UInt8 => Self::UInt8(bytes.to_vec()),
            DataType::Int16 => Self::Int16(decode_vec(bytes)),
            DataType::UInt16 => Self::UInt16(decode_vec(bytes)),
            DataType::Int32 => Self::Int32(decode_vec(bytes)),
            DataType::UInt32 => Self::UInt32(decode_vec(bytes)),
            DataType::Int64 => Self::Int64(decode_vec(bytes)),
            DataType::UInt64 => Self::UInt64(decode_vec(bytes)),
            DataType::Float32 => Self::Float32(decode_vec(bytes)),
            DataType::Float64 => Self::Float64(decode_vec(bytes)),
        }
    }
}

// Copies through a zeroed typed buffer so the source needs no alignment.
fn decode_vec<T: Element>(bytes: &[u8]) -> Vec<T> {
    let mut out = vec![T::default(); bytes.len() / std::mem::size_of::<T>()];
    bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(bytes);
    out
}

/// A single frame. Shared as `Arc<Frame>` between upstream, the stage and
/// downstream sinks.
#[derive(Debug)]
pub struct Frame {
    width: usize,
    height: usize,
    unique_id: u64,
    data: FrameData,
    lease: Option<Lease>,
}

impl Frame {
    pub fn new(width: usize, height: usize, data: impl Into<FrameData>) -> Result<Self, MaskError> {
        let data = data.into();
        if let FrameData::Raw { type_code, .. } = &data {
            if DataType::from_code(*type_code).is_some() {
                return Err(MaskError::MislabelledRaw(*type_code));
            }
        }
        if let Some(len) = data.element_count() {
            if width.checked_mul(height) != Some(len) {
                return Err(MaskError::BadGeometry { width, height, len });
            }
        }
        Ok(Self { width, height, unique_id: 0, data, lease: None })
    }

    /// Builds a frame from a native-endian byte buffer. Unknown type codes
    /// produce a [`FrameData::Raw`] frame whose size is not checked.
    pub fn from_bytes(
        type_code: u32,
        width: usize,
        height: usize,
        bytes: &[u8],
    ) -> Result<Self, MaskError> {
        let Some(kind) = DataType::from_code(type_code) else {
            return Self::new(width, height, FrameData::Raw { type_code, bytes: bytes.to_vec() });
        };
        let expected = width.checked_mul(height).and_then(|n| n.checked_mul(kind.size()));
        if expected != Some(bytes.len()) {
            return Err(MaskError::BadGeometry { width, height, len: bytes.len() / kind.size() });
        }
        Self::new(width, height, FrameData::decode(kind, bytes))
    }

    pub fn with_unique_id(mut self, id: u64) -> Self {
        self.unique_id = id;
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn data(&self) -> &FrameData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut FrameData {
        &mut self.data
    }

    pub fn type_code(&self) -> u32 {
        self.data.type_code()
    }

    pub fn data_type(&self) -> Option<DataType> {
        DataType::from_code(self.type_code())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    pub fn byte_len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Raw bytes of channel `index`. `None` for raw frames or an index past
    /// the last channel.
    pub fn channel_bytes(&self, index: usize) -> Option<&[u8]> {
        if index >= self.height {
            return None;
        }
        let span = self.width * self.data_type()?.size();
        self.as_bytes().get(index * span..(index + 1) * span)
    }

    pub(crate) fn attach_lease(&mut self, lease: Lease) {
        self.lease = Some(lease);
    }

    pub fn is_pooled(&self) -> bool {
        self.lease.is_some()
    }
}

// A clone is a fresh, unpooled buffer; pool accounting stays with the source.
impl Clone for Frame {
    fn clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            unique_id: self.unique_id,
            data: self.data.clone(),
            lease: None,
        }
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.unique_id == other.unique_id
            && self.type_code() == other.type_code()
            && self.as_bytes() == other.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for t in DataType::ALL {
            assert_eq!(DataType::from_code(t.code()), Some(t));
            assert_eq!(t.to_string().parse::<DataType>(), Ok(t));
        }
        assert_eq!(DataType::from_code(10), None);
        assert!("complex64".parse::<DataType>().is_err());
    }

    #[test]
    fn geometry_is_checked() {
        assert!(Frame::new(4, 2, vec![0i32; 8]).is_ok());
        assert!(matches!(
            Frame::new(4, 2, vec![0i32; 7]),
            Err(MaskError::BadGeometry { width: 4, height: 2, len: 7 })
        ));
    }

    #[test]
    fn from_bytes_decodes_native_endian() {
        let values: Vec<u16> = vec![1, 2, 3, 4];
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let frame = Frame::from_bytes(DataType::UInt16.code(), 2, 2, &bytes).unwrap();
        assert_eq!(frame.data_type(), Some(DataType::UInt16));
        assert_eq!(frame.channel_bytes(1), Some(&bytes[4..]));
        assert_eq!(frame.as_bytes(), &bytes[..]);
    }

    #[test]
    fn from_bytes_rejects_short_buffer() {
        assert!(Frame::from_bytes(DataType::Float64.code(), 2, 2, &[0u8; 31]).is_err());
    }

    #[test]
    fn unknown_code_is_kept_raw() {
        let frame = Frame::from_bytes(42, 3, 1, &[9, 9, 9]).unwrap();
        assert_eq!(frame.data_type(), None);
        assert_eq!(frame.type_code(), 42);
        assert_eq!(frame.channel_bytes(0), None);
    }

    #[test]
    fn raw_data_cannot_claim_a_known_kind() {
        let data = FrameData::Raw { type_code: DataType::Int32.code(), bytes: vec![0; 8] };
        assert!(matches!(Frame::new(1, 2, data), Err(MaskError::MislabelledRaw(4))));
        let data = FrameData::Raw { type_code: 42, bytes: vec![0; 3] };
        assert!(Frame::new(3, 1, data).is_ok());
    }

    #[test]
    fn clone_drops_pool_lease() {
        let frame = Frame::new(1, 1, vec![1.5f32]).unwrap().with_unique_id(7);
        let copy = frame.clone();
        assert_eq!(copy, frame);
        assert!(!copy.is_pooled());
    }
}
