//! Shared pixel storage.
//!
//! [`PixelBuffer`] owns one contiguous block of typed pixel storage. It is
//! always held behind an `Arc`: every [`Matrix`](crate::Matrix) view keeps a
//! strong reference, and the block is freed when the last view drops its
//! reference. Element values are stored little-endian and accessed through
//! the [`ElemType`] tag rather than byte reinterpretation, so a buffer's
//! type can vary at runtime across the closed enumeration below.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Error;

/// Channel storage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ElemType {
    /// 8-bit unsigned integer.
    U8 = 0,
    /// 8-bit signed integer.
    S8 = 1,
    /// 16-bit unsigned integer.
    U16 = 2,
    /// 16-bit signed integer.
    S16 = 3,
    /// 32-bit signed integer.
    S32 = 4,
    /// 32-bit floating point.
    F32 = 5,
    /// 64-bit floating point.
    F64 = 6,
}

impl ElemType {
    /// Byte size of a single channel value.
    #[inline]
    pub const fn byte_size(self) -> usize {
        match self {
            Self::U8 | Self::S8 => 1,
            Self::U16 | Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Whether this is an integer type (bitwise operations are defined
    /// only for these).
    #[inline]
    pub const fn is_integer(self) -> bool {
        !matches!(self, Self::F32 | Self::F64)
    }

    /// Decode one channel value from the start of `src`.
    ///
    /// # Panics
    ///
    /// Panics if `src` is shorter than [`byte_size()`](Self::byte_size).
    /// Callers inside this crate always slice from a validated region.
    pub fn read(self, src: &[u8]) -> f64 {
        match self {
            Self::U8 => src[0] as f64,
            Self::S8 => src[0] as i8 as f64,
            Self::U16 => u16::from_le_bytes([src[0], src[1]]) as f64,
            Self::S16 => i16::from_le_bytes([src[0], src[1]]) as f64,
            Self::S32 => i32::from_le_bytes([src[0], src[1], src[2], src[3]]) as f64,
            Self::F32 => f32::from_le_bytes([src[0], src[1], src[2], src[3]]) as f64,
            Self::F64 => f64::from_le_bytes([
                src[0], src[1], src[2], src[3], src[4], src[5], src[6], src[7],
            ]),
        }
    }

    /// Encode one channel value into the start of `dst`, saturating
    /// integer types.
    ///
    /// # Panics
    ///
    /// Panics if `dst` is shorter than [`byte_size()`](Self::byte_size).
    pub fn write(self, dst: &mut [u8], v: f64) {
        match self {
            Self::U8 => dst[0] = v.round().clamp(0.0, u8::MAX as f64) as u8,
            Self::S8 => dst[0] = (v.round().clamp(i8::MIN as f64, i8::MAX as f64) as i8) as u8,
            Self::U16 => {
                let b = (v.round().clamp(0.0, u16::MAX as f64) as u16).to_le_bytes();
                dst[..2].copy_from_slice(&b);
            }
            Self::S16 => {
                let b = (v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16).to_le_bytes();
                dst[..2].copy_from_slice(&b);
            }
            Self::S32 => {
                let b = (v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32).to_le_bytes();
                dst[..4].copy_from_slice(&b);
            }
            Self::F32 => dst[..4].copy_from_slice(&(v as f32).to_le_bytes()),
            Self::F64 => dst[..8].copy_from_slice(&v.to_le_bytes()),
        }
    }

    /// Stable wire tag for the raw-frame interchange format.
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Inverse of [`tag()`](Self::tag).
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::U8),
            1 => Some(Self::S8),
            2 => Some(Self::U16),
            3 => Some(Self::S16),
            4 => Some(Self::S32),
            5 => Some(Self::F32),
            6 => Some(Self::F64),
            _ => None,
        }
    }
}

/// Element type plus channel count (1–4): the complete pixel format of a
/// buffer or view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatType {
    elem: ElemType,
    channels: u8,
}

impl MatType {
    /// 8-bit single channel — the type binary images and masks use.
    pub const U8C1: MatType = MatType {
        elem: ElemType::U8,
        channels: 1,
    };
    /// 8-bit three channel (BGR by convention).
    pub const U8C3: MatType = MatType {
        elem: ElemType::U8,
        channels: 3,
    };
    /// 64-bit float single channel, used by transform matrices.
    pub const F64C1: MatType = MatType {
        elem: ElemType::F64,
        channels: 1,
    };

    /// Create a mat type. Channel counts outside 1–4 are rejected.
    pub fn new(elem: ElemType, channels: u8) -> Result<Self, Error> {
        if channels == 0 || channels > 4 {
            return Err(Error::DimensionMismatch {
                op: "MatType::new",
                expected: "1-4 channels".into(),
                found: format!("{channels} channels"),
            });
        }
        Ok(Self { elem, channels })
    }

    #[inline]
    pub const fn elem(self) -> ElemType {
        self.elem
    }

    #[inline]
    pub const fn channels(self) -> u8 {
        self.channels
    }

    /// Bytes per full pixel.
    #[inline]
    pub const fn pixel_size(self) -> usize {
        self.elem.byte_size() * self.channels as usize
    }

    /// Same element type, different channel count.
    pub fn with_channels(self, channels: u8) -> Result<Self, Error> {
        Self::new(self.elem, channels)
    }
}

/// Owned, shareable pixel storage.
///
/// Interior mutability lets several aliasing [`Matrix`](crate::Matrix) views
/// write through the same block; streams guarantee no two stages mutate one
/// buffer concurrently, and the lock makes even misuse memory-safe.
#[derive(Debug)]
pub struct PixelBuffer {
    data: RwLock<Vec<u8>>,
    width: u32,
    height: u32,
    stride: usize,
    mat_type: MatType,
}

impl PixelBuffer {
    /// Allocate a zero-filled buffer. Rows are tightly packed.
    pub fn new(width: u32, height: u32, mat_type: MatType) -> Self {
        let stride = width as usize * mat_type.pixel_size();
        Self {
            data: RwLock::new(vec![0u8; stride * height as usize]),
            width,
            height,
            stride,
            mat_type,
        }
    }

    /// Wrap an existing byte vector as tightly-packed pixel storage.
    pub fn from_vec(
        data: Vec<u8>,
        width: u32,
        height: u32,
        mat_type: MatType,
    ) -> Result<Self, Error> {
        let stride = width as usize * mat_type.pixel_size();
        let required = stride * height as usize;
        if data.len() != required {
            return Err(Error::DimensionMismatch {
                op: "PixelBuffer::from_vec",
                expected: format!("{required} bytes"),
                found: format!("{} bytes", data.len()),
            });
        }
        Ok(Self {
            data: RwLock::new(data),
            width,
            height,
            stride,
            mat_type,
        })
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Byte stride between row starts.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn mat_type(&self) -> MatType {
        self.mat_type
    }

    /// Byte offset of pixel `(x, y)` in buffer coordinates.
    #[inline]
    pub(crate) fn offset_of(&self, x: u32, y: u32) -> usize {
        y as usize * self.stride + x as usize * self.mat_type.pixel_size()
    }

    /// Read-lock the storage. A poisoned lock is absorbed rather than
    /// propagated: the data is plain bytes and stays structurally valid.
    pub(crate) fn read_guard(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Write-lock the storage (poison-absorbing, see [`read_guard`](Self::read_guard)).
    pub(crate) fn write_guard(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.data.write().unwrap_or_else(|e| e.into_inner())
    }
}
