//! Image codec boundary.
//!
//! Compressed codecs (PNG, JPEG, …) are external collaborators behind the
//! [`ImageCodec`] trait: this crate owns format sniffing, probe/decode
//! sequencing for streams, and the storage on either side of a codec call,
//! never the compression math. One codec ships built in:
//! [`RawFrameCodec`], the uncompressed interchange form, so decode streams
//! and capture readers work end to end without an external collaborator.

use crate::buffer::{ElemType, MatType};
use crate::error::Error;
use crate::matrix::Matrix;

/// Container formats recognized by magic-byte or extension sniffing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
    Tiff,
    /// The crate's uncompressed interchange format.
    RawFrame,
}

impl ImageFormat {
    /// Sniff a format from the first bytes of a file. Needs at least 12
    /// bytes to tell every format apart; shorter prefixes may return
    /// `None` even for data that would later match.
    pub fn from_magic(bytes: &[u8]) -> Option<ImageFormat> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else if bytes.starts_with(b"BM") {
            Some(Self::Bmp)
        } else if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00])
            || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A])
        {
            Some(Self::Tiff)
        } else if bytes.starts_with(RAW_FRAME_MAGIC) {
            Some(Self::RawFrame)
        } else {
            None
        }
    }

    /// Resolve a format from a file extension (case-insensitive, with or
    /// without the leading dot).
    pub fn from_extension(ext: &str) -> Option<ImageFormat> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "gif" => Some(Self::Gif),
            "webp" => Some(Self::Webp),
            "bmp" => Some(Self::Bmp),
            "tif" | "tiff" => Some(Self::Tiff),
            "pxf" => Some(Self::RawFrame),
            _ => None,
        }
    }

    /// Canonical extension, without a dot.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::RawFrame => "pxf",
        }
    }
}

/// Outcome of probing a byte prefix for one complete image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Probe {
    /// Not enough bytes to hold a complete image yet.
    NeedMore,
    /// A complete image occupies the first `n` bytes.
    Complete(usize),
}

/// A decoded frame in packed form, ready to wrap as a [`Matrix`].
#[derive(Clone, Debug)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub mat_type: MatType,
    pub data: Vec<u8>,
}

impl DecodedImage {
    pub fn into_matrix(self) -> Result<Matrix, Error> {
        Matrix::from_data(self.height, self.width, self.mat_type, self.data)
    }
}

/// Knobs passed through to an encoder. Codecs ignore the ones that do not
/// apply to their format.
#[derive(Clone, Copy, Debug)]
pub struct EncodeOptions {
    pub format: ImageFormat,
    /// Lossy quality, 0-100.
    pub quality: Option<u8>,
    /// Lossless compression level, codec-defined scale.
    pub compression: Option<u8>,
}

impl EncodeOptions {
    pub const fn new(format: ImageFormat) -> EncodeOptions {
        EncodeOptions {
            format,
            quality: None,
            compression: None,
        }
    }
}

/// External image codec collaborator.
pub trait ImageCodec: Send + Sync {
    /// Short stable name for diagnostics ("raw", "png", …).
    fn name(&self) -> &str;

    /// Decide whether `buf` starts with one complete image.
    fn probe(&self, buf: &[u8]) -> Result<Probe, Error>;

    /// Decode exactly one image from the start of `buf`.
    fn decode(&self, buf: &[u8]) -> Result<DecodedImage, Error>;

    /// Encode a matrix.
    fn encode(&self, frame: &Matrix, options: &EncodeOptions) -> Result<Vec<u8>, Error>;
}

impl Matrix {
    /// Decode one image through `codec` (copying derivation).
    pub fn decode_from(codec: &dyn ImageCodec, buf: &[u8]) -> Result<Matrix, Error> {
        codec.decode(buf)?.into_matrix()
    }

    /// Encode this view through `codec`.
    pub fn encode_to(&self, codec: &dyn ImageCodec, options: &EncodeOptions) -> Result<Vec<u8>, Error> {
        codec.encode(self, options)
    }
}

// ---------------------------------------------------------------------------
// Raw frame interchange format
// ---------------------------------------------------------------------------

pub(crate) const RAW_FRAME_MAGIC: &[u8; 4] = b"PXF0";
pub(crate) const RAW_HEADER_LEN: usize = 18;

/// The uncompressed interchange codec. Wire layout, little-endian:
/// `"PXF0"` magic, `u32` width, `u32` height, `u8` element tag, `u8`
/// channel count, `u32` payload length, packed payload.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawFrameCodec;

impl RawFrameCodec {
    pub(crate) fn parse_header(buf: &[u8]) -> Result<(u32, u32, MatType, usize), Error> {
        if &buf[..4] != RAW_FRAME_MAGIC {
            return Err(Error::DeviceOrIo("bad raw frame magic".into()));
        }
        let width = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let height = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let elem = ElemType::from_tag(buf[12])
            .ok_or_else(|| Error::DeviceOrIo(format!("unknown element tag {}", buf[12])))?;
        let mat_type = MatType::new(elem, buf[13])?;
        let payload = u32::from_le_bytes([buf[14], buf[15], buf[16], buf[17]]) as usize;
        let expected = width as usize * height as usize * mat_type.pixel_size();
        if payload != expected {
            return Err(Error::DeviceOrIo(format!(
                "raw frame payload length {payload} does not match {width}x{height} geometry"
            )));
        }
        Ok((width, height, mat_type, payload))
    }
}

impl ImageCodec for RawFrameCodec {
    fn name(&self) -> &str {
        "raw"
    }

    fn probe(&self, buf: &[u8]) -> Result<Probe, Error> {
        if buf.len() < RAW_HEADER_LEN {
            // Reject early once the magic cannot match anymore.
            let n = buf.len().min(4);
            if buf[..n] != RAW_FRAME_MAGIC[..n] {
                return Err(Error::DeviceOrIo("bad raw frame magic".into()));
            }
            return Ok(Probe::NeedMore);
        }
        let (_, _, _, payload) = Self::parse_header(buf)?;
        if buf.len() < RAW_HEADER_LEN + payload {
            Ok(Probe::NeedMore)
        } else {
            Ok(Probe::Complete(RAW_HEADER_LEN + payload))
        }
    }

    fn decode(&self, buf: &[u8]) -> Result<DecodedImage, Error> {
        if buf.len() < RAW_HEADER_LEN {
            return Err(Error::TruncatedInput {
                buffered: buf.len(),
            });
        }
        let (width, height, mat_type, payload) = Self::parse_header(buf)?;
        if buf.len() < RAW_HEADER_LEN + payload {
            return Err(Error::TruncatedInput {
                buffered: buf.len(),
            });
        }
        Ok(DecodedImage {
            width,
            height,
            mat_type,
            data: buf[RAW_HEADER_LEN..RAW_HEADER_LEN + payload].to_vec(),
        })
    }

    fn encode(&self, frame: &Matrix, _options: &EncodeOptions) -> Result<Vec<u8>, Error> {
        let data = frame.get_data()?;
        let mut out = Vec::with_capacity(RAW_HEADER_LEN + data.len());
        out.extend_from_slice(RAW_FRAME_MAGIC);
        out.extend_from_slice(&frame.width().to_le_bytes());
        out.extend_from_slice(&frame.height().to_le_bytes());
        out.push(frame.elem().tag());
        out.push(frame.channels());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&data);
        Ok(out)
    }
}
