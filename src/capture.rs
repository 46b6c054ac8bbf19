//! Capture sources.
//!
//! A [`CaptureSource`] is the blocking producer side of a video stream:
//! cameras, file demuxers, test fixtures. `read_frame` returns `Ok(None)`
//! on clean end of input; stream drivers map that to a normal end, never
//! an error. Sources must tolerate `close` being called at any point and
//! must not be read after it.

use std::io::Read;

use crate::codec::{RawFrameCodec, RAW_HEADER_LEN};
use crate::error::Error;
use crate::matrix::Matrix;

/// Blocking frame producer.
pub trait CaptureSource: Send {
    /// Produce the next frame. `Ok(None)` means the source is cleanly
    /// exhausted; an error means the device or underlying I/O failed.
    fn read_frame(&mut self) -> Result<Option<Matrix>, Error>;

    /// Release the underlying device or handle. Idempotent.
    fn close(&mut self);
}

/// A capture source over any `std::io::Read` yielding consecutive frames
/// in the raw interchange format.
pub struct RawFrameReader<R> {
    inner: R,
    closed: bool,
}

impl<R: Read + Send> RawFrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            closed: false,
        }
    }
}

/// Fill `buf` as far as the reader allows, returning the number of bytes
/// read (short only at end of input).
fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

impl<R: Read + Send> CaptureSource for RawFrameReader<R> {
    fn read_frame(&mut self) -> Result<Option<Matrix>, Error> {
        if self.closed {
            return Err(Error::SourceExhausted);
        }
        let mut header = [0u8; RAW_HEADER_LEN];
        let got = read_fully(&mut self.inner, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < RAW_HEADER_LEN {
            return Err(Error::TruncatedInput { buffered: got });
        }
        let (width, height, mat_type, payload) = RawFrameCodec::parse_header(&header)?;
        let mut data = vec![0u8; payload];
        let got = read_fully(&mut self.inner, &mut data)?;
        if got < payload {
            return Err(Error::TruncatedInput {
                buffered: RAW_HEADER_LEN + got,
            });
        }
        Ok(Some(Matrix::from_data(height, width, mat_type, data)?))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
