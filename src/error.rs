//! Crate-wide error taxonomy.
//!
//! Buffer/view and arithmetic contract violations are local, synchronous
//! failures returned at the call that triggered them. Stream-level failures
//! are surfaced exactly once as a terminal event on the stream that failed.

use crate::buffer::MatType;

/// All failures surfaced by this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Pixel or region access outside the logical view extent.
    #[error(
        "pixel access out of bounds: ({x}, {y}) channel {channel} \
         outside {width}x{height}x{channels} view"
    )]
    OutOfBounds {
        x: i64,
        y: i64,
        channel: u8,
        width: u32,
        height: u32,
        channels: u8,
    },

    /// Operand shape, channel count, or element type incompatibility.
    #[error("{op}: dimension mismatch (expected {expected}, found {found})")]
    DimensionMismatch {
        op: &'static str,
        expected: String,
        found: String,
    },

    /// An external vision collaborator rejected or failed an operation.
    #[error("transform '{op}' failed: {reason}")]
    TransformFailure { op: &'static str, reason: String },

    /// Malformed or schema-incompatible serialized contour input.
    #[error("corrupt contour data: {0}")]
    CorruptContourData(String),

    /// The capture or decode source has no more data. Maps to a normal
    /// stream end, not a failure; returned directly only when an operation
    /// is attempted on an already-ended stream.
    #[error("source exhausted")]
    SourceExhausted,

    /// Capture device or underlying I/O error.
    #[error("device or I/O failure: {0}")]
    DeviceOrIo(String),

    /// A decode stream ended with a partial image still buffered.
    #[error("truncated input: {buffered} byte(s) buffered at end of input")]
    TruncatedInput { buffered: usize },

    /// A matrix view was used after `release()`.
    #[error("matrix used after release")]
    UseAfterRelease,
}

impl Error {
    /// Shorthand for a dimension-mismatch failure comparing two mat types
    /// and sizes.
    pub(crate) fn shape_mismatch(
        op: &'static str,
        expected: (u32, u32, MatType),
        found: (u32, u32, MatType),
    ) -> Self {
        Error::DimensionMismatch {
            op,
            expected: format!("{}x{} {:?}", expected.0, expected.1, expected.2),
            found: format!("{}x{} {:?}", found.0, found.1, found.2),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::DeviceOrIo(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ElemType, MatType};

    #[test]
    fn out_of_bounds_display_names_offender() {
        let err = Error::OutOfBounds {
            x: 9,
            y: 2,
            channel: 0,
            width: 4,
            height: 4,
            channels: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("(9, 2)"));
        assert!(msg.contains("4x4x3"));
    }

    #[test]
    fn shape_mismatch_carries_both_shapes() {
        let a = MatType::new(ElemType::U8, 3).unwrap();
        let b = MatType::new(ElemType::U8, 1).unwrap();
        let err = Error::shape_mismatch("bitwise_and", (4, 4, a), (4, 4, b));
        let msg = err.to_string();
        assert!(msg.contains("bitwise_and"));
        assert!(msg.contains("expected"));
    }

    #[test]
    fn io_error_maps_to_device_or_io() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err = Error::from(io);
        assert!(matches!(err, Error::DeviceOrIo(_)));
        assert!(err.to_string().contains("pipe gone"));
    }
}
