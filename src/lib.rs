//! Typed pixel-buffer views with async frame pipelines and contour
//! hierarchies.
//!
//! The center of the crate is [`Matrix`]: a view record over shared,
//! reference-counted pixel storage ([`PixelBuffer`]). Views derive from
//! other views either by **aliasing** (sub-views, channel views — shared
//! storage, mutation visible through every handle) or by **copying**
//! (clone, conversions, transform outputs — independent storage); every
//! deriving operation documents which side of that line it is on, and the
//! distinction is load-bearing for correctness, not a convenience.
//!
//! Around the buffer model sit:
//!
//! - in-place, hard-clipped drawing primitives ([`draw`](Matrix::line));
//! - a validated dispatch boundary to external numeric kernels
//!   ([`PixelTransform`], [`TransformOp`]);
//! - contour extraction and the nesting hierarchy ([`Contours`]);
//! - codec, capture, classifier, and display collaborator traits
//!   ([`ImageCodec`], [`CaptureSource`], [`Classify`], [`DisplaySink`]);
//! - tokio-driven frame pipelines with single-flight backpressure
//!   ([`VideoStream`], [`ImageDecodeStream`], [`ObjectDetectionStream`]).
//!
//! Heavy numeric work (blur kernels, cascade classifiers, compressed
//! codecs) deliberately lives outside this crate behind narrow traits;
//! the crate owns storage, validation, ordering, and lifecycle.
//!
//! ```
//! use pixelflow::{ChainApprox, MatType, Matrix, Rect, RetrievalMode, Scalar};
//!
//! # fn main() -> Result<(), pixelflow::Error> {
//! let image = Matrix::zeros(64, 64, MatType::U8C1);
//! image.rectangle(Rect::new(8, 8, 16, 16), Scalar::all(255.0), -1)?;
//!
//! let contours = image.find_contours(RetrievalMode::External, ChainApprox::Simple)?;
//! assert_eq!(contours.len(), 1);
//! assert_eq!(contours.bounding_rect(0)?, Rect::new(8, 8, 16, 16));
//! # Ok(())
//! # }
//! ```

mod buffer;
mod capture;
mod classify;
mod codec;
mod contours;
mod draw;
mod error;
mod geom;
mod matrix;
mod stream;
mod transform;
mod window;

pub use buffer::{ElemType, MatType, PixelBuffer};
pub use capture::{CaptureSource, RawFrameReader};
pub use classify::{Classify, DetectOptions};
pub use codec::{
    DecodedImage, EncodeOptions, ImageCodec, ImageFormat, Probe, RawFrameCodec,
};
pub use contours::{
    ChainApprox, ContourMoments, Contours, Hierarchy, RetrievalMode,
};
pub use error::Error;
pub use geom::{Point, Point2f, Rect, RotatedRect, Scalar, Size};
pub use matrix::{FlipCode, Matrix, MinMaxLoc, Moments};
pub use stream::{
    DetectionEvent, Detections, Frames, ImageDecodeStream, Lifecycle,
    ObjectDetectionStream, StreamEvent, VideoStream,
};
pub use transform::{
    ColorCode, FramePacket, PixelTransform, ThresholdKind, TransformOp,
};
pub use window::{DisplaySink, NamedWindow};
