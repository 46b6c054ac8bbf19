//! Transform dispatch.
//!
//! Numeric kernels (blur, morphology, color conversion, geometric warps)
//! live outside this crate behind the [`PixelTransform`] trait. The crate
//! side of the contract is validation and storage: check the source type
//! against the operation's supported set, allocate destination storage with
//! the operation's output geometry, hand both sides to the collaborator as
//! packed [`FramePacket`]s, and surface collaborator failures as
//! [`Error::TransformFailure`] carrying the operation name.

use tracing::trace;

use crate::buffer::{ElemType, MatType};
use crate::error::Error;
use crate::matrix::Matrix;

/// A packed frame handed across the collaborator boundary: tightly packed
/// rows, no view indirection.
#[derive(Clone, Debug)]
pub struct FramePacket {
    pub width: u32,
    pub height: u32,
    pub mat_type: MatType,
    pub data: Vec<u8>,
}

impl FramePacket {
    /// Zero-filled packet of the given geometry.
    pub fn empty(width: u32, height: u32, mat_type: MatType) -> FramePacket {
        FramePacket {
            width,
            height,
            mat_type,
            data: vec![0u8; width as usize * height as usize * mat_type.pixel_size()],
        }
    }

    fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.mat_type.pixel_size()
    }
}

/// Color conversion selector for [`TransformOp::CvtColor`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ColorCode {
    Bgr2Gray,
    Gray2Bgr,
    Bgr2Rgb,
    Bgr2Hsv,
    Hsv2Bgr,
}

impl ColorCode {
    /// (source, destination) channel counts.
    pub const fn channel_map(self) -> (u8, u8) {
        match self {
            Self::Bgr2Gray => (3, 1),
            Self::Gray2Bgr => (1, 3),
            Self::Bgr2Rgb | Self::Bgr2Hsv | Self::Hsv2Bgr => (3, 3),
        }
    }
}

/// Thresholding rule for [`TransformOp::Threshold`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ThresholdKind {
    Binary,
    BinaryInv,
    Trunc,
    ToZero,
    ToZeroInv,
}

/// The closed set of operations a [`PixelTransform`] collaborator may be
/// asked to perform.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum TransformOp {
    GaussianBlur { ksize: (u32, u32), sigma: f64 },
    MedianBlur { ksize: u32 },
    Canny { low: f64, high: f64 },
    Sobel { dx: u8, dy: u8, ksize: u32 },
    Erode { iterations: u32 },
    Dilate { iterations: u32 },
    CvtColor { code: ColorCode },
    Threshold { value: f64, max: f64, kind: ThresholdKind },
    EqualizeHist,
    Resize { width: u32, height: u32 },
    WarpAffine { m: [f64; 6], width: u32, height: u32 },
    WarpPerspective { m: [f64; 9], width: u32, height: u32 },
    PyrDown,
    PyrUp,
}

impl TransformOp {
    /// Stable operation name carried in failure reports and trace events.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GaussianBlur { .. } => "gaussian_blur",
            Self::MedianBlur { .. } => "median_blur",
            Self::Canny { .. } => "canny",
            Self::Sobel { .. } => "sobel",
            Self::Erode { .. } => "erode",
            Self::Dilate { .. } => "dilate",
            Self::CvtColor { .. } => "cvt_color",
            Self::Threshold { .. } => "threshold",
            Self::EqualizeHist => "equalize_hist",
            Self::Resize { .. } => "resize",
            Self::WarpAffine { .. } => "warp_affine",
            Self::WarpPerspective { .. } => "warp_perspective",
            Self::PyrDown => "pyr_down",
            Self::PyrUp => "pyr_up",
        }
    }

    /// Whether the operation accepts a source of this type.
    pub fn supports(&self, t: MatType) -> bool {
        match self {
            Self::Canny { .. } | Self::EqualizeHist => {
                t.elem() == ElemType::U8 && t.channels() == 1
            }
            Self::MedianBlur { .. } => t.elem() == ElemType::U8,
            Self::CvtColor { code } => {
                t.elem() == ElemType::U8 && t.channels() == code.channel_map().0
            }
            Self::Threshold { .. } | Self::Sobel { .. } => t.channels() == 1,
            _ => true,
        }
    }

    /// Destination geometry for a source of the given shape.
    pub fn output_shape(&self, width: u32, height: u32, t: MatType) -> (u32, u32, MatType) {
        match self {
            Self::Resize { width: w, height: h } => (*w, *h, t),
            Self::WarpAffine { width: w, height: h, .. }
            | Self::WarpPerspective { width: w, height: h, .. } => (*w, *h, t),
            Self::PyrDown => (width.div_ceil(2), height.div_ceil(2), t),
            Self::PyrUp => (width * 2, height * 2, t),
            Self::CvtColor { code } => {
                let out_ch = code.channel_map().1;
                // channel_map only yields counts in 1..=4.
                let out_t = t.with_channels(out_ch).unwrap_or(t);
                (width, height, out_t)
            }
            _ => (width, height, t),
        }
    }

    /// Whether the result replaces the source view's pixels (same geometry)
    /// rather than allocating a new matrix.
    pub fn in_place(&self) -> bool {
        matches!(
            self,
            Self::GaussianBlur { .. }
                | Self::MedianBlur { .. }
                | Self::Canny { .. }
                | Self::Sobel { .. }
                | Self::Erode { .. }
                | Self::Dilate { .. }
                | Self::Threshold { .. }
                | Self::EqualizeHist
        )
    }
}

/// External vision collaborator: applies one operation to a packed source
/// frame, writing into a pre-allocated destination of the operation's
/// output geometry. Implementations must not resize `dst.data`.
pub trait PixelTransform {
    fn apply(&self, op: &TransformOp, src: &FramePacket, dst: &mut FramePacket)
        -> Result<(), Error>;
}

impl Matrix {
    /// Dispatch `op` through `kernel` into a newly allocated matrix
    /// (copying derivation). The source is never written.
    pub fn transform(
        &self,
        kernel: &dyn PixelTransform,
        op: &TransformOp,
    ) -> Result<Matrix, Error> {
        let dst = self.dispatch(kernel, op)?;
        Matrix::from_data(dst.height, dst.width, dst.mat_type, dst.data)
    }

    /// Dispatch an in-place operation through `kernel`, writing the result
    /// back into this view. Fails with `DimensionMismatch` for operations
    /// that change geometry (use [`transform`](Self::transform) for those).
    pub fn transform_in_place(
        &self,
        kernel: &dyn PixelTransform,
        op: &TransformOp,
    ) -> Result<(), Error> {
        if !op.in_place() {
            return Err(Error::DimensionMismatch {
                op: op.name(),
                expected: "in-place capable operation".into(),
                found: "geometry-changing operation".into(),
            });
        }
        let dst = self.dispatch(kernel, op)?;
        if dst.mat_type != self.mat_type() {
            return Err(Error::TransformFailure {
                op: op.name(),
                reason: format!(
                    "collaborator changed pixel type to {:?}",
                    dst.mat_type
                ),
            });
        }
        self.put(&dst.data)
    }

    /// Validate, allocate, dispatch, and check the collaborator's output.
    fn dispatch(&self, kernel: &dyn PixelTransform, op: &TransformOp) -> Result<FramePacket, Error> {
        if !op.supports(self.mat_type()) {
            return Err(Error::DimensionMismatch {
                op: op.name(),
                expected: "a supported source type".into(),
                found: format!("{:?}", self.mat_type()),
            });
        }
        let src = FramePacket {
            width: self.width(),
            height: self.height(),
            mat_type: self.mat_type(),
            data: self.get_data()?,
        };
        let (ow, oh, ot) = op.output_shape(src.width, src.height, src.mat_type);
        let mut dst = FramePacket::empty(ow, oh, ot);
        trace!(op = op.name(), src_w = src.width, src_h = src.height, dst_w = ow, dst_h = oh, "transform dispatch");
        kernel.apply(op, &src, &mut dst).map_err(|e| match e {
            failure @ Error::TransformFailure { .. } => failure,
            other => Error::TransformFailure {
                op: op.name(),
                reason: other.to_string(),
            },
        })?;
        if dst.data.len() != dst.expected_len() {
            return Err(Error::TransformFailure {
                op: op.name(),
                reason: format!(
                    "collaborator produced {} bytes, expected {}",
                    dst.data.len(),
                    dst.expected_len()
                ),
            });
        }
        Ok(dst)
    }

    /// Convert color space in place. When the conversion changes the channel
    /// count the view's storage is replaced by a fresh buffer of the new
    /// type; sibling views keep aliasing the old storage and see the
    /// pre-conversion pixels.
    pub fn cvt_color(&mut self, kernel: &dyn PixelTransform, code: ColorCode) -> Result<(), Error> {
        let op = TransformOp::CvtColor { code };
        let out = self.transform(kernel, &op)?;
        *self = out;
        Ok(())
    }
}

// Convenience wrappers mirroring the classic per-operation calls.
impl Matrix {
    pub fn gaussian_blur(
        &self,
        kernel: &dyn PixelTransform,
        ksize: (u32, u32),
        sigma: f64,
    ) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::GaussianBlur { ksize, sigma })
    }

    pub fn median_blur(&self, kernel: &dyn PixelTransform, ksize: u32) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::MedianBlur { ksize })
    }

    pub fn canny(&self, kernel: &dyn PixelTransform, low: f64, high: f64) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::Canny { low, high })
    }

    pub fn sobel(
        &self,
        kernel: &dyn PixelTransform,
        dx: u8,
        dy: u8,
        ksize: u32,
    ) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::Sobel { dx, dy, ksize })
    }

    pub fn erode(&self, kernel: &dyn PixelTransform, iterations: u32) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::Erode { iterations })
    }

    pub fn dilate(&self, kernel: &dyn PixelTransform, iterations: u32) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::Dilate { iterations })
    }

    pub fn threshold(
        &self,
        kernel: &dyn PixelTransform,
        value: f64,
        max: f64,
        kind: ThresholdKind,
    ) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::Threshold { value, max, kind })
    }

    pub fn equalize_hist(&self, kernel: &dyn PixelTransform) -> Result<(), Error> {
        self.transform_in_place(kernel, &TransformOp::EqualizeHist)
    }

    /// Resampled copy (copying derivation).
    pub fn resize(
        &self,
        kernel: &dyn PixelTransform,
        width: u32,
        height: u32,
    ) -> Result<Matrix, Error> {
        self.transform(kernel, &TransformOp::Resize { width, height })
    }

    /// Affine warp into a new matrix (copying derivation).
    pub fn warp_affine(
        &self,
        kernel: &dyn PixelTransform,
        m: [f64; 6],
        width: u32,
        height: u32,
    ) -> Result<Matrix, Error> {
        self.transform(kernel, &TransformOp::WarpAffine { m, width, height })
    }

    /// Perspective warp into a new matrix (copying derivation).
    pub fn warp_perspective(
        &self,
        kernel: &dyn PixelTransform,
        m: [f64; 9],
        width: u32,
        height: u32,
    ) -> Result<Matrix, Error> {
        self.transform(kernel, &TransformOp::WarpPerspective { m, width, height })
    }

    /// Halved-resolution pyramid step (copying derivation).
    pub fn pyr_down(&self, kernel: &dyn PixelTransform) -> Result<Matrix, Error> {
        self.transform(kernel, &TransformOp::PyrDown)
    }

    /// Doubled-resolution pyramid step (copying derivation).
    pub fn pyr_up(&self, kernel: &dyn PixelTransform) -> Result<Matrix, Error> {
        self.transform(kernel, &TransformOp::PyrUp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Scalar;

    /// Copies the source into the destination when geometry matches;
    /// nearest-neighbor resamples otherwise. Stands in for a real kernel.
    struct Passthrough;

    impl PixelTransform for Passthrough {
        fn apply(
            &self,
            _op: &TransformOp,
            src: &FramePacket,
            dst: &mut FramePacket,
        ) -> Result<(), Error> {
            let sp = src.mat_type.pixel_size();
            let dp = dst.mat_type.pixel_size();
            let n = sp.min(dp);
            for y in 0..dst.height as usize {
                let sy = y * src.height as usize / dst.height.max(1) as usize;
                for x in 0..dst.width as usize {
                    let sx = x * src.width as usize / dst.width.max(1) as usize;
                    let s = (sy * src.width as usize + sx) * sp;
                    let d = (y * dst.width as usize + x) * dp;
                    dst.data[d..d + n].copy_from_slice(&src.data[s..s + n]);
                }
            }
            Ok(())
        }
    }

    struct Failing;

    impl PixelTransform for Failing {
        fn apply(
            &self,
            _op: &TransformOp,
            _src: &FramePacket,
            _dst: &mut FramePacket,
        ) -> Result<(), Error> {
            Err(Error::DeviceOrIo("kernel backend unavailable".into()))
        }
    }

    /// Shrinks the destination, violating the packet contract.
    struct Misbehaving;

    impl PixelTransform for Misbehaving {
        fn apply(
            &self,
            _op: &TransformOp,
            _src: &FramePacket,
            dst: &mut FramePacket,
        ) -> Result<(), Error> {
            dst.data.truncate(1);
            Ok(())
        }
    }

    #[test]
    fn in_place_transform_writes_back() {
        let m = Matrix::new_with_scalar(2, 2, MatType::U8C1, Scalar::all(7.0)).unwrap();
        m.gaussian_blur(&Passthrough, (3, 3), 1.0).unwrap();
        assert_eq!(m.get(1, 1).unwrap(), 7.0);
    }

    #[test]
    fn resize_allocates_new_geometry() {
        let m = Matrix::new_with_scalar(2, 2, MatType::U8C1, Scalar::all(9.0)).unwrap();
        let big = m.resize(&Passthrough, 4, 4).unwrap();
        assert_eq!(big.width(), 4);
        assert_eq!(big.height(), 4);
        assert_eq!(big.get(3, 3).unwrap(), 9.0);
        assert!(!big.shares_storage_with(&m));
    }

    #[test]
    fn collaborator_failure_carries_op_name() {
        let m = Matrix::zeros(2, 2, MatType::U8C1);
        let err = m.canny(&Failing, 10.0, 30.0).unwrap_err();
        match err {
            Error::TransformFailure { op, reason } => {
                assert_eq!(op, "canny");
                assert!(reason.contains("unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unsupported_type_rejected_before_dispatch() {
        let m = Matrix::zeros(2, 2, MatType::U8C3);
        // Canny requires single-channel input; the kernel is never invoked.
        let err = m.canny(&Failing, 10.0, 30.0).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn bad_output_length_is_a_transform_failure() {
        let m = Matrix::zeros(2, 2, MatType::U8C1);
        let err = m.erode(&Misbehaving, 1).unwrap_err();
        assert!(matches!(err, Error::TransformFailure { .. }));
    }

    #[test]
    fn geometry_changing_op_refused_in_place() {
        let m = Matrix::zeros(2, 2, MatType::U8C1);
        let err = m
            .transform_in_place(&Passthrough, &TransformOp::PyrUp)
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { .. }));
    }

    #[test]
    fn cvt_color_changes_channels_and_detaches_siblings() {
        let mut m = Matrix::new_with_scalar(2, 2, MatType::U8C3, Scalar::all(5.0)).unwrap();
        let sibling = m.alias();
        m.cvt_color(&Passthrough, ColorCode::Bgr2Gray).unwrap();
        assert_eq!(m.channels(), 1);
        // The sibling still aliases the original three-channel storage.
        assert_eq!(sibling.channels(), 3);
        assert_eq!(sibling.pixel(0, 0).unwrap().0[..3], [5.0, 5.0, 5.0]);
        assert!(!m.shares_storage_with(&sibling));
    }

    #[test]
    fn pyramid_shapes() {
        let op = TransformOp::PyrDown;
        assert_eq!(op.output_shape(5, 4, MatType::U8C1).0, 3);
        assert_eq!(op.output_shape(5, 4, MatType::U8C1).1, 2);
        let up = TransformOp::PyrUp;
        assert_eq!(up.output_shape(5, 4, MatType::U8C1).0, 10);
    }
}
