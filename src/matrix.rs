//! The [`Matrix`] view model.
//!
//! A `Matrix` is a lightweight view record — byte offset, stride, logical
//! size, element layout — over a shared [`PixelBuffer`]. Every operation
//! that produces a `Matrix` falls in exactly one of two camps, and the
//! docs on each method say which:
//!
//! - **aliasing derivation**: [`roi`](Matrix::roi), [`crop`](Matrix::crop),
//!   [`channel_view`](Matrix::channel_view), [`reshape`](Matrix::reshape),
//!   [`alias`](Matrix::alias) share storage with their source. Mutation
//!   through one handle is visible through all of them.
//! - **copying derivation**: [`Clone::clone`], [`convert_to`](Matrix::convert_to),
//!   [`split`](Matrix::split), [`flip`](Matrix::flip) and every transform
//!   output allocate independent storage.
//!
//! Storage is released when the last view referencing it drops;
//! [`release()`](Matrix::release) drops one view's reference early and is
//! idempotent. Sibling views that alias the same buffer stay valid.

use std::fmt;
use std::sync::Arc;

use crate::buffer::{ElemType, MatType, PixelBuffer};
use crate::error::Error;
use crate::geom::{Point, Point2f, Rect, Scalar, Size};

/// A typed 2D pixel-buffer view supporting in-place and allocating
/// operations. See the module docs for the aliasing/copying contract.
pub struct Matrix {
    buf: Option<Arc<PixelBuffer>>,
    /// Byte offset of this view's (0, 0) pixel inside the buffer.
    byte_offset: usize,
    /// Bytes between consecutive rows.
    stride: usize,
    /// Bytes between consecutive pixels within a row. Equals
    /// `mat_type.pixel_size()` except for channel views, where it is the
    /// parent's pixel size.
    elem_stride: usize,
    width: u32,
    height: u32,
    mat_type: MatType,
}

/// Result of [`Matrix::min_max_loc`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinMaxLoc {
    pub min_val: f64,
    pub max_val: f64,
    pub min_loc: Point,
    pub max_loc: Point,
}

/// Spatial, central, and normalized central image moments.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Moments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m11: f64,
    pub m02: f64,
    pub m30: f64,
    pub m21: f64,
    pub m12: f64,
    pub m03: f64,
    pub mu20: f64,
    pub mu11: f64,
    pub mu02: f64,
    pub mu30: f64,
    pub mu21: f64,
    pub mu12: f64,
    pub mu03: f64,
    pub nu20: f64,
    pub nu11: f64,
    pub nu02: f64,
    pub nu30: f64,
    pub nu21: f64,
    pub nu12: f64,
    pub nu03: f64,
}

/// Direction for [`Matrix::flip`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlipCode {
    /// Around the horizontal axis (top/bottom swap).
    Vertical,
    /// Around the vertical axis (left/right swap).
    Horizontal,
    /// Both axes.
    Both,
}

// ---------------------------------------------------------------------------
// Construction and factories
// ---------------------------------------------------------------------------

impl Matrix {
    /// Allocate a zero-filled `rows`×`cols` matrix.
    pub fn new(rows: u32, cols: u32, mat_type: MatType) -> Matrix {
        Matrix::from_buffer(Arc::new(PixelBuffer::new(cols, rows, mat_type)))
    }

    /// Allocate and fill every pixel with `value`.
    pub fn new_with_scalar(
        rows: u32,
        cols: u32,
        mat_type: MatType,
        value: Scalar,
    ) -> Result<Matrix, Error> {
        let m = Matrix::new(rows, cols, mat_type);
        m.set_to(value, None)?;
        Ok(m)
    }

    /// Wrap packed pixel bytes as a matrix. The data length must be exactly
    /// `rows * cols * mat_type.pixel_size()`.
    pub fn from_data(
        rows: u32,
        cols: u32,
        mat_type: MatType,
        data: Vec<u8>,
    ) -> Result<Matrix, Error> {
        Ok(Matrix::from_buffer(Arc::new(PixelBuffer::from_vec(
            data, cols, rows, mat_type,
        )?)))
    }

    /// All-zeros factory.
    pub fn zeros(rows: u32, cols: u32, mat_type: MatType) -> Matrix {
        Matrix::new(rows, cols, mat_type)
    }

    /// Every channel of every pixel set to the type's one value.
    pub fn ones(rows: u32, cols: u32, mat_type: MatType) -> Matrix {
        let m = Matrix::new(rows, cols, mat_type);
        // A fresh full view over owned storage cannot fail set_to.
        let _ = m.set_to(Scalar::all(1.0), None);
        m
    }

    /// Identity: ones on the main diagonal (channel 0), zeros elsewhere.
    pub fn eye(rows: u32, cols: u32, mat_type: MatType) -> Matrix {
        let m = Matrix::new(rows, cols, mat_type);
        for i in 0..rows.min(cols) {
            let _ = m.set_channel(i, i, 0, 1.0);
        }
        m
    }

    /// 2×3 affine rotation matrix (`F64C1`) around `center`, in degrees
    /// counterclockwise, with isotropic `scale`.
    pub fn rotation_matrix_2d(angle_deg: f64, center: Point2f, scale: f64) -> Matrix {
        let rad = angle_deg.to_radians();
        let alpha = scale * rad.cos();
        let beta = scale * rad.sin();
        let m = Matrix::new(2, 3, MatType::F64C1);
        let row0 = [
            alpha,
            beta,
            (1.0 - alpha) * center.x - beta * center.y,
        ];
        let row1 = [
            -beta,
            alpha,
            beta * center.x + (1.0 - alpha) * center.y,
        ];
        for (x, v) in row0.into_iter().enumerate() {
            let _ = m.set(x as u32, 0, v);
        }
        for (x, v) in row1.into_iter().enumerate() {
            let _ = m.set(x as u32, 1, v);
        }
        m
    }

    pub(crate) fn from_buffer(buf: Arc<PixelBuffer>) -> Matrix {
        let mat_type = buf.mat_type();
        Matrix {
            byte_offset: 0,
            stride: buf.stride(),
            elem_stride: mat_type.pixel_size(),
            width: buf.width(),
            height: buf.height(),
            mat_type,
            buf: Some(buf),
        }
    }
}

// ---------------------------------------------------------------------------
// Shape and lifecycle
// ---------------------------------------------------------------------------

impl Matrix {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Alias of [`height()`](Self::height), matrix-style naming.
    #[inline]
    pub fn rows(&self) -> u32 {
        self.height
    }

    /// Alias of [`width()`](Self::width), matrix-style naming.
    #[inline]
    pub fn cols(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[inline]
    pub fn mat_type(&self) -> MatType {
        self.mat_type
    }

    #[inline]
    pub fn channels(&self) -> u8 {
        self.mat_type.channels()
    }

    #[inline]
    pub fn elem(&self) -> ElemType {
        self.mat_type.elem()
    }

    /// True for released views and zero-area views.
    pub fn empty(&self) -> bool {
        self.buf.is_none() || self.width == 0 || self.height == 0
    }

    /// Drop this view's reference to the shared storage. Idempotent.
    /// Sibling views aliasing the same buffer are unaffected; the storage
    /// itself is freed when the last reference drops. Any later pixel
    /// access through this handle fails with [`Error::UseAfterRelease`].
    pub fn release(&mut self) {
        self.buf = None;
    }

    /// Number of views (including this one) currently sharing the storage.
    pub fn ref_count(&self) -> usize {
        self.buf.as_ref().map_or(0, Arc::strong_count)
    }

    /// Whether `self` and `other` alias the same underlying storage.
    pub fn shares_storage_with(&self, other: &Matrix) -> bool {
        match (&self.buf, &other.buf) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    #[inline]
    pub(crate) fn buffer(&self) -> Result<&Arc<PixelBuffer>, Error> {
        self.buf.as_ref().ok_or(Error::UseAfterRelease)
    }

    #[inline]
    fn elem_size(&self) -> usize {
        self.mat_type.elem().byte_size()
    }

    /// Whether pixels are contiguous within rows (false for channel views).
    #[inline]
    fn packed_pixels(&self) -> bool {
        self.elem_stride == self.mat_type.pixel_size()
    }

    #[inline]
    fn offset_of(&self, x: u32, y: u32) -> usize {
        self.byte_offset + y as usize * self.stride + x as usize * self.elem_stride
    }

    fn check_bounds(&self, x: u32, y: u32, channel: u8) -> Result<(), Error> {
        if x >= self.width || y >= self.height || channel >= self.channels() {
            return Err(Error::OutOfBounds {
                x: x as i64,
                y: y as i64,
                channel,
                width: self.width,
                height: self.height,
                channels: self.channels(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pixel access
// ---------------------------------------------------------------------------

impl Matrix {
    /// Read channel 0 of pixel `(x, y)`.
    pub fn get(&self, x: u32, y: u32) -> Result<f64, Error> {
        self.get_channel(x, y, 0)
    }

    /// Read one channel of pixel `(x, y)`.
    pub fn get_channel(&self, x: u32, y: u32, channel: u8) -> Result<f64, Error> {
        self.check_bounds(x, y, channel)?;
        let buf = self.buffer()?;
        let guard = buf.read_guard();
        let at = self.offset_of(x, y) + channel as usize * self.elem_size();
        Ok(self.mat_type.elem().read(&guard[at..]))
    }

    /// Write channel 0 of pixel `(x, y)`, saturating integer types.
    pub fn set(&self, x: u32, y: u32, value: f64) -> Result<(), Error> {
        self.set_channel(x, y, 0, value)
    }

    /// Write one channel of pixel `(x, y)`.
    pub fn set_channel(&self, x: u32, y: u32, channel: u8, value: f64) -> Result<(), Error> {
        self.check_bounds(x, y, channel)?;
        let buf = self.buffer()?;
        let mut guard = buf.write_guard();
        let at = self.offset_of(x, y) + channel as usize * self.elem_size();
        self.mat_type.elem().write(&mut guard[at..], value);
        Ok(())
    }

    /// All channels of pixel `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> Result<Scalar, Error> {
        self.check_bounds(x, y, 0)?;
        let buf = self.buffer()?;
        let guard = buf.read_guard();
        let base = self.offset_of(x, y);
        let es = self.elem_size();
        let mut out = [0.0; 4];
        for (c, slot) in out.iter_mut().take(self.channels() as usize).enumerate() {
            *slot = self.mat_type.elem().read(&guard[base + c * es..]);
        }
        Ok(Scalar(out))
    }

    /// Write all channels of pixel `(x, y)`.
    pub fn set_pixel(&self, x: u32, y: u32, value: Scalar) -> Result<(), Error> {
        self.check_bounds(x, y, 0)?;
        let buf = self.buffer()?;
        let mut guard = buf.write_guard();
        let base = self.offset_of(x, y);
        let es = self.elem_size();
        for c in 0..self.channels() as usize {
            self.mat_type
                .elem()
                .write(&mut guard[base + c * es..], value.0[c]);
        }
        Ok(())
    }

    /// All channel values of row `y`, interleaved.
    pub fn pixel_row(&self, y: u32) -> Result<Vec<f64>, Error> {
        self.check_bounds(0, y, 0)?;
        let mut out = Vec::with_capacity(self.width as usize * self.channels() as usize);
        for x in 0..self.width {
            let px = self.pixel(x, y)?;
            out.extend_from_slice(&px.0[..self.channels() as usize]);
        }
        Ok(out)
    }

    /// All channel values of column `x`, interleaved.
    pub fn pixel_col(&self, x: u32) -> Result<Vec<f64>, Error> {
        self.check_bounds(x, 0, 0)?;
        let mut out = Vec::with_capacity(self.height as usize * self.channels() as usize);
        for y in 0..self.height {
            let px = self.pixel(x, y)?;
            out.extend_from_slice(&px.0[..self.channels() as usize]);
        }
        Ok(out)
    }

    /// Packed copy of the view's bytes (row padding and channel-view gaps
    /// removed).
    pub fn get_data(&self) -> Result<Vec<u8>, Error> {
        let buf = self.buffer()?;
        let guard = buf.read_guard();
        let ps = self.mat_type.pixel_size();
        let row_bytes = self.width as usize * ps;
        let mut out = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height {
            let row_start = self.byte_offset + y as usize * self.stride;
            if self.packed_pixels() {
                out.extend_from_slice(&guard[row_start..row_start + row_bytes]);
            } else {
                for x in 0..self.width as usize {
                    let at = row_start + x * self.elem_stride;
                    out.extend_from_slice(&guard[at..at + ps]);
                }
            }
        }
        Ok(out)
    }

    /// Overwrite the view with packed bytes. The length must be exactly
    /// the view's packed size.
    pub fn put(&self, data: &[u8]) -> Result<(), Error> {
        let ps = self.mat_type.pixel_size();
        let row_bytes = self.width as usize * ps;
        let required = row_bytes * self.height as usize;
        if data.len() != required {
            return Err(Error::DimensionMismatch {
                op: "put",
                expected: format!("{required} bytes"),
                found: format!("{} bytes", data.len()),
            });
        }
        let buf = self.buffer()?;
        let mut guard = buf.write_guard();
        for y in 0..self.height as usize {
            let src_row = &data[y * row_bytes..(y + 1) * row_bytes];
            let row_start = self.byte_offset + y * self.stride;
            if self.packed_pixels() {
                guard[row_start..row_start + row_bytes].copy_from_slice(src_row);
            } else {
                for x in 0..self.width as usize {
                    let at = row_start + x * self.elem_stride;
                    guard[at..at + ps].copy_from_slice(&src_row[x * ps..(x + 1) * ps]);
                }
            }
        }
        Ok(())
    }

    /// Borrow row `y` as raw bytes without copying (aliasing access).
    /// Unavailable for channel views, whose rows are not contiguous.
    pub fn with_row<R>(&self, y: u32, f: impl FnOnce(&[u8]) -> R) -> Result<R, Error> {
        self.check_bounds(0, y, 0)?;
        if !self.packed_pixels() {
            return Err(Error::DimensionMismatch {
                op: "with_row",
                expected: "contiguous row (not a channel view)".into(),
                found: "channel view".into(),
            });
        }
        let buf = self.buffer()?;
        let guard = buf.read_guard();
        let start = self.byte_offset + y as usize * self.stride;
        let len = self.width as usize * self.mat_type.pixel_size();
        Ok(f(&guard[start..start + len]))
    }

    /// Mutably borrow row `y` as raw bytes without copying (aliasing
    /// access; writes are visible through every sibling view).
    pub fn with_row_mut<R>(&self, y: u32, f: impl FnOnce(&mut [u8]) -> R) -> Result<R, Error> {
        self.check_bounds(0, y, 0)?;
        if !self.packed_pixels() {
            return Err(Error::DimensionMismatch {
                op: "with_row_mut",
                expected: "contiguous row (not a channel view)".into(),
                found: "channel view".into(),
            });
        }
        let buf = self.buffer()?;
        let mut guard = buf.write_guard();
        let start = self.byte_offset + y as usize * self.stride;
        let len = self.width as usize * self.mat_type.pixel_size();
        Ok(f(&mut guard[start..start + len]))
    }
}

// ---------------------------------------------------------------------------
// Aliasing derivations
// ---------------------------------------------------------------------------

impl Matrix {
    /// A second handle to the same view (aliasing derivation, no copy).
    pub fn alias(&self) -> Matrix {
        Matrix {
            buf: self.buf.clone(),
            byte_offset: self.byte_offset,
            stride: self.stride,
            elem_stride: self.elem_stride,
            width: self.width,
            height: self.height,
            mat_type: self.mat_type,
        }
    }

    /// Sub-view of `rect` (aliasing derivation). The result shares storage
    /// with `self`; writes through either handle are visible through both.
    pub fn roi(&self, rect: Rect) -> Result<Matrix, Error> {
        self.buffer()?;
        let fits = rect.x >= 0
            && rect.y >= 0
            && rect.x as i64 + rect.width as i64 <= self.width as i64
            && rect.y as i64 + rect.height as i64 <= self.height as i64;
        if !fits {
            return Err(Error::OutOfBounds {
                x: rect.x as i64,
                y: rect.y as i64,
                channel: 0,
                width: self.width,
                height: self.height,
                channels: self.channels(),
            });
        }
        Ok(Matrix {
            buf: self.buf.clone(),
            byte_offset: self.offset_of(rect.x as u32, rect.y as u32),
            stride: self.stride,
            elem_stride: self.elem_stride,
            width: rect.width,
            height: rect.height,
            mat_type: self.mat_type,
        })
    }

    /// Sub-view by coordinates (aliasing derivation; same as [`roi`](Self::roi)).
    pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> Result<Matrix, Error> {
        self.roi(Rect::new(x as i32, y as i32, width, height))
    }

    /// Single-channel view of channel `c` over the same storage (aliasing
    /// derivation). Writes through the view land in the parent's
    /// interleaved data.
    pub fn channel_view(&self, c: u8) -> Result<Matrix, Error> {
        self.check_bounds(0, 0, c)?;
        Ok(Matrix {
            buf: self.buf.clone(),
            byte_offset: self.byte_offset + c as usize * self.elem_size(),
            stride: self.stride,
            elem_stride: self.elem_stride,
            width: self.width,
            height: self.height,
            mat_type: self.mat_type.with_channels(1)?,
        })
    }

    /// Reinterpret a contiguous view with a different channel count and row
    /// count (aliasing derivation). Fails for non-contiguous views or when
    /// the element count does not divide evenly.
    pub fn reshape(&self, channels: u8, rows: u32) -> Result<Matrix, Error> {
        self.buffer()?;
        let contiguous =
            self.packed_pixels() && self.stride == self.width as usize * self.elem_stride;
        if !contiguous {
            return Err(Error::DimensionMismatch {
                op: "reshape",
                expected: "contiguous view".into(),
                found: "strided sub-view".into(),
            });
        }
        let new_type = self.mat_type.with_channels(channels)?;
        let total_elems = self.width as u64 * self.height as u64 * self.channels() as u64;
        let rows = if rows == 0 { self.height } else { rows };
        let per_row = rows as u64 * channels as u64;
        if per_row == 0 || total_elems % per_row != 0 {
            return Err(Error::DimensionMismatch {
                op: "reshape",
                expected: format!("element count divisible into {rows} rows x {channels} ch"),
                found: format!("{total_elems} elements"),
            });
        }
        let new_cols = (total_elems / per_row) as u32;
        Ok(Matrix {
            buf: self.buf.clone(),
            byte_offset: self.byte_offset,
            stride: new_cols as usize * new_type.pixel_size(),
            elem_stride: new_type.pixel_size(),
            width: new_cols,
            height: rows,
            mat_type: new_type,
        })
    }

    /// Parent-buffer extent and this view's pixel origin within it.
    pub fn locate_roi(&self) -> Result<(Size, Point), Error> {
        let buf = self.buffer()?;
        let y0 = self.byte_offset / buf.stride().max(1);
        let rem = self.byte_offset - y0 * buf.stride().max(1);
        let x0 = rem / buf.mat_type().pixel_size().max(1);
        Ok((
            Size::new(buf.width(), buf.height()),
            Point::new(x0 as i32, y0 as i32),
        ))
    }

    /// Grow or shrink the view in place by per-edge deltas (positive
    /// grows). The adjusted view must stay inside the parent buffer.
    pub fn adjust_roi(
        &mut self,
        dtop: i32,
        dbottom: i32,
        dleft: i32,
        dright: i32,
    ) -> Result<(), Error> {
        let (extent, origin) = self.locate_roi()?;
        let x0 = origin.x as i64 - dleft as i64;
        let y0 = origin.y as i64 - dtop as i64;
        let x1 = origin.x as i64 + self.width as i64 + dright as i64;
        let y1 = origin.y as i64 + self.height as i64 + dbottom as i64;
        if x0 < 0 || y0 < 0 || x1 > extent.width as i64 || y1 > extent.height as i64 || x0 >= x1
            || y0 >= y1
        {
            return Err(Error::OutOfBounds {
                x: x0,
                y: y0,
                channel: 0,
                width: extent.width,
                height: extent.height,
                channels: self.channels(),
            });
        }
        let new_offset = {
            let buf = self.buffer()?;
            let channel_byte =
                self.byte_offset - buf.offset_of(origin.x as u32, origin.y as u32);
            buf.offset_of(x0 as u32, y0 as u32) + channel_byte
        };
        self.byte_offset = new_offset;
        self.width = (x1 - x0) as u32;
        self.height = (y1 - y0) as u32;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Copying derivations
// ---------------------------------------------------------------------------

/// Deep copy (copying derivation): allocates independent storage. Use
/// [`Matrix::alias`] for a shared-storage handle.
impl Clone for Matrix {
    fn clone(&self) -> Matrix {
        match self.get_data() {
            Ok(data) => Matrix::from_data(self.height, self.width, self.mat_type, data)
                .unwrap_or_else(|_| Matrix::new(self.height, self.width, self.mat_type)),
            // Cloning a released view yields another released view.
            Err(_) => Matrix {
                buf: None,
                byte_offset: 0,
                stride: 0,
                elem_stride: self.mat_type.pixel_size(),
                width: self.width,
                height: self.height,
                mat_type: self.mat_type,
            },
        }
    }
}

impl Matrix {
    /// Copy this view's pixels into `dst` at `(dst_x, dst_y)`, clipping to
    /// `dst`'s extent. Types must match.
    pub fn copy_to(&self, dst: &Matrix, dst_x: u32, dst_y: u32) -> Result<(), Error> {
        if dst.mat_type != self.mat_type {
            return Err(Error::shape_mismatch(
                "copy_to",
                (self.width, self.height, self.mat_type),
                (dst.width, dst.height, dst.mat_type),
            ));
        }
        let w = self.width.min(dst.width.saturating_sub(dst_x));
        let h = self.height.min(dst.height.saturating_sub(dst_y));
        if w == 0 || h == 0 {
            return Ok(());
        }
        let src = self.crop(0, 0, w, h)?.get_data()?;
        dst.crop(dst_x, dst_y, w, h)?.put(&src)
    }

    /// Per-element conversion `v * alpha + beta` into a new matrix of the
    /// given element type (copying derivation). Channel count is preserved.
    pub fn convert_to(&self, elem: ElemType, alpha: f64, beta: f64) -> Result<Matrix, Error> {
        let out_type = MatType::new(elem, self.channels())?;
        let out = Matrix::new(self.height, self.width, out_type);
        let values = self.read_values()?;
        out.store_values("convert_to", &values, |v| v * alpha + beta, None)?;
        Ok(out)
    }

    /// Split interleaved channels into per-channel matrices (copying
    /// derivation — each result owns its storage).
    pub fn split(&self) -> Result<Vec<Matrix>, Error> {
        let mut out = Vec::with_capacity(self.channels() as usize);
        for c in 0..self.channels() {
            out.push(self.channel_view(c)?.clone());
        }
        Ok(out)
    }

    /// Interleave single-channel matrices into this matrix in place.
    pub fn merge(&self, channels: &[Matrix]) -> Result<(), Error> {
        if channels.len() != self.channels() as usize {
            return Err(Error::DimensionMismatch {
                op: "merge",
                expected: format!("{} channel planes", self.channels()),
                found: format!("{} planes", channels.len()),
            });
        }
        for (c, plane) in channels.iter().enumerate() {
            let expected = MatType::new(self.elem(), 1)?;
            if plane.mat_type != expected || plane.size() != self.size() {
                return Err(Error::shape_mismatch(
                    "merge",
                    (self.width, self.height, expected),
                    (plane.width, plane.height, plane.mat_type),
                ));
            }
            let data = plane.get_data()?;
            self.channel_view(c as u8)?.put(&data)?;
        }
        Ok(())
    }

    /// Mirrored copy (copying derivation).
    pub fn flip(&self, code: FlipCode) -> Result<Matrix, Error> {
        let out = Matrix::new(self.height, self.width, self.mat_type);
        for y in 0..self.height {
            for x in 0..self.width {
                let (sx, sy) = match code {
                    FlipCode::Vertical => (x, self.height - 1 - y),
                    FlipCode::Horizontal => (self.width - 1 - x, y),
                    FlipCode::Both => (self.width - 1 - x, self.height - 1 - y),
                };
                out.set_pixel(x, y, self.pixel(sx, sy)?)?;
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Element-wise helpers (crate-internal)
// ---------------------------------------------------------------------------

impl Matrix {
    /// All channel values of the view as f64, row-major interleaved.
    pub(crate) fn read_values(&self) -> Result<Vec<f64>, Error> {
        let data = self.get_data()?;
        let elem = self.mat_type.elem();
        let es = elem.byte_size();
        Ok(data.chunks_exact(es).map(|c| elem.read(c)).collect())
    }

    /// Write `f(values[i])` for every element, honoring an optional
    /// single-channel mask (non-zero = write). `values` length must match
    /// the element count of the view.
    pub(crate) fn store_values(
        &self,
        op: &'static str,
        values: &[f64],
        f: impl Fn(f64) -> f64,
        mask: Option<&Matrix>,
    ) -> Result<(), Error> {
        let ch = self.channels() as usize;
        let expected = self.width as usize * self.height as usize * ch;
        if values.len() != expected {
            return Err(Error::DimensionMismatch {
                op,
                expected: format!("{expected} elements"),
                found: format!("{} elements", values.len()),
            });
        }
        let mask_vals = self.validated_mask(op, mask)?;
        let elem = self.mat_type.elem();
        let es = elem.byte_size();
        let mut packed = self.get_data()?;
        for (px, chunk) in packed
            .chunks_exact_mut(self.mat_type.pixel_size())
            .enumerate()
        {
            if let Some(mask_vals) = &mask_vals {
                if mask_vals[px] == 0.0 {
                    continue;
                }
            }
            for c in 0..ch {
                elem.write(&mut chunk[c * es..], f(values[px * ch + c]));
            }
        }
        self.put(&packed)
    }

    /// Validate an optional mask: single channel, same size. Returns its
    /// values when present.
    fn validated_mask(
        &self,
        op: &'static str,
        mask: Option<&Matrix>,
    ) -> Result<Option<Vec<f64>>, Error> {
        match mask {
            None => Ok(None),
            Some(m) => {
                if m.channels() != 1 || m.size() != self.size() {
                    return Err(Error::shape_mismatch(
                        op,
                        (self.width, self.height, MatType::U8C1),
                        (m.width, m.height, m.mat_type),
                    ));
                }
                Ok(Some(m.read_values()?))
            }
        }
    }

    fn check_same_shape(&self, op: &'static str, other: &Matrix) -> Result<(), Error> {
        if other.size() != self.size() || other.mat_type != self.mat_type {
            return Err(Error::shape_mismatch(
                op,
                (self.width, self.height, self.mat_type),
                (other.width, other.height, other.mat_type),
            ));
        }
        Ok(())
    }

    /// `self[i] = f(a[i], b[i])` under an optional mask. All three views
    /// must share size and type; validation happens before any write, so a
    /// failed call leaves every operand untouched.
    fn zip_store(
        &self,
        op: &'static str,
        a: &Matrix,
        b: &Matrix,
        mask: Option<&Matrix>,
        f: impl Fn(f64, f64) -> f64,
    ) -> Result<(), Error> {
        self.check_same_shape(op, a)?;
        self.check_same_shape(op, b)?;
        let mask_vals = self.validated_mask(op, mask)?;
        let av = a.read_values()?;
        let bv = b.read_values()?;
        let elem = self.mat_type.elem();
        let es = elem.byte_size();
        let ch = self.channels() as usize;
        let mut packed = self.get_data()?;
        for (px, chunk) in packed
            .chunks_exact_mut(self.mat_type.pixel_size())
            .enumerate()
        {
            if let Some(mask_vals) = &mask_vals {
                if mask_vals[px] == 0.0 {
                    continue;
                }
            }
            for c in 0..ch {
                let i = px * ch + c;
                elem.write(&mut chunk[c * es..], f(av[i], bv[i]));
            }
        }
        self.put(&packed)
    }

    /// Byte-level binary op for bitwise operations (exact for every
    /// integer width in little-endian storage).
    fn zip_store_bytes(
        &self,
        op: &'static str,
        a: &Matrix,
        b: Option<&Matrix>,
        mask: Option<&Matrix>,
        f: impl Fn(u8, u8) -> u8,
    ) -> Result<(), Error> {
        if !self.elem().is_integer() {
            return Err(Error::DimensionMismatch {
                op,
                expected: "integer element type".into(),
                found: format!("{:?}", self.elem()),
            });
        }
        self.check_same_shape(op, a)?;
        if let Some(b) = b {
            self.check_same_shape(op, b)?;
        }
        let mask_vals = self.validated_mask(op, mask)?;
        let ab = a.get_data()?;
        let bb = match b {
            Some(b) => b.get_data()?,
            None => vec![0u8; ab.len()],
        };
        let ps = self.mat_type.pixel_size();
        let mut packed = self.get_data()?;
        for (px, chunk) in packed.chunks_exact_mut(ps).enumerate() {
            if let Some(mask_vals) = &mask_vals {
                if mask_vals[px] == 0.0 {
                    continue;
                }
            }
            for (i, byte) in chunk.iter_mut().enumerate() {
                let at = px * ps + i;
                *byte = f(ab[at], bb[at]);
            }
        }
        self.put(&packed)
    }
}

// ---------------------------------------------------------------------------
// In-place arithmetic / logic / statistics
// ---------------------------------------------------------------------------

impl Matrix {
    /// Fill every pixel (optionally under a mask) with `value`.
    pub fn set_to(&self, value: Scalar, mask: Option<&Matrix>) -> Result<(), Error> {
        let mask_vals = self.validated_mask("set_to", mask)?;
        let elem = self.mat_type.elem();
        let es = elem.byte_size();
        let ch = self.channels() as usize;
        let mut packed = self.get_data()?;
        for (px, chunk) in packed
            .chunks_exact_mut(self.mat_type.pixel_size())
            .enumerate()
        {
            if let Some(mask_vals) = &mask_vals {
                if mask_vals[px] == 0.0 {
                    continue;
                }
            }
            for c in 0..ch {
                elem.write(&mut chunk[c * es..], value.0[c]);
            }
        }
        self.put(&packed)
    }

    /// `self = src1 * alpha + src2 * beta + gamma`, saturating.
    pub fn add_weighted(
        &self,
        src1: &Matrix,
        alpha: f64,
        src2: &Matrix,
        beta: f64,
        gamma: f64,
    ) -> Result<(), Error> {
        self.zip_store("add_weighted", src1, src2, None, |a, b| {
            a * alpha + b * beta + gamma
        })
    }

    /// `self -= other`, saturating.
    pub fn subtract(&self, other: &Matrix) -> Result<(), Error> {
        self.check_same_shape("subtract", other)?;
        let ov = other.read_values()?;
        let sv = self.read_values()?;
        let diff: Vec<f64> = sv.iter().zip(&ov).map(|(s, o)| s - o).collect();
        self.store_values("subtract", &diff, |v| v, None)
    }

    /// `self = |src1 - src2|`, saturating.
    pub fn abs_diff(&self, src1: &Matrix, src2: &Matrix) -> Result<(), Error> {
        self.zip_store("abs_diff", src1, src2, None, |a, b| (a - b).abs())
    }

    /// `self = src1 & src2` (integer types only).
    pub fn bitwise_and(
        &self,
        src1: &Matrix,
        src2: &Matrix,
        mask: Option<&Matrix>,
    ) -> Result<(), Error> {
        self.zip_store_bytes("bitwise_and", src1, Some(src2), mask, |a, b| a & b)
    }

    /// `self = src1 | src2` (integer types only).
    pub fn bitwise_or(
        &self,
        src1: &Matrix,
        src2: &Matrix,
        mask: Option<&Matrix>,
    ) -> Result<(), Error> {
        self.zip_store_bytes("bitwise_or", src1, Some(src2), mask, |a, b| a | b)
    }

    /// `self = src1 ^ src2` (integer types only).
    pub fn bitwise_xor(
        &self,
        src1: &Matrix,
        src2: &Matrix,
        mask: Option<&Matrix>,
    ) -> Result<(), Error> {
        self.zip_store_bytes("bitwise_xor", src1, Some(src2), mask, |a, b| a ^ b)
    }

    /// `self = !src` (integer types only).
    pub fn bitwise_not(&self, src: &Matrix, mask: Option<&Matrix>) -> Result<(), Error> {
        self.zip_store_bytes("bitwise_not", src, None, mask, |a, _| !a)
    }

    /// Number of pixels with at least one non-zero channel.
    pub fn count_non_zero(&self) -> Result<u64, Error> {
        let values = self.read_values()?;
        let ch = self.channels() as usize;
        Ok(values
            .chunks_exact(ch)
            .filter(|px| px.iter().any(|&v| v != 0.0))
            .count() as u64)
    }

    /// Per-channel mean, optionally under a single-channel mask.
    pub fn mean(&self, mask: Option<&Matrix>) -> Result<Scalar, Error> {
        let mask_vals = self.validated_mask("mean", mask)?;
        let values = self.read_values()?;
        let ch = self.channels() as usize;
        let mut sums = [0.0f64; 4];
        let mut count = 0u64;
        for (px, chunk) in values.chunks_exact(ch).enumerate() {
            if let Some(mask_vals) = &mask_vals {
                if mask_vals[px] == 0.0 {
                    continue;
                }
            }
            count += 1;
            for (c, v) in chunk.iter().enumerate() {
                sums[c] += v;
            }
        }
        if count == 0 {
            return Ok(Scalar::default());
        }
        for s in &mut sums {
            *s /= count as f64;
        }
        Ok(Scalar(sums))
    }

    /// Minimum and maximum value with their locations. Single-channel only.
    pub fn min_max_loc(&self) -> Result<MinMaxLoc, Error> {
        if self.channels() != 1 {
            return Err(Error::DimensionMismatch {
                op: "min_max_loc",
                expected: "single channel".into(),
                found: format!("{} channels", self.channels()),
            });
        }
        let values = self.read_values()?;
        if values.is_empty() {
            return Err(Error::DimensionMismatch {
                op: "min_max_loc",
                expected: "non-empty matrix".into(),
                found: "0 elements".into(),
            });
        }
        let mut out = MinMaxLoc {
            min_val: f64::INFINITY,
            max_val: f64::NEG_INFINITY,
            min_loc: Point::default(),
            max_loc: Point::default(),
        };
        for (i, &v) in values.iter().enumerate() {
            let p = Point::new((i as u32 % self.width) as i32, (i as u32 / self.width) as i32);
            if v < out.min_val {
                out.min_val = v;
                out.min_loc = p;
            }
            if v > out.max_val {
                out.max_val = v;
                out.max_loc = p;
            }
        }
        Ok(out)
    }

    /// Intensity moments of a single-channel view.
    pub fn moments(&self) -> Result<Moments, Error> {
        if self.channels() != 1 {
            return Err(Error::DimensionMismatch {
                op: "moments",
                expected: "single channel".into(),
                found: format!("{} channels", self.channels()),
            });
        }
        let values = self.read_values()?;
        let mut m = Moments::default();
        for (i, &v) in values.iter().enumerate() {
            let x = (i as u32 % self.width) as f64;
            let y = (i as u32 / self.width) as f64;
            m.m00 += v;
            m.m10 += x * v;
            m.m01 += y * v;
            m.m20 += x * x * v;
            m.m11 += x * y * v;
            m.m02 += y * y * v;
            m.m30 += x * x * x * v;
            m.m21 += x * x * y * v;
            m.m12 += x * y * y * v;
            m.m03 += y * y * y * v;
        }
        if m.m00 != 0.0 {
            let cx = m.m10 / m.m00;
            let cy = m.m01 / m.m00;
            m.mu20 = m.m20 - cx * m.m10;
            m.mu11 = m.m11 - cx * m.m01;
            m.mu02 = m.m02 - cy * m.m01;
            m.mu30 = m.m30 - 3.0 * cx * m.m20 + 2.0 * cx * cx * m.m10;
            m.mu21 = m.m21 - 2.0 * cx * m.m11 - cy * m.m20 + 2.0 * cx * cx * m.m01;
            m.mu12 = m.m12 - 2.0 * cy * m.m11 - cx * m.m02 + 2.0 * cy * cy * m.m10;
            m.mu03 = m.m03 - 3.0 * cy * m.m02 + 2.0 * cy * cy * m.m01;
            let n2 = m.m00 * m.m00;
            let n3 = n2 * m.m00.sqrt();
            m.nu20 = m.mu20 / n2;
            m.nu11 = m.mu11 / n2;
            m.nu02 = m.mu02 / n2;
            m.nu30 = m.mu30 / n3;
            m.nu21 = m.mu21 / n3;
            m.nu12 = m.mu12 / n3;
            m.nu03 = m.mu03 / n3;
        }
        Ok(m)
    }
}

// ---------------------------------------------------------------------------
// Painter (crate-internal raster access)
// ---------------------------------------------------------------------------

/// Write access for drawing primitives: one lock held for the whole
/// primitive, every plot clipped to the view extent.
pub(crate) struct Painter<'a> {
    guard: std::sync::RwLockWriteGuard<'a, Vec<u8>>,
    byte_offset: usize,
    stride: usize,
    elem_stride: usize,
    width: i64,
    height: i64,
    mat_type: MatType,
}

impl Painter<'_> {
    /// Write `color` at `(x, y)` if inside the view; silently drop it
    /// otherwise.
    pub(crate) fn plot(&mut self, x: i64, y: i64, color: Scalar) {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return;
        }
        let elem = self.mat_type.elem();
        let es = elem.byte_size();
        let base = self.byte_offset + y as usize * self.stride + x as usize * self.elem_stride;
        for c in 0..self.mat_type.channels() as usize {
            elem.write(&mut self.guard[base + c * es..], color.0[c]);
        }
    }

    #[inline]
    pub(crate) fn width(&self) -> i64 {
        self.width
    }

    #[inline]
    pub(crate) fn height(&self) -> i64 {
        self.height
    }
}

impl Matrix {
    /// Run a drawing primitive with the storage locked once.
    pub(crate) fn paint<R>(&self, f: impl FnOnce(&mut Painter<'_>) -> R) -> Result<R, Error> {
        let buf = self.buffer()?;
        let mut painter = Painter {
            guard: buf.write_guard(),
            byte_offset: self.byte_offset,
            stride: self.stride,
            elem_stride: self.elem_stride,
            width: self.width as i64,
            height: self.height as i64,
            mat_type: self.mat_type,
        };
        Ok(f(&mut painter))
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.buf.is_none() {
            return write!(f, "Matrix(released)");
        }
        write!(
            f,
            "Matrix({}x{}, {:?} c{})",
            self.width,
            self.height,
            self.elem(),
            self.channels()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{ElemType, MatType};

    fn u8c3() -> MatType {
        MatType::new(ElemType::U8, 3).unwrap()
    }

    #[test]
    fn zeros_count_non_zero_is_zero() {
        for t in [
            MatType::U8C1,
            u8c3(),
            MatType::new(ElemType::F32, 2).unwrap(),
        ] {
            let m = Matrix::zeros(5, 4, t);
            assert_eq!(m.count_non_zero().unwrap(), 0);
        }
    }

    #[test]
    fn ones_reads_one_in_every_channel() {
        let m = Matrix::ones(3, 3, u8c3());
        for y in 0..3 {
            for x in 0..3 {
                assert_eq!(m.pixel(x, y).unwrap().0[..3], [1.0, 1.0, 1.0]);
            }
        }
    }

    #[test]
    fn eye_has_diagonal_ones() {
        let m = Matrix::eye(3, 3, MatType::U8C1);
        assert_eq!(m.get(0, 0).unwrap(), 1.0);
        assert_eq!(m.get(1, 1).unwrap(), 1.0);
        assert_eq!(m.get(1, 0).unwrap(), 0.0);
        assert_eq!(m.count_non_zero().unwrap(), 3);
    }

    #[test]
    fn rotation_matrix_identity_at_zero_angle() {
        let m = Matrix::rotation_matrix_2d(0.0, Point2f::new(0.0, 0.0), 1.0);
        assert_eq!(m.size(), Size::new(3, 2));
        assert!((m.get(0, 0).unwrap() - 1.0).abs() < 1e-12);
        assert!((m.get(1, 1).unwrap() - 1.0).abs() < 1e-12);
        assert!(m.get(2, 0).unwrap().abs() < 1e-12);
    }

    #[test]
    fn get_set_bounds_checked() {
        let m = Matrix::new(4, 4, MatType::U8C1);
        assert!(m.set(3, 3, 9.0).is_ok());
        assert!(matches!(m.get(4, 0), Err(Error::OutOfBounds { .. })));
        assert!(matches!(m.set(0, 4, 1.0), Err(Error::OutOfBounds { .. })));
        assert!(matches!(
            m.get_channel(0, 0, 1),
            Err(Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn roi_aliases_storage() {
        let m = Matrix::zeros(4, 4, MatType::U8C1);
        let view = m.roi(Rect::new(1, 1, 2, 2)).unwrap();
        view.set(0, 0, 200.0).unwrap();
        assert_eq!(m.get(1, 1).unwrap(), 200.0);
        m.set(2, 2, 40.0).unwrap();
        assert_eq!(view.get(1, 1).unwrap(), 40.0);
        assert!(view.shares_storage_with(&m));
    }

    #[test]
    fn roi_out_of_extent_fails() {
        let m = Matrix::zeros(4, 4, MatType::U8C1);
        assert!(m.roi(Rect::new(2, 2, 3, 3)).is_err());
        assert!(m.roi(Rect::new(-1, 0, 2, 2)).is_err());
    }

    #[test]
    fn clone_is_independent() {
        let m = Matrix::zeros(3, 3, MatType::U8C1);
        let c = m.clone();
        c.set(1, 1, 77.0).unwrap();
        assert_eq!(m.get(1, 1).unwrap(), 0.0);
        assert!(!c.shares_storage_with(&m));
    }

    #[test]
    fn channel_view_aliases_parent() {
        let m = Matrix::zeros(2, 2, u8c3());
        let green = m.channel_view(1).unwrap();
        assert_eq!(green.channels(), 1);
        green.set(1, 0, 99.0).unwrap();
        assert_eq!(m.pixel(1, 0).unwrap().0[..3], [0.0, 99.0, 0.0]);
    }

    #[test]
    fn release_is_idempotent_and_detected() {
        let m = Matrix::zeros(2, 2, MatType::U8C1);
        let sibling = m.alias();
        let mut view = m.roi(Rect::new(0, 0, 1, 1)).unwrap();
        view.release();
        view.release();
        assert!(matches!(view.get(0, 0), Err(Error::UseAfterRelease)));
        // Siblings keep working.
        assert!(sibling.get(1, 1).is_ok());
        assert!(m.get(0, 0).is_ok());
    }

    #[test]
    fn add_weighted_mismatch_leaves_operands_untouched() {
        let dst = Matrix::zeros(2, 2, MatType::U8C1);
        let a = Matrix::ones(2, 2, MatType::U8C1);
        let b = Matrix::ones(2, 2, u8c3());
        let err = dst.add_weighted(&a, 0.5, &b, 0.5, 0.0);
        assert!(matches!(err, Err(Error::DimensionMismatch { .. })));
        assert_eq!(dst.count_non_zero().unwrap(), 0);
        assert_eq!(a.count_non_zero().unwrap(), 4);
    }

    #[test]
    fn add_weighted_computes_and_saturates() {
        let a = Matrix::new_with_scalar(1, 2, MatType::U8C1, Scalar::all(200.0)).unwrap();
        let b = Matrix::new_with_scalar(1, 2, MatType::U8C1, Scalar::all(100.0)).unwrap();
        let dst = Matrix::zeros(1, 2, MatType::U8C1);
        dst.add_weighted(&a, 1.0, &b, 1.0, 0.0).unwrap();
        assert_eq!(dst.get(0, 0).unwrap(), 255.0); // saturated
        dst.add_weighted(&a, 0.5, &b, 0.5, 0.0).unwrap();
        assert_eq!(dst.get(1, 0).unwrap(), 150.0);
    }

    #[test]
    fn bitwise_ops_and_mask() {
        let a = Matrix::new_with_scalar(1, 2, MatType::U8C1, Scalar::all(0b1100 as f64)).unwrap();
        let b = Matrix::new_with_scalar(1, 2, MatType::U8C1, Scalar::all(0b1010 as f64)).unwrap();
        let dst = Matrix::zeros(1, 2, MatType::U8C1);
        dst.bitwise_and(&a, &b, None).unwrap();
        assert_eq!(dst.get(0, 0).unwrap(), 0b1000 as f64);
        dst.bitwise_xor(&a, &b, None).unwrap();
        assert_eq!(dst.get(1, 0).unwrap(), 0b0110 as f64);

        // Masked: only the first pixel is written.
        let mask = Matrix::zeros(1, 2, MatType::U8C1);
        mask.set(0, 0, 1.0).unwrap();
        let dst2 = Matrix::zeros(1, 2, MatType::U8C1);
        dst2.bitwise_or(&a, &b, Some(&mask)).unwrap();
        assert_eq!(dst2.get(0, 0).unwrap(), 0b1110 as f64);
        assert_eq!(dst2.get(1, 0).unwrap(), 0.0);
    }

    #[test]
    fn bitwise_rejects_float_types() {
        let a = Matrix::zeros(1, 1, MatType::new(ElemType::F32, 1).unwrap());
        let dst = Matrix::zeros(1, 1, MatType::new(ElemType::F32, 1).unwrap());
        assert!(matches!(
            dst.bitwise_not(&a, None),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn bitwise_mask_must_be_single_channel() {
        let a = Matrix::zeros(2, 2, MatType::U8C1);
        let dst = Matrix::zeros(2, 2, MatType::U8C1);
        let bad_mask = Matrix::zeros(2, 2, u8c3());
        assert!(matches!(
            dst.bitwise_and(&a, &a, Some(&bad_mask)),
            Err(Error::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn bitwise_and_channel_mismatch_leaves_operands_untouched() {
        let a = Matrix::ones(2, 2, MatType::U8C1);
        let b = Matrix::ones(2, 2, u8c3());
        let dst = Matrix::zeros(2, 2, MatType::U8C1);
        assert!(matches!(
            dst.bitwise_and(&a, &b, None),
            Err(Error::DimensionMismatch { .. })
        ));
        assert_eq!(dst.count_non_zero().unwrap(), 0);
        assert_eq!(a.count_non_zero().unwrap(), 4);
        assert_eq!(b.count_non_zero().unwrap(), 4);
    }

    #[test]
    fn subtract_saturates_at_zero() {
        let a = Matrix::new_with_scalar(1, 1, MatType::U8C1, Scalar::all(10.0)).unwrap();
        let b = Matrix::new_with_scalar(1, 1, MatType::U8C1, Scalar::all(30.0)).unwrap();
        a.subtract(&b).unwrap();
        assert_eq!(a.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn abs_diff_symmetric() {
        let a = Matrix::new_with_scalar(1, 1, MatType::U8C1, Scalar::all(10.0)).unwrap();
        let b = Matrix::new_with_scalar(1, 1, MatType::U8C1, Scalar::all(30.0)).unwrap();
        let dst = Matrix::zeros(1, 1, MatType::U8C1);
        dst.abs_diff(&a, &b).unwrap();
        assert_eq!(dst.get(0, 0).unwrap(), 20.0);
        dst.abs_diff(&b, &a).unwrap();
        assert_eq!(dst.get(0, 0).unwrap(), 20.0);
    }

    #[test]
    fn convert_to_scales_and_changes_type() {
        let m = Matrix::new_with_scalar(2, 2, MatType::U8C1, Scalar::all(100.0)).unwrap();
        let f = m.convert_to(ElemType::F32, 0.5, 1.0).unwrap();
        assert_eq!(f.elem(), ElemType::F32);
        assert_eq!(f.get(0, 0).unwrap(), 51.0);
        // Source untouched (copying derivation).
        assert_eq!(m.get(0, 0).unwrap(), 100.0);
    }

    #[test]
    fn split_then_merge_roundtrip() {
        let m = Matrix::zeros(2, 2, u8c3());
        m.set_pixel(0, 0, Scalar::new(10.0, 20.0, 30.0, 0.0)).unwrap();
        m.set_pixel(1, 1, Scalar::new(1.0, 2.0, 3.0, 0.0)).unwrap();
        let planes = m.split().unwrap();
        assert_eq!(planes.len(), 3);
        assert_eq!(planes[1].get(0, 0).unwrap(), 20.0);
        // Mutating a plane does not touch the source (copying derivation).
        planes[0].set(0, 0, 99.0).unwrap();
        assert_eq!(m.pixel(0, 0).unwrap().0[0], 10.0);

        let dst = Matrix::zeros(2, 2, u8c3());
        dst.merge(&planes).unwrap();
        assert_eq!(dst.pixel(1, 1).unwrap().0[..3], [1.0, 2.0, 3.0]);
    }

    #[test]
    fn reshape_requires_contiguous_view() {
        let m = Matrix::zeros(4, 4, MatType::U8C1);
        let sub = m.roi(Rect::new(1, 1, 2, 2)).unwrap();
        assert!(sub.reshape(1, 1).is_err());
        let flat = m.reshape(1, 1).unwrap();
        assert_eq!(flat.size(), Size::new(16, 1));
        // Still aliasing.
        flat.set(5, 0, 7.0).unwrap();
        assert_eq!(m.get(1, 1).unwrap(), 7.0);
    }

    #[test]
    fn reshape_changes_channels() {
        let m = Matrix::zeros(2, 6, MatType::U8C1);
        let rgb = m.reshape(3, 2).unwrap();
        assert_eq!(rgb.channels(), 3);
        assert_eq!(rgb.size(), Size::new(2, 2));
    }

    #[test]
    fn locate_and_adjust_roi() {
        let m = Matrix::zeros(6, 6, MatType::U8C1);
        let mut sub = m.crop(2, 1, 3, 2).unwrap();
        let (extent, origin) = sub.locate_roi().unwrap();
        assert_eq!(extent, Size::new(6, 6));
        assert_eq!(origin, Point::new(2, 1));

        sub.adjust_roi(1, 0, 1, 0).unwrap();
        let (_, origin) = sub.locate_roi().unwrap();
        assert_eq!(origin, Point::new(1, 0));
        assert_eq!(sub.size(), Size::new(4, 3));

        // Growing past the parent fails and leaves the view unchanged.
        assert!(sub.adjust_roi(5, 0, 0, 0).is_err());
        assert_eq!(sub.size(), Size::new(4, 3));
    }

    #[test]
    fn copy_to_clips_to_destination() {
        let src = Matrix::ones(2, 2, MatType::U8C1);
        let dst = Matrix::zeros(3, 3, MatType::U8C1);
        src.copy_to(&dst, 2, 2).unwrap();
        assert_eq!(dst.count_non_zero().unwrap(), 1);
        assert_eq!(dst.get(2, 2).unwrap(), 1.0);
    }

    #[test]
    fn flip_both_axes() {
        let m = Matrix::zeros(2, 2, MatType::U8C1);
        m.set(0, 0, 9.0).unwrap();
        let f = m.flip(FlipCode::Both).unwrap();
        assert_eq!(f.get(1, 1).unwrap(), 9.0);
        assert_eq!(f.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn min_max_loc_finds_extremes() {
        let m = Matrix::zeros(3, 3, MatType::U8C1);
        m.set(2, 1, 200.0).unwrap();
        let mm = m.min_max_loc().unwrap();
        assert_eq!(mm.max_val, 200.0);
        assert_eq!(mm.max_loc, Point::new(2, 1));
        assert_eq!(mm.min_val, 0.0);
    }

    #[test]
    fn mean_with_mask() {
        let m = Matrix::zeros(1, 2, MatType::U8C1);
        m.set(0, 0, 10.0).unwrap();
        m.set(1, 0, 30.0).unwrap();
        assert_eq!(m.mean(None).unwrap().0[0], 20.0);
        let mask = Matrix::zeros(1, 2, MatType::U8C1);
        mask.set(1, 0, 255.0).unwrap();
        assert_eq!(m.mean(Some(&mask)).unwrap().0[0], 30.0);
    }

    #[test]
    fn moments_centroid_of_single_pixel() {
        let m = Matrix::zeros(5, 5, MatType::U8C1);
        m.set(3, 2, 10.0).unwrap();
        let mo = m.moments().unwrap();
        assert_eq!(mo.m00, 10.0);
        assert_eq!(mo.m10 / mo.m00, 3.0);
        assert_eq!(mo.m01 / mo.m00, 2.0);
    }

    #[test]
    fn get_data_and_put_roundtrip_through_subview() {
        let m = Matrix::zeros(4, 4, MatType::U8C1);
        let sub = m.crop(1, 1, 2, 2).unwrap();
        sub.put(&[1, 2, 3, 4]).unwrap();
        assert_eq!(sub.get_data().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(m.get(1, 1).unwrap(), 1.0);
        assert_eq!(m.get(2, 2).unwrap(), 4.0);
        // Pixels outside the sub-view stay untouched.
        assert_eq!(m.get(0, 0).unwrap(), 0.0);
        assert_eq!(m.count_non_zero().unwrap(), 4);
    }

    #[test]
    fn with_row_mut_writes_through() {
        let m = Matrix::zeros(2, 3, MatType::U8C1);
        m.with_row_mut(1, |row| row.copy_from_slice(&[7, 8, 9])).unwrap();
        assert_eq!(m.get(2, 1).unwrap(), 9.0);
        let sum: u32 = m.with_row(1, |row| row.iter().map(|&b| b as u32).sum()).unwrap();
        assert_eq!(sum, 24);
    }

    #[test]
    fn pixel_row_and_col() {
        let m = Matrix::zeros(2, 2, MatType::U8C1);
        m.set(0, 1, 5.0).unwrap();
        assert_eq!(m.pixel_row(1).unwrap(), vec![5.0, 0.0]);
        assert_eq!(m.pixel_col(0).unwrap(), vec![0.0, 5.0]);
    }
}
