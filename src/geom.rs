//! Small geometric value types shared across the crate.

use serde::{Deserialize, Serialize};

/// Integer 2D point (pixel coordinates).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Dot product treating both points as vectors from the origin.
    pub fn dot(self, other: Point) -> i64 {
        self.x as i64 * other.x as i64 + self.y as i64 * other.y as i64
    }

    /// Z component of the cross product of `self` and `other`.
    pub fn cross(self, other: Point) -> i64 {
        self.x as i64 * other.y as i64 - self.y as i64 * other.x as i64
    }
}

/// Floating-point 2D point, used where sub-pixel precision matters
/// (ellipse fits, rotated rectangles).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2f {
    pub x: f64,
    pub y: f64,
}

impl Point2f {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width/height pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_points(a: Point, b: Point) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self {
            x,
            y,
            width: (a.x.max(b.x) - x) as u32,
            height: (a.y.max(b.y) - y) as u32,
        }
    }

    /// Top-left corner.
    pub fn tl(self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Bottom-right corner (exclusive).
    pub fn br(self) -> Point {
        Point::new(self.x + self.width as i32, self.y + self.height as i32)
    }

    pub fn size(self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn area(self) -> u64 {
        self.size().area()
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(self, other: Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.br().x <= self.br().x
            && other.br().y <= self.br().y
    }

    /// Whether the point lies inside the rectangle (right/bottom exclusive).
    pub fn contains_point(self, p: Point) -> bool {
        p.x >= self.x && p.y >= self.y && p.x < self.br().x && p.y < self.br().y
    }
}

/// Rotated rectangle returned by minimum-area-rectangle queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotatedRect {
    pub center: Point2f,
    pub size: (f64, f64),
    /// Rotation in degrees, counterclockwise.
    pub angle: f64,
}

impl RotatedRect {
    /// The four corners, in order around the rectangle.
    pub fn points(&self) -> [Point2f; 4] {
        let (w, h) = (self.size.0 / 2.0, self.size.1 / 2.0);
        let rad = self.angle.to_radians();
        let (s, c) = rad.sin_cos();
        let corner = |dx: f64, dy: f64| Point2f {
            x: self.center.x + dx * c - dy * s,
            y: self.center.y + dx * s + dy * c,
        };
        [
            corner(-w, -h),
            corner(w, -h),
            corner(w, h),
            corner(-w, h),
        ]
    }
}

/// Up to four channel values, used for pixel colors and fill values.
///
/// Unused trailing components are zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Scalar(pub [f64; 4]);

impl Scalar {
    pub const fn new(v0: f64, v1: f64, v2: f64, v3: f64) -> Self {
        Self([v0, v1, v2, v3])
    }

    /// Same value in every channel.
    pub const fn all(v: f64) -> Self {
        Self([v, v, v, v])
    }

    /// Per-component product, optionally scaled.
    pub fn mul(self, other: Scalar, scale: f64) -> Scalar {
        let mut out = [0.0; 4];
        for (o, (a, b)) in out.iter_mut().zip(self.0.iter().zip(other.0.iter())) {
            *o = a * b * scale;
        }
        Scalar(out)
    }

    /// Complex conjugate interpretation: `(v0, -v1, -v2, -v3)`.
    pub fn conj(self) -> Scalar {
        Scalar([self.0[0], -self.0[1], -self.0[2], -self.0[3]])
    }

    /// Whether all but the first component are zero.
    pub fn is_real(self) -> bool {
        self.0[1] == 0.0 && self.0[2] == 0.0 && self.0[3] == 0.0
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::all(v)
    }
}

impl From<[f64; 3]> for Scalar {
    fn from(v: [f64; 3]) -> Self {
        Scalar([v[0], v[1], v[2], 0.0])
    }
}

impl From<[f64; 4]> for Scalar {
    fn from(v: [f64; 4]) -> Self {
        Scalar(v)
    }
}
