//! Drawing primitives.
//!
//! Every primitive mutates the target view in place and clips hard to the
//! view extent: plots outside the view are dropped pixel by pixel, never an
//! error. All plotting funnels through one clipped write path
//! ([`Painter::plot`](crate::matrix::Painter)), so no primitive can write
//! outside its view regardless of the coordinates it is handed.

use crate::error::Error;
use crate::geom::{Point, Rect, Scalar, Size};
use crate::matrix::{Matrix, Painter};

impl Matrix {
    /// Draw a line segment. `thickness` is the side of the square brush
    /// stamped along the path; 0 is treated as 1.
    pub fn line(&self, from: Point, to: Point, color: Scalar, thickness: u32) -> Result<(), Error> {
        self.paint(|p| {
            stroke_line(p, from, to, color, thickness.max(1));
        })
    }

    /// Draw a rectangle. Negative `thickness` fills it; otherwise the four
    /// edges are stroked with that thickness.
    pub fn rectangle(&self, rect: Rect, color: Scalar, thickness: i32) -> Result<(), Error> {
        self.paint(|p| {
            if thickness < 0 {
                for y in rect.y as i64..rect.br().y as i64 {
                    for x in rect.x as i64..rect.br().x as i64 {
                        p.plot(x, y, color);
                    }
                }
                return;
            }
            let t = (thickness.max(1)) as u32;
            let tl = rect.tl();
            let br = Point::new(rect.br().x - 1, rect.br().y - 1);
            stroke_line(p, tl, Point::new(br.x, tl.y), color, t);
            stroke_line(p, Point::new(br.x, tl.y), br, color, t);
            stroke_line(p, br, Point::new(tl.x, br.y), color, t);
            stroke_line(p, Point::new(tl.x, br.y), tl, color, t);
        })
    }

    /// Draw an ellipse centered at `center` with half-axes `axes`, rotated
    /// by `angle_deg`. Negative `thickness` fills the interior.
    pub fn ellipse(
        &self,
        center: Point,
        axes: Size,
        angle_deg: f64,
        color: Scalar,
        thickness: i32,
    ) -> Result<(), Error> {
        let ring = ellipse_ring(center, axes, angle_deg);
        self.paint(|p| {
            if thickness < 0 {
                fill_rings(p, std::slice::from_ref(&ring), color);
            } else {
                let t = thickness.max(1) as u32;
                for pair in ring.windows(2) {
                    stroke_line(p, pair[0], pair[1], color, t);
                }
                if let (Some(&first), Some(&last)) = (ring.first(), ring.last()) {
                    stroke_line(p, last, first, color, t);
                }
            }
        })
    }

    /// Fill one or more closed polygons using the even-odd rule. Rings
    /// sharing area cancel, so a ring inside another cuts a hole.
    pub fn fill_poly(&self, polys: &[Vec<Point>], color: Scalar) -> Result<(), Error> {
        self.paint(|p| fill_rings(p, polys, color))
    }

    /// Render `text` with a built-in 5x7 bitmap font, top-left corner at
    /// `origin`. `scale` multiplies the glyph size; 0 is treated as 1.
    /// Lowercase input is uppercased; characters without a glyph render as
    /// a solid block.
    pub fn put_text(
        &self,
        text: &str,
        origin: Point,
        color: Scalar,
        scale: u32,
    ) -> Result<(), Error> {
        let scale = scale.max(1) as i64;
        self.paint(|p| {
            let mut pen_x = origin.x as i64;
            let pen_y = origin.y as i64;
            for ch in text.chars() {
                let glyph = glyph_rows(ch);
                for (row, bits) in glyph.iter().enumerate() {
                    for col in 0..GLYPH_WIDTH {
                        if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                            continue;
                        }
                        let gx = pen_x + col as i64 * scale;
                        let gy = pen_y + row as i64 * scale;
                        for dy in 0..scale {
                            for dx in 0..scale {
                                p.plot(gx + dx, gy + dy, color);
                            }
                        }
                    }
                }
                pen_x += (GLYPH_WIDTH as i64 + 1) * scale;
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Rasterization helpers
// ---------------------------------------------------------------------------

/// Stamp a `thickness`-sided square brush at every Bresenham step.
fn stroke_line(p: &mut Painter<'_>, from: Point, to: Point, color: Scalar, thickness: u32) {
    let (mut x, mut y) = (from.x as i64, from.y as i64);
    let (x1, y1) = (to.x as i64, to.y as i64);
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        stamp(p, x, y, color, thickness);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn stamp(p: &mut Painter<'_>, x: i64, y: i64, color: Scalar, thickness: u32) {
    let half = thickness as i64 / 2;
    let lo = -half;
    let hi = thickness as i64 - half;
    for dy in lo..hi {
        for dx in lo..hi {
            p.plot(x + dx, y + dy, color);
        }
    }
}

/// Scanline even-odd fill over a set of closed rings.
fn fill_rings(p: &mut Painter<'_>, rings: &[Vec<Point>], color: Scalar) {
    for y in 0..p.height() {
        let scan = y as f64 + 0.5;
        let mut crossings: Vec<f64> = Vec::new();
        for ring in rings {
            if ring.len() < 3 {
                continue;
            }
            for i in 0..ring.len() {
                let a = ring[i];
                let b = ring[(i + 1) % ring.len()];
                let (ay, by) = (a.y as f64, b.y as f64);
                if (ay <= scan && by > scan) || (by <= scan && ay > scan) {
                    let t = (scan - ay) / (by - ay);
                    crossings.push(a.x as f64 + t * (b.x as f64 - a.x as f64));
                }
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));
        for pair in crossings.chunks_exact(2) {
            let x0 = pair[0].ceil() as i64;
            let x1 = pair[1].floor() as i64;
            for x in x0..=x1 {
                p.plot(x, y, color);
            }
        }
    }
}

/// Sample the ellipse boundary as a closed polygon.
fn ellipse_ring(center: Point, axes: Size, angle_deg: f64) -> Vec<Point> {
    let (a, b) = (axes.width as f64, axes.height as f64);
    let steps = ((a.max(b) * 4.0) as usize).clamp(16, 360);
    let rot = angle_deg.to_radians();
    let (rs, rc) = rot.sin_cos();
    (0..steps)
        .map(|i| {
            let t = i as f64 / steps as f64 * std::f64::consts::TAU;
            let (ex, ey) = (a * t.cos(), b * t.sin());
            Point::new(
                (center.x as f64 + ex * rc - ey * rs).round() as i32,
                (center.y as f64 + ex * rs + ey * rc).round() as i32,
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// 5x7 bitmap font
// ---------------------------------------------------------------------------

const GLYPH_WIDTH: usize = 5;
const GLYPH_HEIGHT: usize = 7;

/// Solid block used for characters outside the glyph table.
const GLYPH_FALLBACK: [u8; GLYPH_HEIGHT] = [0x1F; GLYPH_HEIGHT];

fn glyph_rows(ch: char) -> [u8; GLYPH_HEIGHT] {
    match ch.to_ascii_uppercase() {
        ' ' => [0x00; GLYPH_HEIGHT],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '%' => [0x19, 0x19, 0x02, 0x04, 0x08, 0x13, 0x13],
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        _ => GLYPH_FALLBACK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MatType;

    fn white() -> Scalar {
        Scalar::all(255.0)
    }

    #[test]
    fn horizontal_line_paints_expected_pixels() {
        let m = Matrix::zeros(3, 5, MatType::U8C1);
        m.line(Point::new(0, 1), Point::new(4, 1), white(), 1).unwrap();
        assert_eq!(m.count_non_zero().unwrap(), 5);
        for x in 0..5 {
            assert_eq!(m.get(x, 1).unwrap(), 255.0);
        }
    }

    #[test]
    fn line_clips_outside_view_without_error() {
        let m = Matrix::zeros(4, 4, MatType::U8C1);
        m.line(Point::new(-10, -10), Point::new(20, 20), white(), 1)
            .unwrap();
        // Only the in-view diagonal survives.
        for i in 0..4 {
            assert_eq!(m.get(i, i).unwrap(), 255.0);
        }
        assert_eq!(m.count_non_zero().unwrap(), 4);
    }

    #[test]
    fn filled_rectangle_covers_exact_area() {
        let m = Matrix::zeros(6, 6, MatType::U8C1);
        m.rectangle(Rect::new(1, 2, 3, 2), white(), -1).unwrap();
        assert_eq!(m.count_non_zero().unwrap(), 6);
        assert_eq!(m.get(1, 2).unwrap(), 255.0);
        assert_eq!(m.get(3, 3).unwrap(), 255.0);
        assert_eq!(m.get(4, 3).unwrap(), 0.0);
    }

    #[test]
    fn outline_rectangle_leaves_interior_empty() {
        let m = Matrix::zeros(6, 6, MatType::U8C1);
        m.rectangle(Rect::new(1, 1, 4, 4), white(), 1).unwrap();
        assert_eq!(m.get(2, 2).unwrap(), 0.0);
        assert_eq!(m.get(1, 1).unwrap(), 255.0);
        assert_eq!(m.get(4, 4).unwrap(), 255.0);
        assert_eq!(m.count_non_zero().unwrap(), 12);
    }

    #[test]
    fn filled_square_in_four_by_four_counts_four() {
        let m = Matrix::zeros(4, 4, MatType::U8C1);
        m.rectangle(Rect::new(1, 1, 2, 2), white(), -1).unwrap();
        assert_eq!(m.count_non_zero().unwrap(), 4);
    }

    #[test]
    fn rectangle_clips_to_view() {
        let m = Matrix::zeros(4, 4, MatType::U8C1);
        m.rectangle(Rect::new(2, 2, 10, 10), white(), -1).unwrap();
        assert_eq!(m.count_non_zero().unwrap(), 4);
    }

    #[test]
    fn drawing_through_subview_stays_inside_it() {
        let m = Matrix::zeros(8, 8, MatType::U8C1);
        let sub = m.crop(2, 2, 4, 4).unwrap();
        sub.rectangle(Rect::new(-5, -5, 20, 20), white(), -1).unwrap();
        // Fill covered the whole sub-view and nothing outside it.
        assert_eq!(sub.count_non_zero().unwrap(), 16);
        assert_eq!(m.count_non_zero().unwrap(), 16);
        assert_eq!(m.get(1, 1).unwrap(), 0.0);
        assert_eq!(m.get(6, 6).unwrap(), 0.0);
    }

    #[test]
    fn filled_ellipse_is_symmetric_and_bounded() {
        let m = Matrix::zeros(11, 11, MatType::U8C1);
        m.ellipse(Point::new(5, 5), Size::new(4, 2), 0.0, white(), -1)
            .unwrap();
        assert_eq!(m.get(5, 5).unwrap(), 255.0);
        assert_eq!(m.get(1, 5).unwrap(), 255.0);
        assert_eq!(m.get(9, 5).unwrap(), 255.0);
        // Outside the vertical half-axis.
        assert_eq!(m.get(5, 1).unwrap(), 0.0);
        assert_eq!(m.get(0, 0).unwrap(), 0.0);
    }

    #[test]
    fn fill_poly_even_odd_cuts_holes() {
        let m = Matrix::zeros(12, 12, MatType::U8C1);
        let outer = vec![
            Point::new(1, 1),
            Point::new(10, 1),
            Point::new(10, 10),
            Point::new(1, 10),
        ];
        let hole = vec![
            Point::new(4, 4),
            Point::new(7, 4),
            Point::new(7, 7),
            Point::new(4, 7),
        ];
        m.fill_poly(&[outer, hole], white()).unwrap();
        assert_eq!(m.get(2, 2).unwrap(), 255.0);
        assert_eq!(m.get(5, 5).unwrap(), 0.0);
    }

    #[test]
    fn put_text_renders_and_clips() {
        let m = Matrix::zeros(10, 30, MatType::U8C1);
        m.put_text("A1", Point::new(1, 1), white(), 1).unwrap();
        assert!(m.count_non_zero().unwrap() > 10);
        // Off-view text is silently dropped.
        let edge = Matrix::zeros(4, 4, MatType::U8C1);
        edge.put_text("W", Point::new(-100, -100), white(), 1).unwrap();
        assert_eq!(edge.count_non_zero().unwrap(), 0);
    }

    #[test]
    fn glyphs_have_seven_rows_within_five_columns() {
        for ch in "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ.:-% ".chars() {
            let rows = glyph_rows(ch);
            assert_eq!(rows.len(), GLYPH_HEIGHT);
            for row in rows {
                assert!(row < 1 << GLYPH_WIDTH, "glyph {ch} row overflows");
            }
        }
    }
}
