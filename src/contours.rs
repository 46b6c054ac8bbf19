//! Contour extraction and the contour hierarchy model.
//!
//! [`Matrix::find_contours`] runs border following (Suzuki–Abe) over a
//! single-channel view, treating any non-zero pixel as foreground. The
//! result is a [`Contours`] collection: point chains plus a parallel
//! hierarchy table of `next` / `prev` / `first_child` / `parent` links,
//! `-1` meaning absent. Geometric queries and mutators operate on one
//! contour at a time; the wire form round-trips through JSON with the
//! hierarchy validated on the way back in.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::geom::{Point, Point2f, Rect, RotatedRect};
use crate::matrix::Matrix;

/// Which borders to keep and how to nest them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RetrievalMode {
    /// Outermost borders only; no nesting links.
    External,
    /// Every border, flat (no nesting links).
    List,
    /// Two levels: components on top, their holes beneath.
    CComp,
    /// The full nesting tree.
    Tree,
}

/// Point-chain compression applied while tracing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ChainApprox {
    /// Keep every boundary pixel.
    None,
    /// Collapse straight runs to their endpoints.
    Simple,
}

/// One row of the hierarchy table. Indices refer to positions in the
/// owning [`Contours`]; `-1` = absent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Hierarchy {
    pub next: i32,
    pub prev: i32,
    pub first_child: i32,
    pub parent: i32,
}

impl Hierarchy {
    const NONE: Hierarchy = Hierarchy {
        next: -1,
        prev: -1,
        first_child: -1,
        parent: -1,
    };
}

/// Area-style moments of a single contour polygon (Green's theorem).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ContourMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m11: f64,
}

/// An indexed collection of contours with a parallel hierarchy table.
#[derive(Clone, Debug, Default)]
pub struct Contours {
    contours: Vec<Vec<Point>>,
    hierarchy: Vec<Hierarchy>,
    /// Closedness per contour, maintained by `approx_poly_dp`; not part of
    /// the wire form.
    closed: Vec<bool>,
}

/// Equality is defined on the wire content (points + hierarchy).
impl PartialEq for Contours {
    fn eq(&self, other: &Self) -> bool {
        self.contours == other.contours && self.hierarchy == other.hierarchy
    }
}

#[derive(Serialize, Deserialize)]
struct Wire {
    contours: Vec<Vec<Point>>,
    hierarchy: Vec<[i32; 4]>,
}

impl Contours {
    /// Build from parts, validating the hierarchy against the contour
    /// count (index alignment and link ranges).
    pub fn new(contours: Vec<Vec<Point>>, hierarchy: Vec<Hierarchy>) -> Result<Contours, Error> {
        if contours.len() != hierarchy.len() {
            return Err(Error::CorruptContourData(format!(
                "{} contours but {} hierarchy rows",
                contours.len(),
                hierarchy.len()
            )));
        }
        let n = contours.len() as i32;
        for (i, h) in hierarchy.iter().enumerate() {
            for link in [h.next, h.prev, h.first_child, h.parent] {
                if link < -1 || link >= n {
                    return Err(Error::CorruptContourData(format!(
                        "hierarchy row {i} links to {link}, valid range is -1..{n}"
                    )));
                }
            }
        }
        let closed = vec![true; contours.len()];
        Ok(Contours {
            contours,
            hierarchy,
            closed,
        })
    }

    /// Number of contours.
    pub fn len(&self) -> usize {
        self.contours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contours.is_empty()
    }

    fn check(&self, pos: usize) -> Result<(), Error> {
        if pos >= self.contours.len() {
            return Err(Error::OutOfBounds {
                x: pos as i64,
                y: 0,
                channel: 0,
                width: self.contours.len() as u32,
                height: 1,
                channels: 1,
            });
        }
        Ok(())
    }

    /// Points of contour `pos`.
    pub fn points(&self, pos: usize) -> Result<&[Point], Error> {
        self.check(pos)?;
        Ok(&self.contours[pos])
    }

    /// One point of contour `pos`.
    pub fn point(&self, pos: usize, index: usize) -> Result<Point, Error> {
        let pts = self.points(pos)?;
        pts.get(index).copied().ok_or(Error::OutOfBounds {
            x: index as i64,
            y: 0,
            channel: 0,
            width: pts.len() as u32,
            height: 1,
            channels: 1,
        })
    }

    /// Number of points in contour `pos`.
    pub fn corner_count(&self, pos: usize) -> Result<usize, Error> {
        Ok(self.points(pos)?.len())
    }

    /// Hierarchy row of contour `pos`.
    pub fn hierarchy(&self, pos: usize) -> Result<Hierarchy, Error> {
        self.check(pos)?;
        Ok(self.hierarchy[pos])
    }

    /// Whether contour `pos` is treated as a closed ring.
    pub fn is_closed(&self, pos: usize) -> Result<bool, Error> {
        self.check(pos)?;
        Ok(self.closed[pos])
    }
}

// ---------------------------------------------------------------------------
// Geometric queries
// ---------------------------------------------------------------------------

impl Contours {
    /// Enclosed polygon area (shoelace, unsigned).
    pub fn area(&self, pos: usize) -> Result<f64, Error> {
        let pts = self.points(pos)?;
        Ok((signed_area_2x(pts) as f64 / 2.0).abs())
    }

    /// Perimeter; the closing segment is included for closed contours.
    pub fn arc_length(&self, pos: usize) -> Result<f64, Error> {
        let pts = self.points(pos)?;
        if pts.len() < 2 {
            return Ok(0.0);
        }
        let mut total = 0.0;
        for pair in pts.windows(2) {
            total += dist(pair[0], pair[1]);
        }
        if self.closed[pos] {
            total += dist(pts[pts.len() - 1], pts[0]);
        }
        Ok(total)
    }

    /// Axis-aligned bounding rectangle (pixel-inclusive extent).
    pub fn bounding_rect(&self, pos: usize) -> Result<Rect, Error> {
        let pts = self.points(pos)?;
        let first = pts.first().ok_or(Error::CorruptContourData(
            "bounding_rect of empty contour".into(),
        ))?;
        let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
        for p in pts {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Ok(Rect::new(x0, y0, (x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
    }

    /// Minimum-area enclosing rotated rectangle (rotating calipers over the
    /// convex hull).
    pub fn min_area_rect(&self, pos: usize) -> Result<RotatedRect, Error> {
        let pts = self.points(pos)?;
        let hull = convex_hull_of(pts);
        if hull.is_empty() {
            return Err(Error::CorruptContourData(
                "min_area_rect of empty contour".into(),
            ));
        }
        if hull.len() == 1 {
            return Ok(RotatedRect {
                center: Point2f::new(hull[0].x as f64, hull[0].y as f64),
                size: (0.0, 0.0),
                angle: 0.0,
            });
        }
        let mut best: Option<RotatedRect> = None;
        let mut best_area = f64::INFINITY;
        for i in 0..hull.len() {
            let a = hull[i];
            let b = hull[(i + 1) % hull.len()];
            let (ex, ey) = (b.x as f64 - a.x as f64, b.y as f64 - a.y as f64);
            let len = (ex * ex + ey * ey).sqrt();
            if len == 0.0 {
                continue;
            }
            let (ux, uy) = (ex / len, ey / len);
            // Project the hull onto the edge direction and its normal.
            let (mut lo_u, mut hi_u) = (f64::INFINITY, f64::NEG_INFINITY);
            let (mut lo_v, mut hi_v) = (f64::INFINITY, f64::NEG_INFINITY);
            for p in &hull {
                let (px, py) = (p.x as f64, p.y as f64);
                let u = px * ux + py * uy;
                let v = -px * uy + py * ux;
                lo_u = lo_u.min(u);
                hi_u = hi_u.max(u);
                lo_v = lo_v.min(v);
                hi_v = hi_v.max(v);
            }
            let (w, h) = (hi_u - lo_u, hi_v - lo_v);
            if w * h < best_area {
                best_area = w * h;
                let cu = (lo_u + hi_u) / 2.0;
                let cv = (lo_v + hi_v) / 2.0;
                best = Some(RotatedRect {
                    center: Point2f::new(cu * ux - cv * uy, cu * uy + cv * ux),
                    size: (w, h),
                    angle: ey.atan2(ex).to_degrees(),
                });
            }
        }
        best.ok_or(Error::CorruptContourData(
            "min_area_rect: degenerate contour".into(),
        ))
    }

    /// Ellipse approximating the point distribution (second-moment fit:
    /// centroid, covariance eigenvectors for orientation, boundary-moment
    /// scaling for the axes).
    pub fn fit_ellipse(&self, pos: usize) -> Result<RotatedRect, Error> {
        let pts = self.points(pos)?;
        if pts.len() < 5 {
            return Err(Error::CorruptContourData(format!(
                "fit_ellipse needs at least 5 points, got {}",
                pts.len()
            )));
        }
        let n = pts.len() as f64;
        let cx = pts.iter().map(|p| p.x as f64).sum::<f64>() / n;
        let cy = pts.iter().map(|p| p.y as f64).sum::<f64>() / n;
        let (mut mxx, mut myy, mut mxy) = (0.0, 0.0, 0.0);
        for p in pts {
            let dx = p.x as f64 - cx;
            let dy = p.y as f64 - cy;
            mxx += dx * dx;
            myy += dy * dy;
            mxy += dx * dy;
        }
        mxx /= n;
        myy /= n;
        mxy /= n;
        let common = ((mxx - myy) * (mxx - myy) + 4.0 * mxy * mxy).sqrt();
        let l1 = (mxx + myy + common) / 2.0;
        let l2 = (mxx + myy - common) / 2.0;
        // For a uniformly sampled ellipse boundary the second moment along a
        // semi-axis `a` is a^2 / 2.
        let major = 2.0 * (2.0 * l1.max(0.0)).sqrt();
        let minor = 2.0 * (2.0 * l2.max(0.0)).sqrt();
        let angle = 0.5 * (2.0 * mxy).atan2(mxx - myy).to_degrees();
        Ok(RotatedRect {
            center: Point2f::new(cx, cy),
            size: (major, minor),
            angle,
        })
    }

    /// Whether the contour polygon is convex.
    pub fn is_convex(&self, pos: usize) -> Result<bool, Error> {
        let pts = self.points(pos)?;
        if pts.len() < 4 {
            return Ok(true);
        }
        let mut sign = 0i64;
        for i in 0..pts.len() {
            let a = pts[i];
            let b = pts[(i + 1) % pts.len()];
            let c = pts[(i + 2) % pts.len()];
            let cross = Point::new(b.x - a.x, b.y - a.y).cross(Point::new(c.x - b.x, c.y - b.y));
            if cross != 0 {
                if sign != 0 && (cross > 0) != (sign > 0) {
                    return Ok(false);
                }
                sign = cross.signum();
            }
        }
        Ok(true)
    }

    /// Polygon moments via Green's theorem, normalized so `m00 >= 0`.
    pub fn moments(&self, pos: usize) -> Result<ContourMoments, Error> {
        let pts = self.points(pos)?;
        let mut m = ContourMoments::default();
        for i in 0..pts.len() {
            let p = pts[i];
            let q = pts[(i + 1) % pts.len()];
            let (xi, yi) = (p.x as f64, p.y as f64);
            let (xj, yj) = (q.x as f64, q.y as f64);
            let a = xi * yj - xj * yi;
            m.m00 += a;
            m.m10 += a * (xi + xj);
            m.m01 += a * (yi + yj);
            m.m11 += a * (2.0 * xi * yi + xi * yj + xj * yi + 2.0 * xj * yj);
        }
        m.m00 /= 2.0;
        m.m10 /= 6.0;
        m.m01 /= 6.0;
        m.m11 /= 24.0;
        if m.m00 < 0.0 {
            m.m00 = -m.m00;
            m.m10 = -m.m10;
            m.m01 = -m.m01;
            m.m11 = -m.m11;
        }
        Ok(m)
    }
}

// ---------------------------------------------------------------------------
// Mutators
// ---------------------------------------------------------------------------

impl Contours {
    /// Replace contour `pos` with its Douglas–Peucker simplification at
    /// tolerance `epsilon`. The hierarchy table is untouched.
    pub fn approx_poly_dp(&mut self, pos: usize, epsilon: f64, closed: bool) -> Result<(), Error> {
        self.check(pos)?;
        let pts = &self.contours[pos];
        if pts.len() > 2 {
            let mut chain = pts.clone();
            if closed {
                chain.push(chain[0]);
            }
            let mut keep = vec![false; chain.len()];
            keep[0] = true;
            keep[chain.len() - 1] = true;
            douglas_peucker(&chain, 0, chain.len() - 1, epsilon.max(0.0), &mut keep);
            let mut out: Vec<Point> = chain
                .iter()
                .zip(&keep)
                .filter_map(|(p, &k)| k.then_some(*p))
                .collect();
            if closed {
                out.pop();
            }
            self.contours[pos] = out;
        }
        self.closed[pos] = closed;
        Ok(())
    }

    /// Replace contour `pos` with its convex hull. The hierarchy table is
    /// untouched.
    pub fn convex_hull(&mut self, pos: usize, clockwise: bool) -> Result<(), Error> {
        self.check(pos)?;
        let mut hull = convex_hull_of(&self.contours[pos]);
        if clockwise {
            hull.reverse();
        }
        self.contours[pos] = hull;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

impl Contours {
    /// Serialize to the JSON wire form:
    /// `{ "contours": [[{x,y},…],…], "hierarchy": [[next,prev,firstChild,parent],…] }`.
    ///
    /// The wire form carries points and hierarchy only. Closedness flags
    /// set by [`approx_poly_dp`](Self::approx_poly_dp) are not encoded:
    /// after a round trip every contour is closed again, so `arc_length`
    /// of an open contour gains its closing segment back.
    pub fn serialize(&self) -> Result<String, Error> {
        let wire = Wire {
            contours: self.contours.clone(),
            hierarchy: self
                .hierarchy
                .iter()
                .map(|h| [h.next, h.prev, h.first_child, h.parent])
                .collect(),
        };
        serde_json::to_string(&wire).map_err(|e| Error::CorruptContourData(e.to_string()))
    }

    /// Parse and validate the wire form. Schema mismatches, length
    /// mismatches, and out-of-range hierarchy links all fail with
    /// [`Error::CorruptContourData`].
    pub fn deserialize(json: &str) -> Result<Contours, Error> {
        let wire: Wire =
            serde_json::from_str(json).map_err(|e| Error::CorruptContourData(e.to_string()))?;
        let hierarchy = wire
            .hierarchy
            .into_iter()
            .map(|[next, prev, first_child, parent]| Hierarchy {
                next,
                prev,
                first_child,
                parent,
            })
            .collect();
        Contours::new(wire.contours, hierarchy)
    }
}

fn signed_area_2x(pts: &[Point]) -> i64 {
    let mut acc = 0i64;
    for i in 0..pts.len() {
        acc += pts[i].cross(pts[(i + 1) % pts.len()]);
    }
    acc
}

fn dist(a: Point, b: Point) -> f64 {
    let dx = (a.x - b.x) as f64;
    let dy = (a.y - b.y) as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Monotone-chain convex hull, counterclockwise in image coordinates.
fn convex_hull_of(pts: &[Point]) -> Vec<Point> {
    let mut sorted: Vec<Point> = pts.to_vec();
    sorted.sort_by_key(|p| (p.x, p.y));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }
    let mut hull: Vec<Point> = Vec::with_capacity(sorted.len() * 2);
    for &p in sorted.iter().chain(sorted.iter().rev().skip(1)) {
        while hull.len() >= 2 {
            let a = hull[hull.len() - 2];
            let b = hull[hull.len() - 1];
            if Point::new(b.x - a.x, b.y - a.y).cross(Point::new(p.x - a.x, p.y - a.y)) <= 0 {
                hull.pop();
            } else {
                break;
            }
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

fn douglas_peucker(pts: &[Point], lo: usize, hi: usize, epsilon: f64, keep: &mut [bool]) {
    if hi <= lo + 1 {
        return;
    }
    let a = pts[lo];
    let b = pts[hi];
    let (mut max_d, mut max_i) = (0.0f64, lo);
    for (i, p) in pts.iter().enumerate().take(hi).skip(lo + 1) {
        let d = point_segment_distance(*p, a, b);
        if d > max_d {
            max_d = d;
            max_i = i;
        }
    }
    if max_d > epsilon {
        keep[max_i] = true;
        douglas_peucker(pts, lo, max_i, epsilon, keep);
        douglas_peucker(pts, max_i, hi, epsilon, keep);
    }
}

fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let (vx, vy) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
    let (wx, wy) = ((p.x - a.x) as f64, (p.y - a.y) as f64);
    let len2 = vx * vx + vy * vy;
    if len2 == 0.0 {
        return (wx * wx + wy * wy).sqrt();
    }
    let t = ((wx * vx + wy * vy) / len2).clamp(0.0, 1.0);
    let (dx, dy) = (wx - t * vx, wy - t * vy);
    (dx * dx + dy * dy).sqrt()
}

// ---------------------------------------------------------------------------
// Border following
// ---------------------------------------------------------------------------

/// Counterclockwise 8-neighborhood, index 0 = east.
const DIRS: [(i64, i64); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

struct BorderInfo {
    hole: bool,
    /// Parent border number (1 = the frame).
    parent_nbd: i32,
}

impl Matrix {
    /// Trace the borders of the non-zero regions of a single-channel view.
    pub fn find_contours(
        &self,
        mode: RetrievalMode,
        method: ChainApprox,
    ) -> Result<Contours, Error> {
        if self.channels() != 1 {
            return Err(Error::DimensionMismatch {
                op: "find_contours",
                expected: "single-channel view".into(),
                found: format!("{} channels", self.channels()),
            });
        }
        let w = self.width() as usize;
        let h = self.height() as usize;
        // Padded label image: one-pixel zero frame around the view.
        let stride = w + 2;
        let mut f = vec![0i32; stride * (h + 2)];
        let values = self.read_values()?;
        for y in 0..h {
            for x in 0..w {
                if values[y * w + x] != 0.0 {
                    f[(y + 1) * stride + x + 1] = 1;
                }
            }
        }

        let mut borders: Vec<Vec<Point>> = Vec::new();
        let mut info: Vec<BorderInfo> = Vec::new();
        let mut nbd = 1i32;
        for y in 1..=h {
            let mut lnbd = 1i32;
            for x in 1..=w {
                let fxy = f[y * stride + x];
                if fxy == 0 {
                    continue;
                }
                let start = if fxy == 1 && f[y * stride + x - 1] == 0 {
                    // Outer border: entered from the left background.
                    Some((4usize, false))
                } else if fxy >= 1 && f[y * stride + x + 1] == 0 {
                    // Hole border: background to the right.
                    if fxy > 1 {
                        lnbd = fxy;
                    }
                    Some((0usize, true))
                } else {
                    None
                };
                if let Some((start_dir, hole)) = start {
                    nbd += 1;
                    let parent_nbd = if lnbd <= 1 {
                        1
                    } else {
                        let prior = &info[(lnbd - 2) as usize];
                        if prior.hole == hole {
                            prior.parent_nbd
                        } else {
                            lnbd
                        }
                    };
                    info.push(BorderInfo { hole, parent_nbd });
                    borders.push(trace_border(&mut f, stride, x, y, nbd, start_dir));
                }
                let fxy = f[y * stride + x];
                if fxy != 1 {
                    lnbd = fxy.abs();
                }
            }
        }

        if method == ChainApprox::Simple {
            for chain in &mut borders {
                *chain = compress_chain(chain);
            }
        }

        let contours = assemble(borders, &info, mode);
        debug!(
            count = contours.len(),
            ?mode,
            "find_contours traced {} raw border(s)",
            info.len()
        );
        Ok(contours)
    }
}

/// Follow one border clockwise, marking visited pixels with `nbd`
/// (negated where the border touches background on the east side).
fn trace_border(
    f: &mut [i32],
    stride: usize,
    x: usize,
    y: usize,
    nbd: i32,
    start_dir: usize,
) -> Vec<Point> {
    let at = |px: i64, py: i64| py as usize * stride + px as usize;
    let (sx, sy) = (x as i64, y as i64);

    // Clockwise scan for the first non-zero neighbor.
    let mut first: Option<(i64, i64, usize)> = None;
    for i in 0..8 {
        let d = (start_dir + 8 - i) % 8;
        let (dx, dy) = DIRS[d];
        if f[at(sx + dx, sy + dy)] != 0 {
            first = Some((sx + dx, sy + dy, d));
            break;
        }
    }
    let Some((i1x, i1y, d1)) = first else {
        // Isolated pixel.
        f[at(sx, sy)] = -nbd;
        return vec![Point::new(sx as i32 - 1, sy as i32 - 1)];
    };

    let mut points = Vec::new();
    let (mut i3x, mut i3y) = (sx, sy);
    let mut dir_to_prev = d1;
    loop {
        // Counterclockwise scan from just past the previous pixel.
        let mut examined_east_zero = false;
        let mut next: Option<(i64, i64, usize)> = None;
        for k in 1..=8 {
            let nd = (dir_to_prev + k) % 8;
            let (dx, dy) = DIRS[nd];
            let (px, py) = (i3x + dx, i3y + dy);
            if f[at(px, py)] != 0 {
                next = Some((px, py, nd));
                break;
            }
            if nd == 0 {
                examined_east_zero = true;
            }
        }
        // i2 is non-zero, so the scan always terminates.
        let Some((i4x, i4y, nd)) = next else { break };

        let cur = at(i3x, i3y);
        if examined_east_zero {
            f[cur] = -nbd;
        } else if f[cur] == 1 {
            f[cur] = nbd;
        }
        points.push(Point::new(i3x as i32 - 1, i3y as i32 - 1));

        if i4x == sx && i4y == sy && i3x == i1x && i3y == i1y {
            break;
        }
        i3x = i4x;
        i3y = i4y;
        // Direction from the new center back to the previous pixel.
        dir_to_prev = (nd + 4) % 8;
    }
    points
}

/// Drop points that continue the previous direction exactly.
fn compress_chain(chain: &[Point]) -> Vec<Point> {
    if chain.len() < 3 {
        return chain.to_vec();
    }
    let n = chain.len();
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = chain[(i + n - 1) % n];
        let cur = chain[i];
        let next = chain[(i + 1) % n];
        let din = (cur.x - prev.x, cur.y - prev.y);
        let dout = (next.x - cur.x, next.y - cur.y);
        if din != dout {
            out.push(cur);
        }
    }
    if out.is_empty() {
        out.push(chain[0]);
    }
    out
}

/// Filter and renumber traced borders per the retrieval mode and rebuild
/// sibling links from parent assignments.
fn assemble(borders: Vec<Vec<Point>>, info: &[BorderInfo], mode: RetrievalMode) -> Contours {
    // Select surviving borders and their parent in raw border-index space.
    let keep_parent: Vec<(usize, i32)> = match mode {
        RetrievalMode::External => info
            .iter()
            .enumerate()
            .filter(|(_, b)| !b.hole && b.parent_nbd <= 1)
            .map(|(i, _)| (i, -1))
            .collect(),
        RetrievalMode::List => (0..info.len()).map(|i| (i, -1)).collect(),
        RetrievalMode::CComp => info
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let parent = if b.hole { b.parent_nbd - 2 } else { -1 };
                (i, parent)
            })
            .collect(),
        RetrievalMode::Tree => info
            .iter()
            .enumerate()
            .map(|(i, b)| {
                let parent = if b.parent_nbd <= 1 {
                    -1
                } else {
                    b.parent_nbd - 2
                };
                (i, parent)
            })
            .collect(),
    };

    // Remap raw indices to output positions.
    let mut remap = vec![-1i32; info.len()];
    for (out_idx, (raw, _)) in keep_parent.iter().enumerate() {
        remap[*raw] = out_idx as i32;
    }
    let parents: Vec<i32> = keep_parent
        .iter()
        .map(|(_, p)| if *p < 0 { -1 } else { remap[*p as usize] })
        .collect();

    let mut hierarchy = vec![Hierarchy::NONE; keep_parent.len()];
    for (i, h) in hierarchy.iter_mut().enumerate() {
        h.parent = parents[i];
    }
    // Chain siblings in index order under each parent.
    let mut last_child: Vec<i32> = vec![-1; keep_parent.len() + 1];
    for i in 0..hierarchy.len() {
        let slot = (parents[i] + 1) as usize; // parent -1 shares slot 0
        let prev = last_child[slot];
        if prev >= 0 {
            hierarchy[prev as usize].next = i as i32;
            hierarchy[i].prev = prev;
        } else if parents[i] >= 0 {
            hierarchy[parents[i] as usize].first_child = i as i32;
        }
        last_child[slot] = i as i32;
    }

    let mut borders = borders;
    let contours: Vec<Vec<Point>> = keep_parent
        .iter()
        .map(|(raw, _)| std::mem::take(&mut borders[*raw]))
        .collect();
    let closed = vec![true; contours.len()];
    Contours {
        contours,
        hierarchy,
        closed,
    }
}
