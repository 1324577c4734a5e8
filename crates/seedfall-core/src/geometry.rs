//! Planar study windows: simple polygons and their outward buffers.
//!
//! A [`Window`] is either a closed simple polygon or the Minkowski dilation of
//! one by a disc of radius `r`. Membership is boundary-inclusive. All
//! coordinates are plot metres (E, N).
use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeedfallError};

/// Distance below which a point counts as lying on a boundary.
const BOUNDARY_EPS: f64 = 1e-9;

// ── Points ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub fn distance(self, other: Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Shortest distance from `p` to the closed segment `a`–`b`.
fn segment_distance(p: Point2, a: Point2, b: Point2) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return p.distance(a);
    }
    let t = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len_sq).clamp(0.0, 1.0);
    p.distance(Point2::new(a.x + t * dx, a.y + t * dy))
}

// ── Polygon ───────────────────────────────────────────────────────────────────

/// A simple polygon given by its vertices in either winding order.
/// The closing edge is implicit; a repeated first vertex is dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point2>", into = "Vec<Point2>")]
pub struct Polygon {
    vertices: Vec<Point2>,
}

impl Polygon {
    pub fn new(mut vertices: Vec<Point2>) -> Result<Self> {
        if vertices.len() > 1 && vertices.first() == vertices.last() {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(SeedfallError::InvalidWindow {
                reason: format!("polygon needs at least 3 vertices, got {}", vertices.len()),
            });
        }
        if vertices.iter().any(|v| !v.x.is_finite() || !v.y.is_finite()) {
            return Err(SeedfallError::InvalidWindow {
                reason: "polygon has a non-finite vertex".into(),
            });
        }
        let polygon = Self { vertices };
        if polygon.area() <= BOUNDARY_EPS {
            return Err(SeedfallError::InvalidWindow {
                reason: "polygon has zero area".into(),
            });
        }
        Ok(polygon)
    }

    /// Axis-aligned rectangle `[x0, x1] × [y0, y1]`.
    pub fn rectangle(x0: f64, y0: f64, x1: f64, y1: f64) -> Result<Self> {
        Self::new(vec![
            Point2::new(x0, y0),
            Point2::new(x1, y0),
            Point2::new(x1, y1),
            Point2::new(x0, y1),
        ])
    }

    pub fn vertices(&self) -> &[Point2] {
        &self.vertices
    }

    fn edges(&self) -> impl Iterator<Item = (Point2, Point2)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }

    /// Shoelace area.
    pub fn area(&self) -> f64 {
        let twice: f64 = self.edges().map(|(a, b)| a.x * b.y - b.x * a.y).sum();
        twice.abs() / 2.0
    }

    pub fn perimeter(&self) -> f64 {
        self.edges().map(|(a, b)| a.distance(b)).sum()
    }

    /// True when every turn has the same orientation (collinear runs allowed).
    pub fn is_convex(&self) -> bool {
        let n = self.vertices.len();
        let mut sign = 0.0f64;
        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];
            let c = self.vertices[(i + 2) % n];
            let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
            if cross.abs() <= BOUNDARY_EPS {
                continue;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    /// Distance from `p` to the nearest edge, regardless of side.
    pub fn boundary_distance(&self, p: Point2) -> f64 {
        self.edges()
            .map(|(a, b)| segment_distance(p, a, b))
            .fold(f64::INFINITY, f64::min)
    }

    /// Boundary-inclusive point-in-polygon test (even-odd ray casting).
    pub fn contains(&self, p: Point2) -> bool {
        if self.boundary_distance(p) <= BOUNDARY_EPS {
            return true;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
                if p.x < x_cross {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// `(min, max)` corners of the bounding box.
    pub fn bounding_box(&self) -> (Point2, Point2) {
        let mut lo = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut hi = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in &self.vertices {
            lo.x = lo.x.min(v.x);
            lo.y = lo.y.min(v.y);
            hi.x = hi.x.max(v.x);
            hi.y = hi.y.max(v.y);
        }
        (lo, hi)
    }
}

impl TryFrom<Vec<Point2>> for Polygon {
    type Error = SeedfallError;

    fn try_from(vertices: Vec<Point2>) -> Result<Self> {
        Self::new(vertices)
    }
}

impl From<Polygon> for Vec<Point2> {
    fn from(polygon: Polygon) -> Self {
        polygon.vertices
    }
}

// ── Window identity ───────────────────────────────────────────────────────────

/// Which of a site's windows a region is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    Core,
    Full,
    Buffered { radius: f64 },
}

/// Identity of a window: curves may only be combined when built on equal ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowId {
    pub site: String,
    pub kind: WindowKind,
}

impl WindowId {
    pub fn new(site: impl Into<String>, kind: WindowKind) -> Self {
        Self { site: site.into(), kind }
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            WindowKind::Core => write!(f, "{}/core", self.site),
            WindowKind::Full => write!(f, "{}/full", self.site),
            WindowKind::Buffered { radius } => write!(f, "{}/buffered({radius})", self.site),
        }
    }
}

// ── Window ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum Shape {
    Polygon(Polygon),
    /// Minkowski sum of `base` with a closed disc of `radius`.
    Dilated { base: Polygon, radius: f64 },
}

/// A planar region with a fixed identity and a precomputed area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    id: WindowId,
    shape: Shape,
    area: f64,
}

impl Window {
    pub fn polygon(id: WindowId, polygon: Polygon) -> Self {
        let area = polygon.area();
        Self { id, shape: Shape::Polygon(polygon), area }
    }

    pub fn id(&self) -> &WindowId {
        &self.id
    }

    pub fn area(&self) -> f64 {
        self.area
    }

    /// The undilated polygon this window is built on.
    pub fn base(&self) -> &Polygon {
        match &self.shape {
            Shape::Polygon(p) => p,
            Shape::Dilated { base, .. } => base,
        }
    }

    fn dilation(&self) -> f64 {
        match self.shape {
            Shape::Polygon(_) => 0.0,
            Shape::Dilated { radius, .. } => radius,
        }
    }

    pub fn contains(&self, p: Point2) -> bool {
        match &self.shape {
            Shape::Polygon(poly) => poly.contains(p),
            Shape::Dilated { base, radius } => {
                base.contains(p) || base.boundary_distance(p) <= radius + BOUNDARY_EPS
            }
        }
    }

    /// Distance from an interior point to the window boundary.
    ///
    /// For dilated windows this is `d + r` inside the base polygon and
    /// `r − d` in the buffer ring. Both are exact for convex bases and lower
    /// bounds otherwise, so border eligibility stays conservative.
    pub fn boundary_distance(&self, p: Point2) -> f64 {
        match &self.shape {
            Shape::Polygon(poly) => poly.boundary_distance(p),
            Shape::Dilated { base, radius } => {
                let d = base.boundary_distance(p);
                if base.contains(p) {
                    d + radius
                } else {
                    (radius - d).max(0.0)
                }
            }
        }
    }

    /// Outward buffer by `radius`.
    ///
    /// Dilations compose additively, so buffering a buffered window grows the
    /// same base. A zero radius keeps the region unchanged. Convex bases use
    /// the Steiner formula `A + P·r + π·r²`; other bases estimate the area on
    /// a `raster_cells × raster_cells` midpoint grid.
    pub fn buffered(&self, radius: f64, raster_cells: usize) -> Result<Window> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(SeedfallError::InvalidWindow {
                reason: format!("buffer radius must be finite and non-negative, got {radius}"),
            });
        }
        let total = self.dilation() + radius;
        let id = WindowId::new(self.id.site.clone(), WindowKind::Buffered { radius: total });
        let base = self.base().clone();
        if total == 0.0 {
            let area = base.area();
            return Ok(Window { id, shape: Shape::Polygon(base), area });
        }
        let area = if base.is_convex() {
            base.area() + base.perimeter() * total + PI * total * total
        } else {
            raster_area(&base, total, raster_cells.max(16))
        };
        Ok(Window { id, shape: Shape::Dilated { base, radius: total }, area })
    }
}

/// Midpoint-rule area of `base ⊕ disc(radius)`.
fn raster_area(base: &Polygon, radius: f64, cells: usize) -> f64 {
    let (lo, hi) = base.bounding_box();
    let (x0, y0) = (lo.x - radius, lo.y - radius);
    let cw = (hi.x - lo.x + 2.0 * radius) / cells as f64;
    let ch = (hi.y - lo.y + 2.0 * radius) / cells as f64;
    let mut hits = 0usize;
    for row in 0..cells {
        for col in 0..cells {
            let p = Point2::new(x0 + (col as f64 + 0.5) * cw, y0 + (row as f64 + 0.5) * ch);
            if base.contains(p) || base.boundary_distance(p) <= radius {
                hits += 1;
            }
        }
    }
    hits as f64 * cw * ch
}
