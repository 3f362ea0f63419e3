use kurbo::{Point, Rect};

/// A single circular selection primitive, kept separately from strokes so it
/// can be added and removed in isolation while editing.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RangePoint {
    pub center: Point,
    pub radius: f64,
}

impl RangePoint {
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self {
            center: Point::new(x, y),
            radius: radius.max(0.0),
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_center_size(self.center, (self.radius * 2.0, self.radius * 2.0))
    }
}

/// A painted path with a constant brush radius. A one-point stroke is a circle.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RangeStroke {
    pub points: Vec<Point>,
    pub radius: f64,
}

impl RangeStroke {
    pub fn new(points: Vec<Point>, radius: f64) -> Self {
        Self {
            points,
            radius: radius.max(0.0),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bounding box of the path, expanded by the brush radius.
    pub fn bounds(&self) -> Option<Rect> {
        let first = *self.points.first()?;
        let mut rect = Rect::from_points(first, first);
        for p in &self.points[1..] {
            rect = rect.union_pt(*p);
        }
        Some(rect.inflate(self.radius, self.radius))
    }

    /// Squared distance from `p` to the nearest part of the painted path.
    pub fn dist_sq(&self, p: Point) -> f64 {
        match self.points.as_slice() {
            [] => f64::INFINITY,
            [only] => (*only - p).hypot2(),
            pts => pts
                .windows(2)
                .map(|seg| dist_sq_to_segment(p, seg[0], seg[1]))
                .fold(f64::INFINITY, f64::min),
        }
    }

    pub fn covers(&self, p: Point) -> bool {
        self.dist_sq(p) <= self.radius * self.radius
    }
}

/// Squared perpendicular distance from `p` to segment `ab`, with the
/// projection parameter clamped to `[0, 1]`. A zero-length segment degrades
/// to the point distance.
pub(crate) fn dist_sq_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len_sq = ab.hypot2();
    if len_sq <= f64::EPSILON {
        return (a - p).hypot2();
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    let nearest = a + ab * t;
    (nearest - p).hypot2()
}
