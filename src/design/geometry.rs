//! Core geometric types shared by the database and the propagation engine

use std::ops::{Add, Mul, Sub};

/// Default tolerance for geometric comparisons, in design units
pub const EPSILON: f64 = 1e-6;

/// A 2D point (or vector) in design units
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0)
    }

    /// Check whether two points coincide within `tolerance`
    pub fn approx_eq(&self, other: Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }

    pub fn distance(&self, other: Point) -> f64 {
        (*self - other).length()
    }

    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dot(&self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(&self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

/// Signed node size; a negative component mirrors the node about that axis
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Size {
    pub x: f64,
    pub y: f64,
}

impl Size {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn abs(&self) -> (f64, f64) {
        (self.x.abs(), self.y.abs())
    }
}

/// An axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a box from two opposite corners in any order
    pub fn from_corners(a: Point, b: Point) -> Self {
        let x = a.x.min(b.x);
        let y = a.y.min(b.y);
        Self::new(x, y, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    /// Create a zero-sized bounding box at the origin
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }

    /// Right edge x-coordinate
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    /// Top edge y-coordinate (y grows upward)
    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.x, self.y),
            Point::new(self.right(), self.y),
            Point::new(self.right(), self.top()),
            Point::new(self.x, self.top()),
        ]
    }

    /// Check if this bounding box contains a point, edges included
    pub fn contains(&self, point: Point, tolerance: f64) -> bool {
        point.x >= self.x - tolerance
            && point.x <= self.right() + tolerance
            && point.y >= self.y - tolerance
            && point.y <= self.top() + tolerance
    }

    /// Compute the union of two bounding boxes (smallest box containing both)
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let top = self.top().max(other.top());
        BoundingBox::new(x, y, right - x, top - y)
    }

    /// Grow the box by `amount` on every side
    pub fn inflate(&self, amount: f64) -> BoundingBox {
        BoundingBox::new(
            self.x - amount,
            self.y - amount,
            self.width + 2.0 * amount,
            self.height + 2.0 * amount,
        )
    }

    pub fn approx_eq(&self, other: &BoundingBox, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance
            && (self.y - other.y).abs() <= tolerance
            && (self.width - other.width).abs() <= tolerance
            && (self.height - other.height).abs() <= tolerance
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::zero()
    }
}

/// A closed polygon, used for port shapes
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn from_box(bounds: &BoundingBox) -> Self {
        Self::new(bounds.corners().to_vec())
    }

    pub fn bounds(&self) -> BoundingBox {
        let Some(first) = self.points.first() else {
            return BoundingBox::zero();
        };
        self.points
            .iter()
            .skip(1)
            .fold(BoundingBox::new(first.x, first.y, 0.0, 0.0), |b, p| {
                b.union(&BoundingBox::new(p.x, p.y, 0.0, 0.0))
            })
    }

    /// Centre of the polygon's bounding box
    pub fn center(&self) -> Point {
        self.bounds().center()
    }

    fn edges(&self) -> impl Iterator<Item = (Point, Point)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// Point-in-polygon test; points on (or within `tolerance` of) the
    /// boundary count as inside, which makes degenerate point and line
    /// ports usable.
    pub fn contains(&self, point: Point, tolerance: f64) -> bool {
        if self.points.is_empty() {
            return false;
        }
        if self
            .edges()
            .any(|(a, b)| closest_on_segment(a, b, point).distance(point) <= tolerance)
        {
            return true;
        }
        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > point.y) != (b.y > point.y) {
                let x = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Closest point on the polygon boundary
    pub fn closest_point(&self, point: Point) -> Point {
        self.edges()
            .map(|(a, b)| closest_on_segment(a, b, point))
            .min_by(|p, q| {
                p.distance(point)
                    .partial_cmp(&q.distance(point))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(point)
    }

    /// Pull a point into the polygon. Points level with the bounding box
    /// are extended straight across; anything else goes to the closest
    /// boundary point.
    pub fn clamp(&self, point: Point, tolerance: f64) -> Point {
        if self.contains(point, tolerance) {
            return point;
        }
        let bounds = self.bounds();
        let inline = if point.y >= bounds.y && point.y <= bounds.top() {
            Some(Point::new(point.x.clamp(bounds.x, bounds.right()), point.y))
        } else if point.x >= bounds.x && point.x <= bounds.right() {
            Some(Point::new(point.x, point.y.clamp(bounds.y, bounds.top())))
        } else {
            None
        };
        match inline {
            Some(p) if self.contains(p, tolerance) => p,
            _ => self.closest_point(point),
        }
    }
}

fn closest_on_segment(a: Point, b: Point, p: Point) -> Point {
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 == 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    a + ab * t
}

/// Angle of a vector in tenths of a degree, 0..3600, counterclockwise from +x
pub fn angle_of(v: Point) -> i32 {
    let degrees = v.y.atan2(v.x).to_degrees();
    ((degrees * 10.0).round() as i32).rem_euclid(3600)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_edges() {
        let bb = BoundingBox::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(bb.right(), 110.0);
        assert_eq!(bb.top(), 70.0);
        assert_eq!(bb.center(), Point::new(60.0, 45.0));
    }

    #[test]
    fn test_bounding_box_union() {
        let a = BoundingBox::new(0.0, 0.0, 50.0, 50.0);
        let b = BoundingBox::new(100.0, 100.0, 50.0, 50.0);
        let union = a.union(&b);
        assert_eq!(union, BoundingBox::new(0.0, 0.0, 150.0, 150.0));
    }

    #[test]
    fn test_from_corners_any_order() {
        let b = BoundingBox::from_corners(Point::new(5.0, -1.0), Point::new(-5.0, 1.0));
        assert_eq!(b, BoundingBox::new(-5.0, -1.0, 10.0, 2.0));
    }

    #[test]
    fn test_polygon_contains_interior_and_edge() {
        let poly = Polygon::from_box(&BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert!(poly.contains(Point::new(5.0, 5.0), EPSILON));
        assert!(poly.contains(Point::new(10.0, 3.0), EPSILON));
        assert!(!poly.contains(Point::new(10.5, 3.0), EPSILON));
    }

    #[test]
    fn test_degenerate_point_polygon() {
        let poly = Polygon::from_box(&BoundingBox::new(3.0, 4.0, 0.0, 0.0));
        assert!(poly.contains(Point::new(3.0, 4.0), EPSILON));
        assert!(!poly.contains(Point::new(3.0, 4.1), EPSILON));
        assert_eq!(poly.center(), Point::new(3.0, 4.0));
    }

    #[test]
    fn test_clamp_extends_straight_when_inline() {
        let poly = Polygon::from_box(&BoundingBox::new(0.0, 0.0, 10.0, 4.0));
        assert_eq!(poly.clamp(Point::new(15.0, 2.0), EPSILON), Point::new(10.0, 2.0));
        assert_eq!(poly.clamp(Point::new(5.0, -3.0), EPSILON), Point::new(5.0, 0.0));
    }

    #[test]
    fn test_clamp_goes_to_closest_corner_otherwise() {
        let poly = Polygon::from_box(&BoundingBox::new(0.0, 0.0, 10.0, 4.0));
        let p = poly.clamp(Point::new(12.0, 7.0), EPSILON);
        assert!(p.approx_eq(Point::new(10.0, 4.0), EPSILON));
    }

    #[test]
    fn test_angle_of_cardinals() {
        assert_eq!(angle_of(Point::new(1.0, 0.0)), 0);
        assert_eq!(angle_of(Point::new(0.0, 2.0)), 900);
        assert_eq!(angle_of(Point::new(-3.0, 0.0)), 1800);
        assert_eq!(angle_of(Point::new(0.0, -1.0)), 2700);
        assert_eq!(angle_of(Point::new(1.0, 1.0)), 450);
    }
}
